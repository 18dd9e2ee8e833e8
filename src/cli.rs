use std::{env, path::PathBuf, time::Duration};

use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Parser};
use rpassword::prompt_password;
use secrecy::SecretString;

use crate::{client::ClientConfig, display::X11_UNIX_DIR};

#[derive(Debug, Parser)]
#[command(name = "xrelay", about = "Interactive SSH shell with X11 forwarding")]
pub struct ClientArgs {
    /// Target host; supports optional [user@]host[:port] syntax
    #[arg(value_name = "HOST")]
    target: String,
    /// Override remote username (defaults to user@host or current user)
    #[arg(short = 'l', long = "username", value_name = "USER")]
    username: Option<String>,
    /// Provide password non-interactively; otherwise we prompt like OpenSSH
    #[arg(short = 'p', long = "password", value_name = "PASSWORD")]
    password: Option<String>,
    /// Override the parsed port (defaults to 22 or the :port suffix)
    #[arg(short = 'P', long, value_name = "PORT")]
    port: Option<u16>,
    /// Local display to relay X11 clients to (defaults to $DISPLAY)
    #[arg(long, value_name = "DISPLAY")]
    display: Option<String>,
    /// Directory containing the X server's Unix sockets
    #[arg(long = "x11-socket-dir", value_name = "DIR", default_value = X11_UNIX_DIR)]
    x11_socket_dir: PathBuf,
    /// Screen number sent with the X11 forwarding request
    #[arg(long = "x11-screen", value_name = "N", default_value_t = 0)]
    x11_screen: u32,
    /// Terminal type for the remote pty (defaults to $TERM or xterm)
    #[arg(long, value_name = "TERM")]
    term: Option<String>,
    /// Milliseconds to pause between relay ticks; 0 only yields
    #[arg(long = "tick-ms", value_name = "MS", default_value_t = 1)]
    tick_ms: u64,
    /// Allow legacy/insecure crypto suites
    #[arg(short = 'i', long = "insecure", action = ArgAction::SetTrue)]
    insecure: bool,
    /// Prefer zlib compression (similar to OpenSSH's -C)
    #[arg(short = 'C', long, action = ArgAction::SetTrue)]
    compress: bool,
    /// Send keepalive probes every N seconds
    #[arg(long = "keepalive-interval", value_name = "SECONDS", default_value_t = 30)]
    keepalive_interval: u64,
    /// Disconnect after this many unanswered keepalives
    #[arg(long = "keepalive-max", value_name = "COUNT", default_value_t = 3)]
    keepalive_max: usize,
    /// Trace the SSH transport
    #[arg(long, action = ArgAction::SetTrue)]
    pub debug: bool,
}

impl ClientArgs {
    /// Resolve arguments against the environment, prompting for a password if needed.
    pub fn into_config(self) -> Result<ClientConfig> {
        let target = parse_target(&self.target)?;
        let port = self.port.unwrap_or(target.port);
        let username = self
            .username
            .or(target.inferred_username)
            .or_else(fallback_username)
            .ok_or_else(|| anyhow!("unable to determine username; use --username or user@host"))?;
        let password = resolve_password(self.password, &username, &target.host)?;
        let term = self
            .term
            .or_else(|| env::var("TERM").ok())
            .unwrap_or_else(|| "xterm".to_string());
        let display = self.display.or_else(|| env::var("DISPLAY").ok());

        Ok(ClientConfig {
            host: target.host,
            port,
            username,
            password,
            term,
            display,
            x11_socket_dir: self.x11_socket_dir,
            x11_screen: self.x11_screen,
            tick_interval: Duration::from_millis(self.tick_ms),
            insecure: self.insecure,
            prefer_compression: self.compress,
            keepalive_interval: Duration::from_secs(self.keepalive_interval),
            keepalive_max: self.keepalive_max,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
struct TargetParts {
    host: String,
    port: u16,
    inferred_username: Option<String>,
}

fn parse_target(input: &str) -> Result<TargetParts> {
    let (inferred_username, host_part) = match input.rsplit_once('@') {
        Some((user, host)) => (Some(user.to_string()), host),
        None => (None, input),
    };

    let (host, port) = if let Some(bracketed) = host_part.strip_prefix('[') {
        match bracketed.split_once(']') {
            Some((host, "")) => (host.to_string(), 22),
            Some((host, rest)) => {
                let port = rest
                    .strip_prefix(':')
                    .ok_or_else(|| anyhow!("unexpected text after ']' in {input}"))?;
                (host.to_string(), port.parse::<u16>().context("invalid port")?)
            }
            None => return Err(anyhow!("unterminated '[' in {input}")),
        }
    } else if let Some((host, port)) = host_part.rsplit_once(':') {
        (host.to_string(), port.parse::<u16>().context("invalid port")?)
    } else {
        (host_part.to_string(), 22)
    };

    if host.is_empty() {
        return Err(anyhow!("missing host in {input}"));
    }
    Ok(TargetParts {
        host,
        port,
        inferred_username,
    })
}

fn fallback_username() -> Option<String> {
    for key in ["XRELAY_USER", "USER", "LOGNAME", "USERNAME"] {
        if let Ok(value) = env::var(key)
            && !value.is_empty()
        {
            return Some(value);
        }
    }
    let current = whoami::username();
    if current.is_empty() { None } else { Some(current) }
}

fn resolve_password(provided: Option<String>, username: &str, host: &str) -> Result<SecretString> {
    if let Some(value) = provided.or_else(|| env::var("XRELAY_PASSWORD").ok()) {
        return Ok(SecretString::from(value));
    }
    let prompt = format!("{username}@{host} password: ");
    let value = prompt_password(prompt).context("failed to read password interactively")?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn target_with_user_and_port() {
        let parts = parse_target("alice@build.example:2200").unwrap();
        assert_eq!(
            parts,
            TargetParts {
                host: "build.example".into(),
                port: 2200,
                inferred_username: Some("alice".into()),
            }
        );
    }

    #[test]
    fn bare_host_defaults_to_port_22() {
        let parts = parse_target("build.example").unwrap();
        assert_eq!(parts.port, 22);
        assert_eq!(parts.inferred_username, None);
    }

    #[test]
    fn bracketed_ipv6() {
        let parts = parse_target("[::1]:2022").unwrap();
        assert_eq!(parts.host, "::1");
        assert_eq!(parts.port, 2022);
        assert_eq!(parse_target("bob@[fe80::1]").unwrap().port, 22);
    }

    #[test]
    fn bad_targets_error() {
        assert!(parse_target("host:notaport").is_err());
        assert!(parse_target("[::1").is_err());
        assert!(parse_target("@:22").is_err());
    }

    #[test]
    fn explicit_flags_win_over_target() {
        let args = ClientArgs::try_parse_from([
            "xrelay",
            "-l",
            "carol",
            "-p",
            "hunter2",
            "-P",
            "2201",
            "--display",
            ":3",
            "--term",
            "vt100",
            "--tick-ms",
            "0",
            "dave@remote:22",
        ])
        .unwrap();
        let config = args.into_config().unwrap();
        assert_eq!(config.host, "remote");
        assert_eq!(config.port, 2201);
        assert_eq!(config.username, "carol");
        assert_eq!(config.password.expose_secret(), "hunter2");
        assert_eq!(config.display.as_deref(), Some(":3"));
        assert_eq!(config.term, "vt100");
        assert!(config.tick_interval.is_zero());
        assert_eq!(config.x11_socket_dir, PathBuf::from(X11_UNIX_DIR));
        assert_eq!(config.keepalive_max, 3);
    }
}
