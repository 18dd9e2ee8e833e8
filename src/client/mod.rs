//! SSH session setup on russh: connect, authenticate, request pty/x11/shell, then hand the
//! shell channel to the relay loop.

mod channel;
mod handler;

use std::{path::PathBuf, sync::Arc, time::Duration};

use russh::{Disconnect, client};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{info, warn};

pub use channel::{ChannelInbox, ChannelPort, Reply, X11_AUTH_PROTOCOL, x11_cookie};
pub use handler::ForwardingHandler;

use crate::{
    crypto::preferred,
    display::UnixDisplayConnector,
    error::{RelayError, RelayResult},
    relay::{ConnectionAcceptor, ForwardRequest, PrimarySession, RelayLoop, RelayOptions},
    terminal::{HostTerminal, current_pty_modes, initial_geometry},
};

#[derive(Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub term: String,
    pub display: Option<String>,
    pub x11_socket_dir: PathBuf,
    pub x11_screen: u32,
    pub tick_interval: Duration,
    pub insecure: bool,
    pub prefer_compression: bool,
    pub keepalive_interval: Duration,
    pub keepalive_max: usize,
}

type SessionHandle = client::Handle<ForwardingHandler>;

pub async fn run_client(args: ClientConfig) -> RelayResult<()> {
    let ClientConfig {
        host,
        port,
        username,
        password,
        term,
        display,
        x11_socket_dir,
        x11_screen,
        tick_interval,
        insecure,
        prefer_compression,
        keepalive_interval,
        keepalive_max,
    } = args;
    if insecure {
        warn!("insecure mode enabled: using legacy cipher suite");
    }

    let config = Arc::new(client::Config {
        preferred: preferred(insecure, prefer_compression),
        inactivity_timeout: None,
        keepalive_interval: Some(keepalive_interval),
        keepalive_max,
        ..Default::default()
    });

    let (x11_tx, x11_rx) = mpsc::unbounded_channel();
    let handler = ForwardingHandler::new(x11_tx);
    info!("connecting to {host}:{port}");
    let mut session = client::connect(config, (host.as_str(), port), handler).await?;

    let auth = session
        .authenticate_password(username.clone(), password.expose_secret())
        .await?;
    if !auth.success() {
        return Err(RelayError::AuthFailed(format!("password rejected for {username}")));
    }
    info!(user = %username, "authenticated");

    let options = RelayOptions { display, tick_interval };
    let acceptor = ConnectionAcceptor::with_socket_dir(UnixDisplayConnector, x11_socket_dir);
    let outcome = run_shell(&session, &term, x11_screen, acceptor, x11_rx, options).await;

    if let Err(err) = session.disconnect(Disconnect::ByApplication, "Normal Shutdown", "").await {
        warn!(?err, "SSH disconnect failed");
    }
    outcome
}

async fn run_shell(
    session: &SessionHandle,
    term: &str,
    x11_screen: u32,
    acceptor: ConnectionAcceptor<UnixDisplayConnector>,
    x11_rx: UnboundedReceiver<ForwardRequest<ChannelPort>>,
    options: RelayOptions,
) -> RelayResult<()> {
    let mut shell = ChannelPort::new(session.channel_open_session().await?);
    let geometry = initial_geometry();
    shell.request_pty(term, geometry, &current_pty_modes()).await?;
    shell.request_x11(&x11_cookie(), x11_screen).await?;
    shell.request_shell().await?;
    info!(size = %geometry, "shell started with x11 forwarding");

    let mut relay = RelayLoop::new(
        PrimarySession::new(shell, geometry),
        HostTerminal::new(),
        acceptor,
        x11_rx,
        options,
    );
    relay.run().await
}
