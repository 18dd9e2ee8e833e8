use std::process::ExitCode;

#[cfg(unix)]
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    use clap::Parser;
    use xrelay::{cli::ClientArgs, client::run_client};

    let args = ClientArgs::parse();
    init_tracing(args.debug);

    let config = match args.into_config() {
        Ok(config) => config,
        Err(err) => return setup_failure(err),
    };
    match run_client(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => setup_failure(err.into()),
    }
}

#[cfg(not(unix))]
fn main() -> ExitCode {
    eprintln!("Sorry, this platform is not supported.");
    ExitCode::from(1)
}

#[cfg(unix)]
fn setup_failure(err: anyhow::Error) -> ExitCode {
    eprintln!("xrelay: {err:#}");
    ExitCode::from(255)
}

#[cfg(unix)]
fn init_tracing(debug: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if debug { "debug,russh=trace" } else { "info" })
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
