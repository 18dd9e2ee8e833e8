use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use super::{
    BridgeStatus, ConnectionAcceptor, DisplayConnector, ForwardChannel, PairRegistry, PrimarySession, ShellChannel,
    Terminal, bridge_step, relay_step,
};
use crate::error::{RelayError, RelayResult};

/// A channel the server opened for a new X11 client, queued for the loop to accept.
pub struct ForwardRequest<C> {
    pub channel: C,
    /// `address:port` the server reported for the X11 client.
    pub originator: String,
}

#[derive(Clone, Debug)]
pub struct RelayOptions {
    /// Display descriptor handed to the acceptor, usually `$DISPLAY`.
    pub display: Option<String>,
    /// Pause between ticks; zero only yields to the runtime.
    pub tick_interval: Duration,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            display: None,
            tick_interval: Duration::from_millis(1),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

/// Drives the shell bridge and every forwarded pair until the shell reaches end-of-stream.
pub struct RelayLoop<H, C, T, D: DisplayConnector> {
    session: PrimarySession<H>,
    terminal: T,
    registry: PairRegistry<C, D::Socket>,
    acceptor: ConnectionAcceptor<D>,
    requests: UnboundedReceiver<ForwardRequest<C>>,
    options: RelayOptions,
    state: LoopState,
    torn_down: bool,
}

impl<H, C, T, D> RelayLoop<H, C, T, D>
where
    H: ShellChannel,
    C: ForwardChannel,
    T: Terminal,
    D: DisplayConnector,
{
    pub fn new(
        session: PrimarySession<H>,
        terminal: T,
        acceptor: ConnectionAcceptor<D>,
        requests: UnboundedReceiver<ForwardRequest<C>>,
        options: RelayOptions,
    ) -> Self {
        Self {
            session,
            terminal,
            registry: PairRegistry::new(),
            acceptor,
            requests,
            options,
            state: LoopState::Running,
            torn_down: false,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn session(&self) -> &PrimarySession<H> {
        &self.session
    }

    pub fn terminal(&self) -> &T {
        &self.terminal
    }

    pub fn registry(&self) -> &PairRegistry<C, D::Socket> {
        &self.registry
    }

    /// Enter raw mode, tick until stopped, then tear down.
    ///
    /// Terminal mode is restored exactly once on every path out of this function.
    pub async fn run(&mut self) -> RelayResult<()> {
        if let Err(err) = self.terminal.enter_raw_mode() {
            self.stop().await;
            return Err(RelayError::RawMode(err));
        }
        self.session.set_raw_mode(true);
        info!(display = ?self.options.display, "relay loop running");

        let outcome = loop {
            match self.tick().await {
                Ok(LoopState::Running) => self.pace().await,
                Ok(LoopState::Stopped) => break Ok(()),
                Err(err) => break Err(err),
            }
        };
        self.stop().await;
        outcome
    }

    /// One pass: shell first, then queued X11 requests, then every registered pair.
    pub async fn tick(&mut self) -> RelayResult<LoopState> {
        if self.state == LoopState::Stopped {
            return Ok(LoopState::Stopped);
        }
        let status = bridge_step(&mut self.session, &mut self.terminal).await?;
        self.accept_pending().await;
        self.registry.for_each_removing(|pair| relay_step(pair).boxed()).await;
        if status == BridgeStatus::EndOfStream {
            debug!("shell reached end of stream");
            self.state = LoopState::Stopped;
        }
        Ok(self.state)
    }

    async fn accept_pending(&mut self) {
        while let Ok(request) = self.requests.try_recv() {
            let outcome = self
                .acceptor
                .accept(&mut self.registry, request.channel, self.options.display.as_deref())
                .await;
            debug!(originator = %request.originator, ?outcome, "x11 channel request handled");
        }
    }

    async fn pace(&self) {
        if self.options.tick_interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.options.tick_interval).await;
        }
    }

    async fn stop(&mut self) {
        self.state = LoopState::Stopped;
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        if let Err(err) = self.terminal.restore_mode() {
            warn!(?err, "failed to restore terminal mode");
        }
        self.session.set_raw_mode(false);
        self.session.shell.close().await;
        let abandoned = self.registry.abandon();
        if abandoned > 0 {
            debug!(abandoned, "dropping forwarded connections at shutdown");
        }
        self.requests.close();
    }
}
