use std::path::PathBuf;

use tracing::{debug, warn};

use super::{DisplayConnector, DisplaySocket, EndpointPair, ForwardChannel, PairId, PairRegistry, Rejected};
use crate::display::{X11_UNIX_DIR, resolve_display};

/// What happened to one forwarded-connection request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcceptOutcome {
    Registered(PairId),
    /// No descriptor, or one that does not name a local display.
    Unsupported,
    ConnectFailed,
    Duplicate,
}

/// Turns server-initiated X11 channels into registered pairs.
pub struct ConnectionAcceptor<D> {
    connector: D,
    socket_dir: PathBuf,
}

impl<D: DisplayConnector> ConnectionAcceptor<D> {
    pub fn new(connector: D) -> Self {
        Self::with_socket_dir(connector, X11_UNIX_DIR)
    }

    pub fn with_socket_dir(connector: D, socket_dir: impl Into<PathBuf>) -> Self {
        Self {
            connector,
            socket_dir: socket_dir.into(),
        }
    }

    /// Connect `channel` to the display named by `descriptor` and register the pair.
    ///
    /// Every failure is a silent drop: nothing is registered and the channel handle is
    /// left to the transport.
    pub async fn accept<C>(
        &self,
        registry: &mut PairRegistry<C, D::Socket>,
        channel: C,
        descriptor: Option<&str>,
    ) -> AcceptOutcome
    where
        C: ForwardChannel,
    {
        let key = channel.key();
        let Some(address) = descriptor.and_then(|d| resolve_display(d, &self.socket_dir)) else {
            debug!(channel = %key, ?descriptor, "display is not a local socket; dropping x11 request");
            return AcceptOutcome::Unsupported;
        };

        let socket = match self.connector.connect(&address).await {
            Ok(socket) => socket,
            Err(err) => {
                debug!(channel = %key, path = %address.path.display(), ?err, "display connect failed");
                return AcceptOutcome::ConnectFailed;
            }
        };

        match registry.insert(EndpointPair::new(channel, socket)) {
            Ok(id) => AcceptOutcome::Registered(id),
            Err(Rejected { error, mut pair }) => {
                warn!(channel = %key, %error, "refusing x11 connection");
                pair.socket.shutdown().await;
                AcceptOutcome::Duplicate
            }
        }
    }
}
