use russh::{
    Channel,
    client::{self, Msg, Session},
    keys::{HashAlg, PublicKey},
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use super::channel::ChannelPort;
use crate::{error::RelayError, relay::ForwardRequest};

/// Session callbacks: host-key acceptance and X11 channel opens.
///
/// X11 channels are queued for the relay loop rather than serviced here, so the pair
/// registry stays owned by the loop.
pub struct ForwardingHandler {
    x11_tx: UnboundedSender<ForwardRequest<ChannelPort>>,
}

impl ForwardingHandler {
    pub fn new(x11_tx: UnboundedSender<ForwardRequest<ChannelPort>>) -> Self {
        Self { x11_tx }
    }
}

impl client::Handler for ForwardingHandler {
    type Error = RelayError;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        info!(
            algorithm = %server_public_key.algorithm(),
            fingerprint = %server_public_key.fingerprint(HashAlg::Sha256),
            "accepting server host key"
        );
        Ok(true)
    }

    async fn server_channel_open_x11(
        &mut self,
        channel: Channel<Msg>,
        originator_address: &str,
        originator_port: u32,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        let request = ForwardRequest {
            channel: ChannelPort::new(channel),
            originator: format!("{originator_address}:{originator_port}"),
        };
        debug!(originator = %request.originator, "server opened x11 channel");
        if self.x11_tx.send(request).is_err() {
            debug!("relay loop has stopped; dropping x11 channel");
        }
        Ok(())
    }
}
