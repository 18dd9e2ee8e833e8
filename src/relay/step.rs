use tracing::{debug, warn};

use super::{DisplaySocket, EndpointPair, ForwardChannel, RELAY_BUFFER_SIZE};

/// Outcome of one relay attempt on a pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PairStatus {
    Open,
    Ended,
}

/// Move at most one buffer of bytes in each direction between a pair's channel and socket.
///
/// Never waits: a side with nothing ready, or with no room to write, is skipped for this
/// tick. Whatever a side does not accept stays in that direction's backlog, and the source
/// of that direction is not read again until the backlog has drained. The pair has ended
/// when the socket read yields no bytes or fails, or when the channel is at EOF.
pub async fn relay_step<C, S>(pair: &mut EndpointPair<C, S>) -> PairStatus
where
    C: ForwardChannel,
    S: DisplaySocket,
{
    if pair.to_socket.is_empty() && pair.channel.poll_readable() {
        match pair.to_socket.spare(RELAY_BUFFER_SIZE) {
            Ok(buf) => {
                let n = pair.channel.read(buf);
                pair.to_socket.commit(n);
            }
            Err(err) => warn!(?err, "no memory for relay buffer; skipping this tick"),
        }
    }
    if let Err(err) = pair.to_socket.flush(|bytes| pair.socket.try_write(bytes)) {
        debug!(channel = %pair.channel.key(), socket = %pair.socket.key(), ?err, "display socket write failed");
        pair.to_socket.clear();
    }

    if pair.to_channel.is_empty() {
        match pair.to_channel.spare(RELAY_BUFFER_SIZE) {
            Ok(buf) => match pair.socket.try_read(buf) {
                Ok(None) => pair.to_channel.commit(0),
                Ok(Some(0)) => {
                    pair.to_channel.commit(0);
                    return PairStatus::Ended;
                }
                Ok(Some(n)) => pair.to_channel.commit(n),
                Err(err) => {
                    pair.to_channel.commit(0);
                    debug!(socket = %pair.socket.key(), ?err, "display socket read failed");
                    return PairStatus::Ended;
                }
            },
            Err(err) => warn!(?err, "no memory for relay buffer; skipping this tick"),
        }
    }
    if let Err(err) = pair.to_channel.flush(|bytes| pair.channel.try_write(bytes)) {
        debug!(channel = %pair.channel.key(), ?err, "forward channel write failed");
        pair.to_channel.clear();
    }

    if pair.channel.is_eof() {
        return PairStatus::Ended;
    }
    PairStatus::Open
}
