use std::{collections::BTreeMap, fmt};

use futures::future::BoxFuture;
use tracing::debug;

use super::{Backlog, ChannelKey, DisplaySocket, ForwardChannel, PairStatus, SocketKey};
use crate::error::RelayError;

/// Synthetic identifier for a registered pair; allocation order doubles as visit order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairId(u64);

impl fmt::Display for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x11-{}", self.0)
    }
}

/// One forwarded connection: a transport channel bridged to a local display socket, plus
/// the bytes each side has not yet accepted.
pub struct EndpointPair<C, S> {
    pub channel: C,
    pub socket: S,
    pub(crate) to_socket: Backlog,
    pub(crate) to_channel: Backlog,
}

impl<C: ForwardChannel, S: DisplaySocket> EndpointPair<C, S> {
    pub fn new(channel: C, socket: S) -> Self {
        Self {
            channel,
            socket,
            to_socket: Backlog::new(),
            to_channel: Backlog::new(),
        }
    }

    /// Bytes read from the channel that the display socket has not taken yet.
    pub fn unsent_to_socket(&self) -> usize {
        self.to_socket.len()
    }

    /// Bytes read from the display socket that the channel has not taken yet.
    pub fn unsent_to_channel(&self) -> usize {
        self.to_channel.len()
    }

    pub fn keys(&self) -> (ChannelKey, SocketKey) {
        (self.channel.key(), self.socket.key())
    }

    /// Close the socket in both directions, then release the channel handle.
    pub async fn release(mut self) {
        self.socket.shutdown().await;
        self.channel.close().await;
    }
}

/// A pair refused by [`PairRegistry::insert`].
pub struct Rejected<C, S> {
    pub error: RelayError,
    pub pair: EndpointPair<C, S>,
}

/// Counts from one [`PairRegistry::for_each_removing`] pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub visited: usize,
    pub removed: usize,
}

/// Live forwarded connections, keyed by [`PairId`].
pub struct PairRegistry<C, S> {
    pairs: BTreeMap<PairId, EndpointPair<C, S>>,
    next_id: u64,
}

impl<C, S> Default for PairRegistry<C, S> {
    fn default() -> Self {
        Self {
            pairs: BTreeMap::new(),
            next_id: 0,
        }
    }
}

impl<C: ForwardChannel, S: DisplaySocket> PairRegistry<C, S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn contains(&self, id: PairId) -> bool {
        self.pairs.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<PairId> {
        self.pairs.keys().copied().collect()
    }

    /// Register a live pair. Fails with [`RelayError::DuplicateEndpoint`] if its channel or
    /// socket already belongs to another pair, handing the pair back to the caller.
    pub fn insert(&mut self, pair: EndpointPair<C, S>) -> Result<PairId, Rejected<C, S>> {
        let (channel, socket) = pair.keys();
        if let Some(clash) = self.clash(channel, socket) {
            return Err(Rejected {
                error: RelayError::DuplicateEndpoint(clash),
                pair,
            });
        }
        let id = PairId(self.next_id);
        self.next_id += 1;
        self.pairs.insert(id, pair);
        debug!(pair = %id, %channel, %socket, live = self.pairs.len(), "registered forwarded connection");
        Ok(id)
    }

    fn clash(&self, channel: ChannelKey, socket: SocketKey) -> Option<String> {
        self.pairs.values().find_map(|existing| {
            let (c, s) = existing.keys();
            if c == channel {
                Some(format!("channel {channel}"))
            } else if s == socket {
                Some(format!("socket {socket}"))
            } else {
                None
            }
        })
    }

    /// Run `step` once on every live pair, removing and releasing each pair whose step
    /// reports [`PairStatus::Ended`] before moving on to the next.
    pub async fn for_each_removing<F>(&mut self, mut step: F) -> PassSummary
    where
        F: for<'a> FnMut(&'a mut EndpointPair<C, S>) -> BoxFuture<'a, PairStatus>,
    {
        let mut summary = PassSummary::default();
        for id in self.ids() {
            let Some(pair) = self.pairs.get_mut(&id) else {
                continue;
            };
            summary.visited += 1;
            if step(pair).await == PairStatus::Ended
                && let Some(pair) = self.pairs.remove(&id)
            {
                pair.release().await;
                summary.removed += 1;
                debug!(pair = %id, live = self.pairs.len(), "forwarded connection ended");
            }
        }
        summary
    }

    /// Drop every pair without relaying further; returns how many were abandoned.
    pub fn abandon(&mut self) -> usize {
        let count = self.pairs.len();
        self.pairs.clear();
        count
    }
}
