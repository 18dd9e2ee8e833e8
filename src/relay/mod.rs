//! The relay multiplexer: one interactive shell stream plus any number of forwarded X11
//! connections, serviced by a single polling loop.
//!
//! Every endpoint the loop touches is reached through the traits in this module so the
//! loop itself never depends on russh or on a real terminal. [`crate::client`] and
//! [`crate::display`] provide the production implementations.

mod acceptor;
mod backlog;
mod bridge;
mod driver;
mod registry;
mod step;

use std::{fmt, io};

use async_trait::async_trait;

pub use acceptor::{AcceptOutcome, ConnectionAcceptor};
pub use backlog::Backlog;
pub use bridge::{BridgeStatus, Geometry, PrimarySession, bridge_step};
pub use driver::{ForwardRequest, LoopState, RelayLoop, RelayOptions};
pub use registry::{EndpointPair, PairId, PairRegistry, PassSummary, Rejected};
pub use step::{PairStatus, relay_step};

use crate::{display::DisplayAddress, error::RelayResult};

/// Upper bound on bytes read from one side of a pair per tick, and on what may sit unsent.
pub const RELAY_BUFFER_SIZE: usize = 8192;

/// Upper bound on shell output copied to the local terminal per tick.
pub const SHELL_BUFFER_SIZE: usize = 8192;

/// Identity of a transport channel, unique within one SSH session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelKey(pub u32);

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// Identity of a local socket, unique among open sockets of this process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketKey(pub i32);

impl fmt::Display for SocketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd{}", self.0)
    }
}

/// A logical channel on the secure transport.
///
/// `poll_readable`, `read` and `is_eof` must never wait: they only look at what the
/// transport has already delivered.
#[async_trait]
pub trait ForwardChannel: Send {
    fn key(&self) -> ChannelKey;

    /// Returns true when at least one byte can be read without waiting.
    fn poll_readable(&mut self) -> bool;

    /// Copy already-received bytes into `buf`, returning how many were copied.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// True once the peer has signalled end-of-stream and every received byte was read.
    fn is_eof(&self) -> bool;

    /// Hand as much of `data` to the transport as its window allows right now, returning
    /// how many bytes were taken. Zero means the channel cannot accept data this tick.
    fn try_write(&mut self, data: &[u8]) -> RelayResult<usize>;

    /// Release the channel. Called at most once per handle.
    async fn close(&mut self);
}

/// The primary interactive channel, which additionally carries pty geometry and stdin EOF.
#[async_trait]
pub trait ShellChannel: ForwardChannel {
    async fn resize(&mut self, geometry: Geometry) -> RelayResult<()>;

    async fn send_eof(&mut self) -> RelayResult<()>;
}

/// A connected local display socket, exclusively owned by its pair.
#[async_trait]
pub trait DisplaySocket: Send {
    fn key(&self) -> SocketKey;

    /// Zero-wait readiness probe followed by at most one read.
    ///
    /// `Ok(None)` means nothing is ready this tick; `Ok(Some(0))` means the peer closed.
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;

    /// Write without waiting, returning how many bytes the socket took. Zero means the
    /// socket buffer is full.
    fn try_write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Close both directions of the socket.
    async fn shutdown(&mut self);
}

/// Opens [`DisplaySocket`]s for resolved display addresses.
#[async_trait]
pub trait DisplayConnector: Send + Sync {
    type Socket: DisplaySocket;

    async fn connect(&self, address: &DisplayAddress) -> io::Result<Self::Socket>;
}

/// The local terminal: raw mode, geometry, keyboard input and screen output.
pub trait Terminal {
    fn enter_raw_mode(&mut self) -> io::Result<()>;

    /// Return the terminal to the mode it had before [`Terminal::enter_raw_mode`].
    /// Safe to call when raw mode was never entered.
    fn restore_mode(&mut self) -> io::Result<()>;

    fn geometry(&self) -> io::Result<Geometry>;

    /// Zero-wait poll of local input, yielding at most one byte.
    fn poll_input(&mut self) -> io::Result<InputEvent>;

    /// Write to the local output and flush.
    fn write_output(&mut self, data: &[u8]) -> io::Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    Idle,
    Byte(u8),
    Eof,
}
