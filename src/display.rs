//! Local X display endpoints: resolving a `DISPLAY` value to a rendezvous socket and the
//! Unix-domain socket the relay writes into.

use std::{
    io,
    os::fd::AsRawFd,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use rustix::{
    io::Errno,
    net::{SendFlags, Shutdown},
};
use tokio::net::UnixStream;
use tracing::debug;

use crate::relay::{DisplayConnector, DisplaySocket, SocketKey};

/// Directory holding the `X<n>` sockets of local X servers.
pub const X11_UNIX_DIR: &str = "/tmp/.X11-unix";

/// Where a display descriptor points on this host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayAddress {
    pub display: u32,
    pub path: PathBuf,
}

/// Resolve a display descriptor such as `:0`, `:1.0` or `unix:2`.
///
/// Only same-host Unix-domain displays are supported; anything else (for example
/// `localhost:10.0`) yields `None`.
pub fn resolve_display(descriptor: &str, socket_dir: &Path) -> Option<DisplayAddress> {
    if !(descriptor.starts_with("unix:") || descriptor.starts_with(':')) {
        return None;
    }
    let (_, suffix) = descriptor.rsplit_once(':')?;
    let display = leading_number(suffix)?;
    Some(DisplayAddress {
        display,
        path: socket_dir.join(format!("X{display}")),
    })
}

/// Parse leading ASCII digits; an empty run counts as 0 and the screen suffix is ignored.
fn leading_number(text: &str) -> Option<u32> {
    let digits = text.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return Some(0);
    }
    text[..digits].parse().ok()
}

/// Connects to display sockets with tokio's Unix-domain streams.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnixDisplayConnector;

#[async_trait]
impl DisplayConnector for UnixDisplayConnector {
    type Socket = UnixDisplaySocket;

    async fn connect(&self, address: &DisplayAddress) -> io::Result<Self::Socket> {
        let stream = UnixStream::connect(&address.path).await?;
        Ok(UnixDisplaySocket::new(stream))
    }
}

pub struct UnixDisplaySocket {
    stream: UnixStream,
    key: SocketKey,
}

impl UnixDisplaySocket {
    pub fn new(stream: UnixStream) -> Self {
        let key = SocketKey(stream.as_raw_fd());
        Self { stream, key }
    }
}

#[async_trait]
impl DisplaySocket for UnixDisplaySocket {
    fn key(&self) -> SocketKey {
        self.key
    }

    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.stream.try_read(buf) {
            Ok(n) => Ok(Some(n)),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn try_write(&mut self, data: &[u8]) -> io::Result<usize> {
        // Sent on the raw fd so the result never depends on tokio's readiness cache.
        match rustix::net::send(&self.stream, data, SendFlags::NOSIGNAL) {
            Ok(n) => Ok(n),
            Err(Errno::AGAIN | Errno::INTR) => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    async fn shutdown(&mut self) {
        if let Err(err) = rustix::net::shutdown(&self.stream, Shutdown::ReadWrite) {
            debug!(socket = %self.key, ?err, "display socket shutdown failed");
        }
    }
}
