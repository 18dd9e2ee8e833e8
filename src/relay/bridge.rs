use std::fmt;

use tracing::{debug, warn};

use super::{Backlog, InputEvent, SHELL_BUFFER_SIZE, ShellChannel, Terminal};
use crate::error::RelayResult;

/// Terminal size in character cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub cols: u16,
    pub rows: u16,
}

impl Geometry {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeStatus {
    Open,
    EndOfStream,
}

/// State of the interactive shell side of the relay.
pub struct PrimarySession<H> {
    pub(crate) shell: H,
    geometry: Geometry,
    input: Backlog,
    raw_mode: bool,
    input_closed: bool,
}

impl<H: ShellChannel> PrimarySession<H> {
    /// `geometry` is the size the pty was requested with.
    pub fn new(shell: H, geometry: Geometry) -> Self {
        Self {
            shell,
            geometry,
            input: Backlog::new(),
            raw_mode: false,
            input_closed: false,
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn raw_mode(&self) -> bool {
        self.raw_mode
    }

    pub fn shell(&self) -> &H {
        &self.shell
    }

    /// Keyboard bytes read locally that the shell channel has not accepted yet.
    pub fn unsent_input(&self) -> usize {
        self.input.len()
    }

    pub(crate) fn set_raw_mode(&mut self, raw: bool) {
        self.raw_mode = raw;
    }

    async fn sync_geometry<T: Terminal>(&mut self, terminal: &T) {
        let current = match terminal.geometry() {
            Ok(geometry) => geometry,
            Err(err) => {
                debug!(?err, "terminal size unavailable");
                return;
            }
        };
        if current == self.geometry {
            return;
        }
        self.geometry = current;
        debug!(size = %current, "terminal resized");
        if let Err(err) = self.shell.resize(current).await {
            warn!(?err, "failed to send window change");
        }
    }
}

/// One non-blocking pass over the shell: propagate a resize, copy pending shell output to
/// the terminal, and forward at most one byte of keyboard input.
///
/// A keystroke the channel cannot take yet is retried on later ticks, and no further input
/// is read until it has gone out.
///
/// Only a failure to write local output is returned as an error.
pub async fn bridge_step<H, T>(session: &mut PrimarySession<H>, terminal: &mut T) -> RelayResult<BridgeStatus>
where
    H: ShellChannel,
    T: Terminal,
{
    session.sync_geometry(terminal).await;

    if session.shell.poll_readable() {
        let mut buf = Vec::new();
        match buf.try_reserve_exact(SHELL_BUFFER_SIZE) {
            Ok(()) => {
                buf.resize(SHELL_BUFFER_SIZE, 0);
                let n = session.shell.read(&mut buf);
                if n > 0 {
                    terminal.write_output(&buf[..n])?;
                }
            }
            Err(err) => warn!(?err, "no memory for shell buffer; skipping output this tick"),
        }
    }

    if session.input.is_empty() && !session.input_closed {
        match terminal.poll_input() {
            Ok(InputEvent::Idle) => {}
            Ok(InputEvent::Byte(byte)) => match session.input.spare(1) {
                Ok(buf) => {
                    buf[0] = byte;
                    session.input.commit(1);
                }
                Err(err) => warn!(?err, "no memory for keyboard input; dropping byte"),
            },
            Ok(InputEvent::Eof) => {
                session.input_closed = true;
                debug!("local input closed");
                if let Err(err) = session.shell.send_eof().await {
                    warn!(?err, "failed to send EOF to shell");
                }
            }
            Err(err) => debug!(?err, "local input poll failed"),
        }
    }
    if let Err(err) = session.input.flush(|bytes| session.shell.try_write(bytes)) {
        warn!(?err, "failed to forward keyboard input");
        session.input.clear();
    }

    if session.shell.is_eof() {
        Ok(BridgeStatus::EndOfStream)
    } else {
        Ok(BridgeStatus::Open)
    }
}
