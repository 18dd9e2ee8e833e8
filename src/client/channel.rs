//! Adapts a russh [`Channel`] to the relay's non-blocking channel traits.

use std::{collections::VecDeque, pin::Pin};

use async_trait::async_trait;
use futures::FutureExt;
use russh::{Channel, ChannelMsg, Pty, client::Msg};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::{
    error::{RelayError, RelayResult},
    relay::{ChannelKey, ForwardChannel, Geometry, ShellChannel},
};

/// Authentication protocol advertised in the x11 request.
pub const X11_AUTH_PROTOCOL: &str = "MIT-MAGIC-COOKIE-1";

/// How the server answered a want-reply channel request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reply {
    Success,
    Failure,
}

impl Reply {
    pub fn into_result(self, request: &'static str) -> RelayResult<()> {
        match self {
            Reply::Success => Ok(()),
            Reply::Failure => Err(RelayError::RequestRejected { request }),
        }
    }
}

/// Channel messages folded into unread bytes, an end-of-stream flag and request replies.
///
/// End-of-stream is only reported once every received byte has been read.
#[derive(Debug, Default)]
pub struct ChannelInbox {
    pending: VecDeque<u8>,
    remote_eof: bool,
}

impl ChannelInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one message from the channel; `None` means russh dropped the channel.
    pub fn ingest(&mut self, msg: Option<ChannelMsg>) -> Option<Reply> {
        match msg {
            Some(ChannelMsg::Data { data } | ChannelMsg::ExtendedData { data, .. }) => {
                self.pending.extend(data.iter().copied());
            }
            Some(ChannelMsg::Eof | ChannelMsg::Close) | None => self.remote_eof = true,
            Some(ChannelMsg::ExitStatus { exit_status }) => debug!(exit_status, "remote exit status"),
            Some(ChannelMsg::Success) => return Some(Reply::Success),
            Some(ChannelMsg::Failure) => return Some(Reply::Failure),
            Some(_) => {}
        }
        None
    }

    pub fn has_data(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        n
    }

    /// The peer has finished sending, whether or not the bytes were read yet.
    pub fn remote_eof(&self) -> bool {
        self.remote_eof
    }

    pub fn is_eof(&self) -> bool {
        self.remote_eof && self.pending.is_empty()
    }
}

/// A russh channel plus the bytes it has delivered but the relay has not read yet.
pub struct ChannelPort {
    channel: Channel<Msg>,
    writer: Pin<Box<dyn AsyncWrite + Send>>,
    key: ChannelKey,
    inbox: ChannelInbox,
    closed: bool,
}

impl ChannelPort {
    pub fn new(channel: Channel<Msg>) -> Self {
        let key = ChannelKey(u32::from(channel.id()));
        let writer = Box::pin(channel.make_writer());
        Self {
            channel,
            writer,
            key,
            inbox: ChannelInbox::new(),
            closed: false,
        }
    }

    pub async fn request_pty(&mut self, term: &str, geometry: Geometry, modes: &[(Pty, u32)]) -> RelayResult<()> {
        self.channel
            .request_pty(true, term, geometry.cols.into(), geometry.rows.into(), 0, 0, modes)
            .await?;
        self.await_reply("pty").await
    }

    pub async fn request_x11(&mut self, cookie: &str, screen: u32) -> RelayResult<()> {
        self.channel.request_x11(true, false, X11_AUTH_PROTOCOL, cookie, screen).await?;
        self.await_reply("x11").await
    }

    pub async fn request_shell(&mut self) -> RelayResult<()> {
        self.channel.request_shell(true).await?;
        self.await_reply("shell").await
    }

    async fn await_reply(&mut self, request: &'static str) -> RelayResult<()> {
        loop {
            if self.inbox.remote_eof() {
                return Err(RelayError::Other(format!("channel closed while awaiting {request} reply")));
            }
            let msg = self.channel.wait().await;
            if let Some(reply) = self.inbox.ingest(msg) {
                return reply.into_result(request);
            }
        }
    }

    /// Move every message russh has already queued into the inbox, without waiting.
    fn pump(&mut self) {
        while !self.inbox.remote_eof() {
            let Some(msg) = self.channel.wait().now_or_never() else {
                break;
            };
            self.inbox.ingest(msg);
        }
    }
}

#[async_trait]
impl ForwardChannel for ChannelPort {
    fn key(&self) -> ChannelKey {
        self.key
    }

    fn poll_readable(&mut self) -> bool {
        self.pump();
        self.inbox.has_data()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.inbox.read(buf)
    }

    fn is_eof(&self) -> bool {
        self.inbox.is_eof()
    }

    fn try_write(&mut self, data: &[u8]) -> RelayResult<usize> {
        // A packet still queued from an earlier write goes out first.
        match self.writer.flush().now_or_never() {
            None => return Ok(0),
            Some(flushed) => flushed?,
        }
        match self.writer.write(data).now_or_never() {
            None => Ok(0),
            Some(written) => Ok(written?),
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(Err(err)) = self.writer.flush().now_or_never() {
            debug!(channel = %self.key, ?err, "unsent channel data dropped");
        }
        if let Err(err) = self.channel.close().await {
            debug!(channel = %self.key, ?err, "channel close failed");
        }
    }
}

#[async_trait]
impl ShellChannel for ChannelPort {
    async fn resize(&mut self, geometry: Geometry) -> RelayResult<()> {
        self.channel
            .window_change(geometry.cols.into(), geometry.rows.into(), 0, 0)
            .await?;
        Ok(())
    }

    async fn send_eof(&mut self) -> RelayResult<()> {
        self.writer.flush().await?;
        self.channel.eof().await?;
        Ok(())
    }
}

/// A fresh random cookie for the x11 request, hex encoded.
pub fn x11_cookie() -> String {
    rand::random::<[u8; 16]>().iter().map(|b| format!("{b:02x}")).collect()
}
