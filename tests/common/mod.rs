#![allow(dead_code)]

use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use xrelay::{
    RelayResult,
    display::DisplayAddress,
    relay::{
        ChannelKey, DisplayConnector, DisplaySocket, ForwardChannel, Geometry, InputEvent, ShellChannel, SocketKey,
        Terminal,
    },
};

#[derive(Default)]
pub struct ChannelState {
    pub inbound: VecDeque<u8>,
    pub remote_eof: bool,
    pub written: Vec<u8>,
    pub writes: usize,
    pub resizes: Vec<Geometry>,
    pub eof_sent: usize,
    pub closes: usize,
    /// Bytes the transport window will take before refusing writes; `None` is unlimited.
    pub window: Option<usize>,
}

/// Transport channel whose peer is scripted through the shared state.
#[derive(Clone)]
pub struct MockChannel {
    key: ChannelKey,
    pub state: Arc<Mutex<ChannelState>>,
}

impl MockChannel {
    pub fn new(key: u32) -> Self {
        Self {
            key: ChannelKey(key),
            state: Arc::default(),
        }
    }

    pub fn deliver(&self, bytes: &[u8]) {
        self.state.lock().unwrap().inbound.extend(bytes.iter().copied());
    }

    pub fn hang_up(&self) {
        self.state.lock().unwrap().remote_eof = true;
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.lock().unwrap().written.clone()
    }

    pub fn writes(&self) -> usize {
        self.state.lock().unwrap().writes
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().inbound.len()
    }

    pub fn resizes(&self) -> Vec<Geometry> {
        self.state.lock().unwrap().resizes.clone()
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    /// Limit how many more bytes writes may deliver, as a remote window would.
    pub fn set_window(&self, bytes: usize) {
        self.state.lock().unwrap().window = Some(bytes);
    }
}

#[async_trait]
impl ForwardChannel for MockChannel {
    fn key(&self) -> ChannelKey {
        self.key
    }

    fn poll_readable(&mut self) -> bool {
        !self.state.lock().unwrap().inbound.is_empty()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut state = self.state.lock().unwrap();
        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        n
    }

    fn is_eof(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.remote_eof && state.inbound.is_empty()
    }

    fn try_write(&mut self, data: &[u8]) -> RelayResult<usize> {
        let mut state = self.state.lock().unwrap();
        let n = state.window.map_or(data.len(), |window| window.min(data.len()));
        if let Some(window) = state.window.as_mut() {
            *window -= n;
        }
        state.written.extend_from_slice(&data[..n]);
        state.writes += 1;
        Ok(n)
    }

    async fn close(&mut self) {
        self.state.lock().unwrap().closes += 1;
    }
}

#[async_trait]
impl ShellChannel for MockChannel {
    async fn resize(&mut self, geometry: Geometry) -> RelayResult<()> {
        self.state.lock().unwrap().resizes.push(geometry);
        Ok(())
    }

    async fn send_eof(&mut self) -> RelayResult<()> {
        self.state.lock().unwrap().eof_sent += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct SocketState {
    pub inbound: VecDeque<u8>,
    pub peer_closed: bool,
    pub read_error: bool,
    pub written: Vec<u8>,
    pub shutdowns: usize,
    /// Bytes the socket buffer will take before writes would block; `None` is unlimited.
    pub room: Option<usize>,
}

/// Display socket whose X server side is scripted through the shared state.
#[derive(Clone)]
pub struct MockSocket {
    key: SocketKey,
    pub state: Arc<Mutex<SocketState>>,
}

impl MockSocket {
    pub fn new(key: i32) -> Self {
        Self {
            key: SocketKey(key),
            state: Arc::default(),
        }
    }

    pub fn deliver(&self, bytes: &[u8]) {
        self.state.lock().unwrap().inbound.extend(bytes.iter().copied());
    }

    pub fn close_peer(&self) {
        self.state.lock().unwrap().peer_closed = true;
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.lock().unwrap().written.clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.state.lock().unwrap().shutdowns
    }

    pub fn set_room(&self, bytes: usize) {
        self.state.lock().unwrap().room = Some(bytes);
    }
}

#[async_trait]
impl DisplaySocket for MockSocket {
    fn key(&self) -> SocketKey {
        self.key
    }

    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        let mut state = self.state.lock().unwrap();
        if state.read_error {
            return Err(io::Error::from(io::ErrorKind::ConnectionReset));
        }
        if state.inbound.is_empty() {
            return Ok(if state.peer_closed { Some(0) } else { None });
        }
        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(Some(n))
    }

    fn try_write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        let n = state.room.map_or(data.len(), |room| room.min(data.len()));
        if let Some(room) = state.room.as_mut() {
            *room -= n;
        }
        state.written.extend_from_slice(&data[..n]);
        Ok(n)
    }

    async fn shutdown(&mut self) {
        self.state.lock().unwrap().shutdowns += 1;
    }
}

/// Hands out prepared sockets and records every address it was asked for.
#[derive(Clone, Default)]
pub struct MockConnector {
    pub sockets: Arc<Mutex<VecDeque<MockSocket>>>,
    pub requests: Arc<Mutex<Vec<DisplayAddress>>>,
}

impl MockConnector {
    pub fn with_sockets(sockets: impl IntoIterator<Item = MockSocket>) -> Self {
        let connector = Self::default();
        connector.sockets.lock().unwrap().extend(sockets);
        connector
    }

    pub fn requests(&self) -> Vec<DisplayAddress> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl DisplayConnector for MockConnector {
    type Socket = MockSocket;

    async fn connect(&self, address: &DisplayAddress) -> io::Result<MockSocket> {
        self.requests.lock().unwrap().push(address.clone());
        self.sockets
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused))
    }
}

#[derive(Default)]
pub struct TerminalState {
    /// Sizes reported by successive geometry queries; the last one repeats.
    pub geometries: VecDeque<Geometry>,
    pub input: VecDeque<InputEvent>,
    pub output: Vec<u8>,
    pub raw_entries: usize,
    pub restores: usize,
    pub fail_raw_mode: bool,
    pub fail_output: bool,
}

#[derive(Clone)]
pub struct MockTerminal {
    pub state: Arc<Mutex<TerminalState>>,
}

impl MockTerminal {
    pub fn new(geometry: Geometry) -> Self {
        let state = TerminalState {
            geometries: VecDeque::from([geometry]),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn script_geometry(&self, sizes: impl IntoIterator<Item = Geometry>) {
        let mut state = self.state.lock().unwrap();
        state.geometries = sizes.into_iter().collect();
    }

    pub fn type_bytes(&self, bytes: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .input
            .extend(bytes.iter().map(|&b| InputEvent::Byte(b)));
    }

    pub fn push_input(&self, event: InputEvent) {
        self.state.lock().unwrap().input.push_back(event);
    }

    pub fn output(&self) -> Vec<u8> {
        self.state.lock().unwrap().output.clone()
    }

    pub fn restores(&self) -> usize {
        self.state.lock().unwrap().restores
    }
}

impl Terminal for MockTerminal {
    fn enter_raw_mode(&mut self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_raw_mode {
            return Err(io::Error::other("not a tty"));
        }
        state.raw_entries += 1;
        Ok(())
    }

    fn restore_mode(&mut self) -> io::Result<()> {
        self.state.lock().unwrap().restores += 1;
        Ok(())
    }

    fn geometry(&self) -> io::Result<Geometry> {
        let mut state = self.state.lock().unwrap();
        let size = if state.geometries.len() > 1 {
            state.geometries.pop_front()
        } else {
            state.geometries.front().copied()
        };
        size.ok_or_else(|| io::Error::other("no size"))
    }

    fn poll_input(&mut self) -> io::Result<InputEvent> {
        Ok(self.state.lock().unwrap().input.pop_front().unwrap_or(InputEvent::Idle))
    }

    fn write_output(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_output {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        state.output.extend_from_slice(data);
        Ok(())
    }
}
