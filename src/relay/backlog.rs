use std::collections::TryReserveError;

/// Bytes read from one endpoint that the other endpoint has not accepted yet.
///
/// A direction reads again only once its backlog is empty, so a reader that stops
/// consuming holds back at most one buffer and the source is left unread.
#[derive(Debug, Default)]
pub struct Backlog {
    bytes: Vec<u8>,
}

impl Backlog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Zeroed space for one read of up to `limit` bytes. Follow with [`Backlog::commit`].
    ///
    /// The allocation is kept between reads, so only the first call per backlog can fail.
    pub fn spare(&mut self, limit: usize) -> Result<&mut [u8], TryReserveError> {
        self.bytes.clear();
        self.bytes.try_reserve_exact(limit)?;
        self.bytes.resize(limit, 0);
        Ok(&mut self.bytes)
    }

    /// Keep the first `filled` bytes of the last [`Backlog::spare`] slice.
    pub fn commit(&mut self, filled: usize) {
        self.bytes.truncate(filled);
    }

    /// Offer the backlog to `write` and drop whatever it accepted from the front.
    pub fn flush<E>(&mut self, write: impl FnOnce(&[u8]) -> Result<usize, E>) -> Result<usize, E> {
        if self.bytes.is_empty() {
            return Ok(0);
        }
        let taken = write(&self.bytes)?.min(self.bytes.len());
        self.bytes.drain(..taken);
        Ok(taken)
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    fn filled(data: &[u8]) -> Backlog {
        let mut backlog = Backlog::new();
        backlog.spare(16).unwrap()[..data.len()].copy_from_slice(data);
        backlog.commit(data.len());
        backlog
    }

    #[test]
    fn partial_writes_keep_the_tail_in_order() {
        let mut backlog = filled(b"abcdef");
        let mut sink = Vec::new();

        let taken = backlog
            .flush(|bytes| {
                sink.extend_from_slice(&bytes[..2]);
                Ok::<_, Infallible>(2)
            })
            .unwrap();
        assert_eq!(taken, 2);
        assert_eq!(backlog.len(), 4);

        backlog
            .flush(|bytes| {
                sink.extend_from_slice(bytes);
                Ok::<_, Infallible>(bytes.len())
            })
            .unwrap();
        assert!(backlog.is_empty());
        assert_eq!(sink, b"abcdef");
    }

    #[test]
    fn refused_write_keeps_everything() {
        let mut backlog = filled(b"xyz");
        assert_eq!(backlog.flush(|_| Ok::<_, Infallible>(0)).unwrap(), 0);
        assert_eq!(backlog.len(), 3);
    }

    #[test]
    fn empty_backlog_never_calls_writer() {
        let mut backlog = Backlog::new();
        let taken = backlog
            .flush(|_| -> Result<usize, Infallible> { panic!("writer called with nothing to send") })
            .unwrap();
        assert_eq!(taken, 0);
    }

    #[test]
    fn spare_reuses_its_allocation() {
        let mut backlog = filled(b"abc");
        backlog.clear();
        let capacity = backlog.bytes.capacity();
        assert_eq!(backlog.spare(16).unwrap().len(), 16);
        backlog.commit(0);
        assert_eq!(backlog.bytes.capacity(), capacity);
    }
}
