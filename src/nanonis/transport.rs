use crate::error::NanonisError;
use log::debug;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};

/// Duplex byte stream the client talks over.
///
/// Implementations may transfer fewer bytes than requested; the client
/// loops until a whole frame has gone through. `Ok(0)` from either side
/// means the peer closed the stream.
pub trait Transport: Send {
    fn send(&mut self, buf: &[u8]) -> std::io::Result<usize>;
    fn recv(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
    fn close(&mut self) -> std::io::Result<()>;
}

impl Transport for TcpStream {
    fn send(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write(buf)
    }

    fn recv(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.read(buf)
    }

    fn close(&mut self) -> std::io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

fn transport_error(e: std::io::Error, context: String) -> NanonisError {
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => NanonisError::Timeout,
        _ => NanonisError::Io { source: e, context },
    }
}

/// Write the whole buffer, retrying short writes.
pub fn write_all<T: Transport + ?Sized>(
    transport: &mut T,
    mut buf: &[u8],
    what: &str,
) -> Result<(), NanonisError> {
    while !buf.is_empty() {
        match transport.send(buf) {
            Ok(0) => {
                return Err(NanonisError::Io {
                    source: ErrorKind::WriteZero.into(),
                    context: format!("Writing {what}: connection closed"),
                })
            }
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("Failed to write {}: {} (kind: {:?})", what, e, e.kind());
                return Err(transport_error(e, format!("Writing {what}")));
            }
        }
    }
    Ok(())
}

/// Fill the whole buffer, retrying short reads.
pub fn read_exact<T: Transport + ?Sized>(
    transport: &mut T,
    buf: &mut [u8],
    what: &str,
) -> Result<(), NanonisError> {
    let mut filled = 0;
    while filled < buf.len() {
        match transport.recv(&mut buf[filled..]) {
            Ok(0) => {
                return Err(NanonisError::Io {
                    source: ErrorKind::UnexpectedEof.into(),
                    context: format!(
                        "Reading {}: connection closed after {} of {} bytes",
                        what,
                        filled,
                        buf.len()
                    ),
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("Failed to read {}: {} (kind: {:?})", what, e, e.kind());
                return Err(transport_error(e, format!("Reading {what}")));
            }
        }
    }
    Ok(())
}

/// In-memory transports for exercising the client without a controller
#[cfg(test)]
pub(crate) mod mock {
    use super::Transport;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::io::ErrorKind;
    use std::sync::Arc;
    use std::time::Duration;

    /// Log of everything written, shared between clones.
    pub type WriteLog = Arc<Mutex<Vec<u8>>>;

    /// Scripted transport: returns queued responses and records writes.
    /// Each `send`/`recv` transfers at most `chunk` bytes.
    pub struct MockTransport {
        pub written: WriteLog,
        pub incoming: VecDeque<u8>,
        pub chunk: usize,
        pub write_delay: Option<Duration>,
        pub fail_writes: bool,
        pub closed: Arc<Mutex<usize>>,
    }

    impl MockTransport {
        pub fn new(incoming: Vec<u8>) -> Self {
            Self {
                written: Arc::new(Mutex::new(Vec::new())),
                incoming: incoming.into(),
                chunk: usize::MAX,
                write_delay: None,
                fail_writes: false,
                closed: Arc::new(Mutex::new(0)),
            }
        }

        pub fn chunked(mut self, chunk: usize) -> Self {
            self.chunk = chunk;
            self
        }
    }

    impl Transport for MockTransport {
        fn send(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.fail_writes {
                return Err(ErrorKind::BrokenPipe.into());
            }
            let n = buf.len().min(self.chunk);
            for byte in &buf[..n] {
                if let Some(delay) = self.write_delay {
                    std::thread::sleep(delay);
                }
                self.written.lock().push(*byte);
            }
            Ok(n)
        }

        fn recv(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.chunk).min(self.incoming.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.incoming.pop_front().unwrap_or_default();
            }
            Ok(n)
        }

        fn close(&mut self) -> std::io::Result<()> {
            *self.closed.lock() += 1;
            Ok(())
        }
    }
}
