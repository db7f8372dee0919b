//! Local IPC endpoints the engine writes frames into.
//!
//! The ingest channel only needs two blocking operations, wait for the peer
//! and read one message, expressed by [`MessageSource`]. Two sources exist:
//!
//! - [`UnixSocketSource`]: a Unix domain socket carrying newline-delimited
//!   UTF-8 messages (one JSON object per line).
//! - [`ChannelSource`]: an in-process channel, for engines embedded in the
//!   same process.

use std::io::{self, BufRead};
use std::sync::mpsc;

/// Result of one blocking read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// One complete text message.
    Message(String),
    /// A message longer than the size limit was discarded.
    Oversized(usize),
    /// The peer closed its end.
    Closed,
}

/// Blocking, message-oriented, inbound-only channel with a single peer.
pub trait MessageSource {
    /// Block until the peer connects.
    fn accept(&mut self) -> io::Result<()>;

    /// Block until the next message, end of channel, or an error.
    fn read_message(&mut self) -> io::Result<ReadOutcome>;

    /// Human-readable endpoint name for logs.
    fn describe(&self) -> String;
}

/// Whether an I/O error means the peer went away rather than a local fault.
pub fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
    )
}

/// Read one newline-terminated message of at most `max_len` bytes.
///
/// Longer lines are consumed up to their newline and reported as
/// [`ReadOutcome::Oversized`]. A final line without newline is still a
/// message. Invalid UTF-8 is replaced, so it fails later at JSON decoding.
pub fn read_line_limited<R: BufRead>(reader: &mut R, max_len: usize) -> io::Result<ReadOutcome> {
    let mut buf = Vec::new();
    let limit = max_len as u64 + 1;
    let read = io::Read::take(reader.by_ref(), limit).read_until(b'\n', &mut buf)?;

    if read == 0 {
        return Ok(ReadOutcome::Closed);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
    } else if buf.len() > max_len {
        let discarded = buf.len() + discard_line(reader)?;
        return Ok(ReadOutcome::Oversized(discarded));
    }

    Ok(ReadOutcome::Message(String::from_utf8_lossy(&buf).into_owned()))
}

/// Skip the rest of the current line, returning the number of bytes skipped.
fn discard_line<R: BufRead>(reader: &mut R) -> io::Result<usize> {
    let mut skipped = 0;
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Ok(skipped);
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(skipped + pos);
            }
            None => {
                let len = available.len();
                reader.consume(len);
                skipped += len;
            }
        }
    }
}

#[cfg(unix)]
pub use unix::UnixSocketSource;

#[cfg(unix)]
mod unix {
    use std::io::{self, BufReader};
    use std::os::unix::net::{UnixListener, UnixStream};
    use std::path::{Path, PathBuf};

    use super::{MessageSource, ReadOutcome, read_line_limited};
    use crate::config::IpcConfig;
    use crate::error::{BridgeError, Result};

    /// Unix domain socket endpoint accepting exactly one engine connection.
    ///
    /// The socket file is removed when the source is dropped.
    #[derive(Debug)]
    pub struct UnixSocketSource {
        path: PathBuf,
        listener: UnixListener,
        reader: Option<BufReader<UnixStream>>,
        max_message_size: usize,
    }

    impl UnixSocketSource {
        /// Bind the socket described by `config`.
        pub fn bind(config: &IpcConfig) -> Result<Self> {
            let path = config.path.clone();

            if config.remove_existing_socket && path.exists() {
                std::fs::remove_file(&path).map_err(|e| {
                    BridgeError::ipc(format!(
                        "Failed to remove existing socket at {}: {}",
                        path.display(),
                        e
                    ))
                })?;
            }

            let listener = UnixListener::bind(&path).map_err(|e| {
                BridgeError::ipc(format!(
                    "Failed to bind Unix socket to {}: {}",
                    path.display(),
                    e
                ))
            })?;

            Ok(Self {
                path,
                listener,
                reader: None,
                max_message_size: config.max_message_size,
            })
        }

        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl MessageSource for UnixSocketSource {
        fn accept(&mut self) -> io::Result<()> {
            let (stream, _addr) = self.listener.accept()?;
            self.reader = Some(BufReader::with_capacity(self.max_message_size, stream));
            Ok(())
        }

        fn read_message(&mut self) -> io::Result<ReadOutcome> {
            let Some(reader) = self.reader.as_mut() else {
                return Err(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "no engine connected",
                ));
            };
            read_line_limited(reader, self.max_message_size)
        }

        fn describe(&self) -> String {
            format!("unix:{}", self.path.display())
        }
    }

    impl Drop for UnixSocketSource {
        fn drop(&mut self) {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::debug!(
                    path = %self.path.display(),
                    error = %e,
                    "Could not remove socket file"
                );
            }
        }
    }
}

/// In-process source fed through a standard channel.
///
/// Dropping every sender is treated as the peer disconnecting.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<String>,
}

impl ChannelSource {
    /// Create a source and the sender the engine writes messages into.
    pub fn pair() -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self { rx })
    }
}

impl MessageSource for ChannelSource {
    fn accept(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn read_message(&mut self) -> io::Result<ReadOutcome> {
        match self.rx.recv() {
            Ok(message) => Ok(ReadOutcome::Message(message)),
            Err(mpsc::RecvError) => Ok(ReadOutcome::Closed),
        }
    }

    fn describe(&self) -> String {
        "in-process channel".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_all(input: &[u8], max_len: usize) -> Vec<ReadOutcome> {
        let mut reader = Cursor::new(input.to_vec());
        let mut outcomes = Vec::new();
        loop {
            let outcome = read_line_limited(&mut reader, max_len).unwrap();
            let done = outcome == ReadOutcome::Closed;
            outcomes.push(outcome);
            if done {
                return outcomes;
            }
        }
    }

    #[test]
    fn test_reads_lines() {
        let outcomes = read_all(b"first\nsecond\n", 64);
        assert_eq!(
            outcomes,
            vec![
                ReadOutcome::Message("first".to_string()),
                ReadOutcome::Message("second".to_string()),
                ReadOutcome::Closed,
            ]
        );
    }

    #[test]
    fn test_last_line_without_newline() {
        let outcomes = read_all(b"one\nexit", 64);
        assert_eq!(outcomes[1], ReadOutcome::Message("exit".to_string()));
        assert_eq!(outcomes[2], ReadOutcome::Closed);
    }

    #[test]
    fn test_exact_limit_is_accepted() {
        let outcomes = read_all(b"12345678\nok\n", 8);
        assert_eq!(outcomes[0], ReadOutcome::Message("12345678".to_string()));
        assert_eq!(outcomes[1], ReadOutcome::Message("ok".to_string()));
    }

    #[test]
    fn test_oversized_line_is_skipped() {
        let mut input = vec![b'x'; 100];
        input.extend_from_slice(b"\nnext\n");

        let outcomes = read_all(&input, 16);
        assert_eq!(outcomes[0], ReadOutcome::Oversized(100));
        assert_eq!(outcomes[1], ReadOutcome::Message("next".to_string()));
        assert_eq!(outcomes[2], ReadOutcome::Closed);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let outcomes = read_all(b"\xff\xfe{}\n", 64);
        let ReadOutcome::Message(text) = &outcomes[0] else {
            panic!("expected a message, got {:?}", outcomes[0]);
        };
        assert!(text.ends_with("{}"));
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn test_is_disconnect() {
        assert!(is_disconnect(&io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(is_disconnect(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(!is_disconnect(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[test]
    fn test_channel_source() {
        let (tx, mut source) = ChannelSource::pair();
        source.accept().unwrap();

        tx.send("hello".to_string()).unwrap();
        drop(tx);

        assert_eq!(
            source.read_message().unwrap(),
            ReadOutcome::Message("hello".to_string())
        );
        assert_eq!(source.read_message().unwrap(), ReadOutcome::Closed);
    }

    #[cfg(unix)]
    #[test]
    fn test_unix_socket_source() {
        use crate::config::IpcConfig;
        use std::io::Write;
        use std::os::unix::net::UnixStream;

        let dir = tempfile::tempdir().unwrap();
        let config = IpcConfig {
            path: dir.path().join("engine.sock"),
            ..IpcConfig::default()
        };

        let mut source = UnixSocketSource::bind(&config).unwrap();
        assert!(config.path.exists());
        assert_eq!(
            source.read_message().unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );

        let path = config.path.clone();
        let writer = std::thread::spawn(move || {
            let mut stream = UnixStream::connect(path).unwrap();
            stream.write_all(b"{\"angles\":[]}\nexit\n").unwrap();
        });

        source.accept().unwrap();
        assert_eq!(
            source.read_message().unwrap(),
            ReadOutcome::Message("{\"angles\":[]}".to_string())
        );
        assert_eq!(
            source.read_message().unwrap(),
            ReadOutcome::Message("exit".to_string())
        );
        writer.join().unwrap();
        assert_eq!(source.read_message().unwrap(), ReadOutcome::Closed);

        drop(source);
        assert!(!config.path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_unix_socket_replaces_stale_file() {
        use crate::config::IpcConfig;

        let dir = tempfile::tempdir().unwrap();
        let config = IpcConfig {
            path: dir.path().join("stale.sock"),
            ..IpcConfig::default()
        };
        std::fs::write(&config.path, b"").unwrap();

        let source = UnixSocketSource::bind(&config).unwrap();
        assert_eq!(source.path(), config.path.as_path());
        assert!(source.describe().starts_with("unix:"));
    }
}
