//! Pluggable message transports for the RPC surface
//!
//! Messages are newline-delimited JSON. The TCP transport serves external
//! controllers; the channel transport pairs a client and server in-process
//! for tests.

use crate::error::{Error, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

/// A bidirectional line-oriented message transport
pub trait Transport: Send {
    /// Send one message
    fn send(&mut self, message: &str) -> Result<()>;
    /// Receive the next message. `Ok(None)` means the peer closed the
    /// connection. Reads time out periodically so callers can check their
    /// shutdown flag; a timeout surfaces as an error matched by
    /// [`is_timeout`] and should be retried.
    fn receive(&mut self) -> Result<Option<String>>;
}

/// TCP transport carrying newline-delimited JSON
pub struct TcpTransport {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl TcpTransport {
    /// Connect to a listening simulator
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port))
            .map_err(|e| Error::rpc(format!("cannot connect to {}:{}: {}", host, port, e)))?;
        Self::from_stream(stream)
    }

    /// Wrap an accepted connection
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        stream
            .set_read_timeout(Some(Duration::from_millis(100)))
            .map_err(|e| Error::rpc(format!("cannot configure socket: {}", e)))?;
        let writer = stream
            .try_clone()
            .map_err(|e| Error::rpc(format!("cannot clone socket: {}", e)))?;
        Ok(TcpTransport {
            reader: BufReader::new(stream),
            writer,
        })
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, message: &str) -> Result<()> {
        self.writer
            .write_all(message.as_bytes())
            .and_then(|_| self.writer.write_all(b"\n"))
            .map_err(|e| Error::rpc(format!("send failed: {}", e)))
    }

    fn receive(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    return Ok(Some(trimmed.to_string()));
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    return Err(Error::rpc("read timed out"));
                }
                Err(e) => return Err(Error::rpc(format!("receive failed: {}", e))),
            }
        }
    }
}

/// In-process transport built on channels; `pair()` returns the two ends
pub struct ChannelTransport {
    sender: Sender<String>,
    receiver: Receiver<String>,
}

impl ChannelTransport {
    /// Create a connected pair (client end, server end)
    pub fn pair() -> (ChannelTransport, ChannelTransport) {
        let (client_tx, server_rx) = unbounded();
        let (server_tx, client_rx) = unbounded();
        (
            ChannelTransport {
                sender: client_tx,
                receiver: client_rx,
            },
            ChannelTransport {
                sender: server_tx,
                receiver: server_rx,
            },
        )
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, message: &str) -> Result<()> {
        self.sender
            .send(message.to_string())
            .map_err(|_| Error::rpc("peer closed"))
    }

    fn receive(&mut self) -> Result<Option<String>> {
        match self.receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(message) => Ok(Some(message)),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Err(Error::rpc("read timed out")),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Ok(None),
        }
    }
}

/// True when the receive error is a timeout the caller should retry
pub fn is_timeout(error: &Error) -> bool {
    matches!(error, Error::Rpc { message } if message == "read timed out")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_pair_round_trips() {
        let (mut client, mut server) = ChannelTransport::pair();
        client.send(r#"{"method":"updateFrame"}"#).unwrap();
        let message = server.receive().unwrap().unwrap();
        assert!(message.contains("updateFrame"));
        server.send(r#"{"result":{}}"#).unwrap();
        assert!(client.receive().unwrap().unwrap().contains("result"));
    }

    #[test]
    fn closed_channel_reports_none() {
        let (client, mut server) = ChannelTransport::pair();
        drop(client);
        assert!(server.receive().unwrap().is_none());
    }

    #[test]
    fn timeout_is_retryable() {
        let (_client, mut server) = ChannelTransport::pair();
        let err = server.receive().unwrap_err();
        assert!(is_timeout(&err));
    }
}
