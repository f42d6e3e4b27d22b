//! Per-connection duplex pipe.
//!
//! Owns one client socket and one upstream socket, forwards bytes in both
//! directions unmodified, and tees each direction into its own parser.
//! Forwarding is the primary path; parsing is a side-observer that can
//! never stall, fail, or reorder it.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::ProxyConfig;
use crate::error::{is_peer_close, ProxyError, Result};
use crate::sniff::event::{EventSink, JsonMap};
use crate::sniff::parser::{Direction, ParserHandle, WireParser};

/// Fixed forwarding buffer, matched to a typical socket read.
const COPY_BUF_LEN: usize = 4096;

/// Orchestrates forwarding and sniffing for one accepted connection.
pub struct DuplexPipe {
    config: Arc<ProxyConfig>,
    sink: Arc<dyn EventSink>,
}

impl DuplexPipe {
    /// Create a pipe for one accepted client socket.
    #[must_use]
    pub fn new(config: Arc<ProxyConfig>, sink: Arc<dyn EventSink>) -> Self {
        Self { config, sink }
    }

    /// Dial the upstream and run both directions to completion.
    ///
    /// Returns when either side terminates; by then both sockets are
    /// closed and both parsers have been signalled EOF.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream cannot be dialed. Forwarding I/O
    /// failures tear the connection down but are not errors of the pipe
    /// itself.
    pub async fn run(self, client: TcpStream) -> Result<()> {
        let peer = client
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let address = self.config.upstream.dial_address();

        let upstream = match timeout(
            self.config.upstream.connect_timeout(),
            TcpStream::connect(&address),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                self.emit_connection_error(&peer, &format!("upstream dial failed: {err}"));
                return Err(ProxyError::UpstreamUnavailable {
                    address,
                    message: err.to_string(),
                });
            }
            Err(_) => {
                self.emit_connection_error(&peer, "upstream dial failed: connect timeout");
                return Err(ProxyError::UpstreamUnavailable {
                    address,
                    message: "connect timeout".to_string(),
                });
            }
        };

        debug!(
            peer = %peer,
            upstream = %address,
            "proxying connection"
        );

        let c2s_parser = WireParser::spawn(
            Direction::ClientToServer,
            &self.config.sniffer,
            Arc::clone(&self.sink),
        );
        let s2c_parser = WireParser::spawn(
            Direction::ServerToClient,
            &self.config.sniffer,
            Arc::clone(&self.sink),
        );

        let (client_read, client_write) = client.into_split();
        let (upstream_read, upstream_write) = upstream.into_split();

        // Whichever direction finishes first wins the select; the other
        // future is dropped, which closes its socket halves and its parser
        // handle, unwinding the whole assembly.
        let finished = tokio::select! {
            result = forward(client_read, upstream_write, c2s_parser) => {
                (Direction::ClientToServer, result)
            }
            result = forward(upstream_read, client_write, s2c_parser) => {
                (Direction::ServerToClient, result)
            }
        };

        if let (direction, Err(err)) = finished {
            warn!(peer = %peer, direction = %direction, error = %err, "forwarding error");
            self.emit_connection_error(&peer, &format!("forwarding error ({direction}): {err}"));
        }

        debug!(peer = %peer, "connection closed");
        Ok(())
    }

    fn emit_connection_error(&self, peer: &str, message: &str) {
        let mut fields = JsonMap::new();
        fields.insert("peer".to_string(), Value::from(peer));
        fields.insert("error".to_string(), Value::from(message));
        self.sink.record(0, message, &fields);
    }
}

/// Copy one direction until EOF or error, teeing every chunk into the
/// observer before it is written out.
///
/// Returns `Ok(())` on EOF or peer close. The observer is infallible by
/// contract; it may drop bytes, never the forwarder's.
async fn forward(
    mut reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    observer: ParserHandle,
) -> std::io::Result<()> {
    let mut buf = [0u8; COPY_BUF_LEN];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if is_peer_close(&err) => break,
            Err(err) => {
                let _ = writer.shutdown().await;
                return Err(err);
            }
        };

        observer.feed(&buf[..n]);

        match writer.write_all(&buf[..n]).await {
            Ok(()) => {}
            Err(err) if is_peer_close(&err) => break,
            Err(err) => return Err(err),
        }
    }

    // Propagate the close so the opposite endpoint sees EOF too.
    let _ = writer.shutdown().await;
    Ok(())
}
