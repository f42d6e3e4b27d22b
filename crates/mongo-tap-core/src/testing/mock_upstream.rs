//! Mock MongoDB upstream for integration testing.
//!
//! A lightweight stand-in for `mongod` that:
//! - Accepts TCP connections
//! - Records every byte received, per connection
//! - Optionally plays a canned reply to each connection

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};

/// Per-connection byte log.
type ConnectionLog = Arc<Mutex<Vec<u8>>>;

/// Mock upstream server for testing.
pub struct MockUpstream {
    address: String,
    connections: Arc<Mutex<Vec<ConnectionLog>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl MockUpstream {
    /// Start a mock upstream that only records what it receives.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails.
    pub async fn start() -> std::io::Result<Self> {
        Self::with_reply(Vec::new()).await
    }

    /// Start a mock upstream that writes `reply` to every connection as
    /// soon as it is accepted, then keeps recording received bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails.
    pub async fn with_reply(reply: Vec<u8>) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?.to_string();

        let connections: Arc<Mutex<Vec<ConnectionLog>>> = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let accept_connections = Arc::clone(&connections);
        let accept_shutdown = shutdown_tx.clone();
        let reply = Arc::new(reply);

        tokio::spawn(async move {
            let mut shutdown_rx = accept_shutdown.subscribe();
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    result = listener.accept() => {
                        let Ok((stream, _addr)) = result else { break };
                        let log: ConnectionLog = Arc::new(Mutex::new(Vec::new()));
                        accept_connections.lock().await.push(Arc::clone(&log));
                        let reply = Arc::clone(&reply);
                        let shutdown_rx = accept_shutdown.subscribe();
                        tokio::spawn(async move {
                            Self::handle_connection(stream, log, reply, shutdown_rx).await;
                        });
                    }
                }
            }
        });

        Ok(Self {
            address,
            connections,
            shutdown_tx,
        })
    }

    async fn handle_connection(
        mut stream: tokio::net::TcpStream,
        log: ConnectionLog,
        reply: Arc<Vec<u8>>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        if !reply.is_empty() {
            let _ = stream.write_all(&reply).await;
        }

        let mut buf = [0u8; 4096];
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                result = stream.read(&mut buf) => {
                    match result {
                        Ok(0) | Err(_) => break,
                        Ok(n) => log.lock().await.extend_from_slice(&buf[..n]),
                    }
                }
            }
        }
    }

    /// Address the mock is listening on.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Number of connections accepted so far.
    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Bytes received on the `index`-th accepted connection.
    pub async fn received(&self, index: usize) -> Vec<u8> {
        let connections = self.connections.lock().await;
        match connections.get(index) {
            Some(log) => log.lock().await.clone(),
            None => Vec::new(),
        }
    }

    /// Poll until the `index`-th connection has received at least `len`
    /// bytes, or the timeout elapses. Returns whatever has arrived.
    pub async fn wait_for_bytes(
        &self,
        index: usize,
        len: usize,
        timeout: std::time::Duration,
    ) -> Vec<u8> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let received = self.received(index).await;
            if received.len() >= len || tokio::time::Instant::now() >= deadline {
                return received;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    /// Stop the mock upstream.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn test_records_received_bytes() {
        let mock = MockUpstream::start().await.unwrap();
        let mut client = TcpStream::connect(mock.address()).await.unwrap();

        client.write_all(b"some wire bytes").await.unwrap();
        let received = mock
            .wait_for_bytes(0, 15, Duration::from_secs(1))
            .await;
        assert_eq!(received, b"some wire bytes");

        mock.shutdown();
    }

    #[tokio::test]
    async fn test_plays_canned_reply() {
        let mock = MockUpstream::with_reply(b"canned".to_vec()).await.unwrap();
        let mut client = TcpStream::connect(mock.address()).await.unwrap();

        let mut reply = [0u8; 6];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"canned");

        mock.shutdown();
    }

    #[tokio::test]
    async fn test_tracks_connections_separately() {
        let mock = MockUpstream::start().await.unwrap();
        let mut first = TcpStream::connect(mock.address()).await.unwrap();
        let mut second = TcpStream::connect(mock.address()).await.unwrap();

        first.write_all(b"first").await.unwrap();
        second.write_all(b"second").await.unwrap();

        let first_bytes = mock.wait_for_bytes(0, 5, Duration::from_secs(1)).await;
        let second_bytes = mock.wait_for_bytes(1, 6, Duration::from_secs(1)).await;
        assert_eq!(first_bytes, b"first");
        assert_eq!(second_bytes, b"second");

        mock.shutdown();
    }
}
