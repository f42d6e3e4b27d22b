//! TCP listener for accepting client connections.
//!
//! The listener accepts connections and spawns an independent duplex pipe
//! for each one. Pipes share nothing but the event sink; an error in one
//! connection never reaches another.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ProxyConfig;
use crate::error::Result;
use crate::sniff::event::EventSink;

use super::pipe::DuplexPipe;

/// TCP listener that accepts client connections.
pub struct ProxyListener {
    config: Arc<ProxyConfig>,
    sink: Arc<dyn EventSink>,
    shutdown_tx: broadcast::Sender<()>,
    active_connections: Arc<AtomicUsize>,
}

impl ProxyListener {
    /// Create a new proxy listener.
    #[must_use]
    pub fn new(config: ProxyConfig, sink: Arc<dyn EventSink>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config: Arc::new(config),
            sink,
            shutdown_tx,
            active_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get a shutdown handle to signal the listener to stop.
    #[must_use]
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Get the current number of active connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Bind the configured listen address and accept until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the listen address fails; bind
    /// failure is fatal.
    #[instrument(skip(self), fields(address = %self.config.listen.bind_address()))]
    pub async fn run(&self) -> Result<()> {
        let address = self.config.listen.bind_address();
        let listener = TcpListener::bind(&address).await?;
        info!(
            address = %address,
            upstream = %self.config.upstream.dial_address(),
            "proxy listening"
        );
        self.serve(listener).await
    }

    /// Accept connections on an already-bound listener until shutdown.
    ///
    /// Split out of [`run`](Self::run) so tests can bind port 0 and learn
    /// the address first.
    ///
    /// # Errors
    ///
    /// Never fails once the listener is bound; transient accept errors are
    /// logged and the loop continues.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        // Connection counter for correlating log lines.
        let mut connection_counter: u64 = 0;

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((socket, addr)) => {
                            let current = self.active_connections.load(Ordering::Relaxed);

                            if current >= self.config.listen.max_connections {
                                warn!(
                                    peer = %addr,
                                    active = current,
                                    max = self.config.listen.max_connections,
                                    "connection rejected: limit reached"
                                );
                                // Socket drops here, closing the connection.
                                continue;
                            }

                            self.active_connections.fetch_add(1, Ordering::Relaxed);
                            connection_counter += 1;
                            debug!(
                                peer = %addr,
                                connection = connection_counter,
                                active = current + 1,
                                "accepted connection"
                            );

                            let pipe = DuplexPipe::new(
                                Arc::clone(&self.config),
                                Arc::clone(&self.sink),
                            );
                            let active_connections = Arc::clone(&self.active_connections);

                            tokio::spawn(async move {
                                if let Err(err) = pipe.run(socket).await {
                                    // Already surfaced as an error event;
                                    // keep the log at debug.
                                    debug!(peer = %addr, error = %err, "connection ended with error");
                                }
                                active_connections.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(err) => {
                            error!(error = %err, "accept error");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    fn test_listener() -> (Arc<ProxyListener>, RecordingSink) {
        let mut config = ProxyConfig::default();
        // Nothing listens on port 1; dial failures are fine for these tests.
        config.upstream.address = "127.0.0.1:1".to_string();
        config.upstream.connect_timeout_ms = 200;
        let sink = RecordingSink::default();
        let listener = Arc::new(ProxyListener::new(config, Arc::new(sink.clone())));
        (listener, sink)
    }

    #[tokio::test]
    async fn test_listener_accepts_connection() {
        let (listener, _sink) = test_listener();
        let shutdown_handle = listener.shutdown_handle();

        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = tcp.local_addr().unwrap();
        let serve_task = {
            let listener = Arc::clone(&listener);
            tokio::spawn(async move { listener.serve(tcp).await })
        };

        let mut client = TcpStream::connect(addr).await.unwrap();
        let _ = client.write_all(&[0, 0, 0, 0]).await;

        let _ = shutdown_handle.send(());
        let result = timeout(Duration::from_secs(1), serve_task).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_listener_shutdown() {
        let (listener, _sink) = test_listener();
        let shutdown_handle = listener.shutdown_handle();

        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let serve_task = {
            let listener = Arc::clone(&listener);
            tokio::spawn(async move { listener.serve(tcp).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = shutdown_handle.send(());

        let result = timeout(Duration::from_secs(1), serve_task).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_bind_failure_is_fatal() {
        let mut config = ProxyConfig::default();
        // Port already held by another socket.
        let blocker = TcpListener::bind("127.0.0.1:0").await.unwrap();
        config.listen.address = blocker.local_addr().unwrap().to_string();

        let listener = ProxyListener::new(config, Arc::new(RecordingSink::default()));
        let result = listener.run().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_listener_survives_failed_upstream_dials() {
        let (listener, sink) = test_listener();
        let shutdown_handle = listener.shutdown_handle();

        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = tcp.local_addr().unwrap();
        let serve_task = {
            let listener = Arc::clone(&listener);
            tokio::spawn(async move { listener.serve(tcp).await })
        };

        // Each attempt gets its socket closed and an error event; the
        // listener keeps accepting.
        for _ in 0..3 {
            let _ = TcpStream::connect(addr).await.unwrap();
        }
        let events = sink.wait_for(3, Duration::from_secs(2)).await;
        assert!(events.iter().all(|e| e.op_code == 0));

        let _ = shutdown_handle.send(());
        let _ = timeout(Duration::from_secs(1), serve_task).await;
    }
}
