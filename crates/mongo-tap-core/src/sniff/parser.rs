//! Per-direction stream parser.
//!
//! Each direction of a proxied connection gets one parser task. The
//! forwarder feeds raw chunks through a bounded, lossy queue; the parser
//! reassembles frames, decodes them, and emits events to the sink. The
//! forwarding path never waits for the parser: a full queue drops the
//! chunk and counts the loss instead.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use crate::config::SnifferConfig;
use crate::error::DecodeError;
use crate::wire::{decode_frame, MongoCodec, RawFrame};

use super::event::{build_event, EventSink, JsonMap};

/// One half of a proxied connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Bytes flowing from the client to the MongoDB server.
    ClientToServer,
    /// Bytes flowing from the MongoDB server back to the client.
    ServerToClient,
}

impl Direction {
    /// Short label used in events and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientToServer => "client->server",
            Self::ServerToClient => "server->client",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ingestion handle held by the forwarder.
///
/// Dropping the handle (or calling [`ParserHandle::close`]) is the EOF
/// signal: the parser drains whatever is queued and exits.
pub struct ParserHandle {
    tx: Option<mpsc::Sender<Bytes>>,
    dropped: Arc<AtomicU64>,
}

impl ParserHandle {
    /// Feed observed bytes to the parser.
    ///
    /// Never blocks and never fails: a full queue drops the chunk and
    /// bumps the drop counter; a parser that already exited swallows the
    /// bytes silently.
    pub fn feed(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(Bytes::copy_from_slice(data)) {
            Ok(()) => {}
            Err(TrySendError::Full(chunk)) => {
                self.dropped.fetch_add(chunk.len() as u64, Ordering::Relaxed);
                trace!(dropped = chunk.len(), "parser queue full, dropping chunk");
            }
            Err(TrySendError::Closed(_)) => {
                // Parser terminated on its own; observation is over for
                // this direction but forwarding is not our problem.
            }
        }
    }

    /// Signal EOF to the parser.
    pub fn close(&mut self) {
        self.tx = None;
    }

    /// Bytes dropped so far due to a full queue.
    #[must_use]
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Spawner for per-direction parser tasks.
pub struct WireParser;

impl WireParser {
    /// Spawn a parser task for one direction and return its ingestion
    /// handle.
    pub fn spawn(
        direction: Direction,
        config: &SnifferConfig,
        sink: Arc<dyn EventSink>,
    ) -> ParserHandle {
        let (tx, rx) = mpsc::channel(config.queue_chunks);
        let dropped = Arc::new(AtomicU64::new(0));
        let task = ParserTask {
            direction,
            rx,
            codec: MongoCodec::with_max_frame_size(config.max_frame_size),
            sink,
            dropped: Arc::clone(&dropped),
        };
        tokio::spawn(task.run());
        ParserHandle {
            tx: Some(tx),
            dropped,
        }
    }
}

struct ParserTask {
    direction: Direction,
    rx: mpsc::Receiver<Bytes>,
    codec: MongoCodec,
    sink: Arc<dyn EventSink>,
    dropped: Arc<AtomicU64>,
}

impl ParserTask {
    async fn run(mut self) {
        let mut buf = BytesMut::new();

        while let Some(chunk) = self.rx.recv().await {
            buf.extend_from_slice(&chunk);
            loop {
                match self.codec.decode(&mut buf) {
                    Ok(Some(frame)) => self.emit_frame(&frame),
                    Ok(None) => break,
                    Err(err) => {
                        // Framing is lost; the next header boundary can't
                        // be located, so this direction goes dark.
                        self.emit_error(None, &err);
                        debug!(direction = %self.direction, error = %err, "parser terminated");
                        return;
                    }
                }
            }
        }

        if !buf.is_empty() {
            self.emit_error(
                None,
                &DecodeError::ShortFrame {
                    remaining: buf.len(),
                },
            );
        }
        debug!(direction = %self.direction, "parser finished");
    }

    fn emit_frame(&self, frame: &RawFrame) {
        match decode_frame(frame) {
            Ok(msg) => {
                let (summary, mut fields) = build_event(&frame.header, &msg);
                self.finish_fields(&mut fields);
                self.sink.record(frame.header.op_code, &summary, &fields);
            }
            Err(err) => self.emit_error(Some(frame.header.request_id), &err),
        }
    }

    fn emit_error(&self, request_id: Option<i32>, err: &DecodeError) {
        let mut fields = JsonMap::new();
        fields.insert("error".to_string(), Value::from(err.to_string()));
        if let Some(request_id) = request_id {
            fields.insert("request_id".to_string(), Value::from(request_id));
        }
        self.finish_fields(&mut fields);
        self.sink
            .record(0, &format!("decode error: {err}"), &fields);
    }

    fn finish_fields(&self, fields: &mut JsonMap) {
        fields.insert(
            "direction".to_string(),
            Value::from(self.direction.as_str()),
        );
        let dropped = self.dropped.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            fields.insert("dropped_bytes".to_string(), Value::from(dropped));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::frames;
    use crate::testing::RecordingSink;
    use bson::doc;
    use std::time::Duration;

    fn sniffer_config() -> SnifferConfig {
        SnifferConfig::default()
    }

    fn spawn_with_sink() -> (ParserHandle, RecordingSink) {
        let sink = RecordingSink::default();
        let handle = WireParser::spawn(
            Direction::ClientToServer,
            &sniffer_config(),
            Arc::new(sink.clone()),
        );
        (handle, sink)
    }

    #[tokio::test]
    async fn test_single_frame_produces_one_event() {
        let (mut handle, sink) = spawn_with_sink();
        let frame = frames::query_frame(7, "db.coll", 0, 1, &doc! {"a": 1}, None);

        handle.feed(&frame);
        handle.close();

        let events = sink.wait_for(1, Duration::from_secs(1)).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].op_code, 2004);
        assert_eq!(events[0].fields["direction"], "client->server");
        assert_eq!(events[0].fields["query"]["a"], 1);
    }

    #[tokio::test]
    async fn test_chunked_delivery_decodes_identically() {
        let frame = frames::query_frame(7, "db.coll", 0, 1, &doc! {"a": 1}, None);

        // A few representative partitions; the full sweep lives in the
        // integration tests.
        for split in [1, 4, 15, 16, 17, frame.len() - 1] {
            let (mut handle, sink) = spawn_with_sink();
            handle.feed(&frame[..split]);
            handle.feed(&frame[split..]);
            handle.close();

            let events = sink.wait_for(1, Duration::from_secs(1)).await;
            assert_eq!(events.len(), 1, "split at {split}");
            assert_eq!(events[0].op_code, 2004, "split at {split}");
        }
    }

    #[tokio::test]
    async fn test_unknown_opcode_resyncs() {
        let (mut handle, sink) = spawn_with_sink();

        let mut stream = frames::query_frame(1, "db.coll", 0, 1, &doc! {"a": 1}, None);
        stream.extend_from_slice(&frames::raw_frame(9999, 2, 0, &[0xAB; 8]));
        stream.extend_from_slice(&frames::insert_frame(3, "db.coll", &[doc! {"b": 2}]));

        handle.feed(&stream);
        handle.close();

        let events = sink.wait_for(3, Duration::from_secs(1)).await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].op_code, 2004);
        assert_eq!(events[1].op_code, 0);
        assert!(events[1].summary.contains("unknown op code 9999"));
        assert_eq!(events[2].op_code, 2002);
    }

    #[tokio::test]
    async fn test_frame_local_error_resyncs() {
        let (mut handle, sink) = spawn_with_sink();

        // OP_MSG with an unknown section kind, then a healthy QUERY.
        let mut stream = frames::raw_frame(2013, 5, 0, &{
            let mut body = vec![0u8; 4]; // flags = 0
            body.push(9); // bogus section kind
            body.extend_from_slice(&[0u8; 4]);
            body
        });
        stream.extend_from_slice(&frames::query_frame(6, "db.coll", 0, 1, &doc! {"a": 1}, None));

        handle.feed(&stream);
        handle.close();

        let events = sink.wait_for(2, Duration::from_secs(1)).await;
        assert_eq!(events[0].op_code, 0);
        assert!(events[0].summary.contains("unknown section kind"));
        assert_eq!(events[0].fields["request_id"], 5);
        assert_eq!(events[1].op_code, 2004);
    }

    #[tokio::test]
    async fn test_bad_header_terminates_direction() {
        let (mut handle, sink) = spawn_with_sink();

        let mut stream = Vec::new();
        stream.extend_from_slice(&8i32.to_le_bytes()); // message_length < 16
        stream.extend_from_slice(&[0u8; 12]);
        // Anything after the poisoned header must not decode.
        stream.extend_from_slice(&frames::query_frame(9, "db.coll", 0, 1, &doc! {"a": 1}, None));

        handle.feed(&stream);
        handle.close();

        let events = sink.wait_for(1, Duration::from_secs(1)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let events_after = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events_after.len(), 1);
        assert_eq!(events_after[0].op_code, 0);
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_short_frame_error() {
        let (mut handle, sink) = spawn_with_sink();
        let frame = frames::query_frame(7, "db.coll", 0, 1, &doc! {"a": 1}, None);

        handle.feed(&frame[..10]);
        handle.close();

        let events = sink.wait_for(1, Duration::from_secs(1)).await;
        assert_eq!(events[0].op_code, 0);
        assert!(events[0].summary.contains("short frame"));
    }

    #[tokio::test]
    async fn test_clean_eof_emits_nothing() {
        let (mut handle, sink) = spawn_with_sink();
        let frame = frames::query_frame(7, "db.coll", 0, 1, &doc! {"a": 1}, None);

        handle.feed(&frame);
        handle.close();

        let events = sink.wait_for(1, Duration::from_secs(1)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.events().len(), events.len());
        assert!(sink.events().iter().all(|e| e.op_code != 0));
    }

    #[tokio::test]
    async fn test_drop_counter_surfaces_on_next_event() {
        let (mut handle, sink) = spawn_with_sink();
        handle.dropped.store(4096, Ordering::Relaxed);

        let frame = frames::query_frame(7, "db.coll", 0, 1, &doc! {"a": 1}, None);
        handle.feed(&frame);
        handle.close();

        let events = sink.wait_for(1, Duration::from_secs(1)).await;
        assert_eq!(events[0].fields["dropped_bytes"], 4096);
    }

    #[tokio::test]
    async fn test_feed_after_close_is_silent() {
        let (mut handle, sink) = spawn_with_sink();
        handle.close();
        handle.feed(b"anything");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sink.events().is_empty());
    }
}
