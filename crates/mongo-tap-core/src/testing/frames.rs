//! Wire-frame builders for tests.
//!
//! Each builder encodes one opcode variant into the exact bytes a driver
//! or server would put on the wire, so tests can drive the codec, the
//! parser, and the full proxy with realistic traffic.

use bson::Document;
use bytes::{BufMut, BytesMut};

use crate::wire::message::FLAG_CHECKSUM_PRESENT;
use crate::wire::opcode;

/// Encode a BSON document to its wire bytes.
#[must_use]
pub fn doc_bytes(doc: &Document) -> Vec<u8> {
    let mut bytes = Vec::new();
    doc.to_writer(&mut bytes).expect("document serializes");
    bytes
}

/// Wrap a body in a 16-byte header with the given opcode.
#[must_use]
pub fn raw_frame(op_code: i32, request_id: i32, response_to: i32, body: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(16 + body.len());
    buf.put_i32_le(16 + body.len() as i32);
    buf.put_i32_le(request_id);
    buf.put_i32_le(response_to);
    buf.put_i32_le(op_code);
    buf.extend_from_slice(body);
    buf.to_vec()
}

/// OP_QUERY frame.
#[must_use]
pub fn query_frame(
    request_id: i32,
    collection: &str,
    number_to_skip: i32,
    number_to_return: i32,
    query: &Document,
    return_field_selector: Option<&Document>,
) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_i32_le(0); // flags
    body.extend_from_slice(collection.as_bytes());
    body.put_u8(0);
    body.put_i32_le(number_to_skip);
    body.put_i32_le(number_to_return);
    body.extend_from_slice(&doc_bytes(query));
    if let Some(selector) = return_field_selector {
        body.extend_from_slice(&doc_bytes(selector));
    }
    raw_frame(opcode::OP_QUERY, request_id, 0, &body)
}

/// OP_INSERT frame.
#[must_use]
pub fn insert_frame(request_id: i32, collection: &str, documents: &[Document]) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_i32_le(0); // flags
    body.extend_from_slice(collection.as_bytes());
    body.put_u8(0);
    for doc in documents {
        body.extend_from_slice(&doc_bytes(doc));
    }
    raw_frame(opcode::OP_INSERT, request_id, 0, &body)
}

/// OP_UPDATE frame.
#[must_use]
pub fn update_frame(
    request_id: i32,
    collection: &str,
    flags: i32,
    selector: &Document,
    update: &Document,
) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_i32_le(0); // reserved
    body.extend_from_slice(collection.as_bytes());
    body.put_u8(0);
    body.put_i32_le(flags);
    body.extend_from_slice(&doc_bytes(selector));
    body.extend_from_slice(&doc_bytes(update));
    raw_frame(opcode::OP_UPDATE, request_id, 0, &body)
}

/// OP_DELETE frame.
#[must_use]
pub fn delete_frame(
    request_id: i32,
    collection: &str,
    flags: i32,
    selector: &Document,
) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_i32_le(0); // reserved
    body.extend_from_slice(collection.as_bytes());
    body.put_u8(0);
    body.put_i32_le(flags);
    body.extend_from_slice(&doc_bytes(selector));
    raw_frame(opcode::OP_DELETE, request_id, 0, &body)
}

/// OP_GET_MORE frame.
#[must_use]
pub fn get_more_frame(
    request_id: i32,
    collection: &str,
    number_to_return: i32,
    cursor_id: i64,
) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_i32_le(0); // reserved
    body.extend_from_slice(collection.as_bytes());
    body.put_u8(0);
    body.put_i32_le(number_to_return);
    body.put_i64_le(cursor_id);
    raw_frame(opcode::OP_GET_MORE, request_id, 0, &body)
}

/// OP_KILL_CURSORS frame.
#[must_use]
pub fn kill_cursors_frame(request_id: i32, cursor_ids: &[i64]) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_i32_le(0); // reserved
    body.put_i32_le(cursor_ids.len() as i32);
    for &id in cursor_ids {
        body.put_i64_le(id);
    }
    raw_frame(opcode::OP_KILL_CURSORS, request_id, 0, &body)
}

/// OP_REPLY frame; `number_returned` is taken from the document count.
#[must_use]
pub fn reply_frame(
    response_to: i32,
    flags: i32,
    cursor_id: i64,
    starting_from: i32,
    documents: &[Document],
) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_i32_le(flags);
    body.put_i64_le(cursor_id);
    body.put_i32_le(starting_from);
    body.put_i32_le(documents.len() as i32);
    for doc in documents {
        body.extend_from_slice(&doc_bytes(doc));
    }
    raw_frame(opcode::OP_REPLY, 1, response_to, &body)
}

/// Legacy OP_MSG (1000) frame carrying a bare C-string.
#[must_use]
pub fn legacy_message_frame(request_id: i32, message: &str) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.extend_from_slice(message.as_bytes());
    body.put_u8(0);
    raw_frame(opcode::OP_MESSAGE, request_id, 0, &body)
}

/// OP_COMMAND frame.
#[must_use]
pub fn command_frame(
    request_id: i32,
    database: &str,
    command_name: &str,
    metadata: &Document,
    command_args: &Document,
) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.extend_from_slice(database.as_bytes());
    body.put_u8(0);
    body.extend_from_slice(command_name.as_bytes());
    body.put_u8(0);
    body.extend_from_slice(&doc_bytes(metadata));
    body.extend_from_slice(&doc_bytes(command_args));
    raw_frame(opcode::OP_COMMAND, request_id, 0, &body)
}

/// OP_COMMANDREPLY frame.
#[must_use]
pub fn command_reply_frame(
    response_to: i32,
    metadata: &Document,
    reply: &Document,
    output_docs: &Document,
) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.extend_from_slice(&doc_bytes(metadata));
    body.extend_from_slice(&doc_bytes(reply));
    body.extend_from_slice(&doc_bytes(output_docs));
    raw_frame(opcode::OP_COMMAND_REPLY, 1, response_to, &body)
}

/// Modern OP_MSG frame with one kind-0 body section.
///
/// When `checksum` is given the `checksumPresent` flag bit is set and the
/// value is appended as the message trailer.
#[must_use]
pub fn op_msg_body_frame(request_id: i32, body_doc: &Document, checksum: Option<u32>) -> Vec<u8> {
    let mut body = BytesMut::new();
    let flags = if checksum.is_some() {
        FLAG_CHECKSUM_PRESENT
    } else {
        0
    };
    body.put_u32_le(flags);
    body.put_u8(0);
    body.extend_from_slice(&doc_bytes(body_doc));
    if let Some(checksum) = checksum {
        body.put_u32_le(checksum);
    }
    raw_frame(opcode::OP_MSG, request_id, 0, &body)
}

/// Modern OP_MSG frame with one kind-1 document sequence section.
#[must_use]
pub fn op_msg_sequence_frame(request_id: i32, identifier: &str, documents: &[Document]) -> Vec<u8> {
    let encoded: Vec<Vec<u8>> = documents.iter().map(doc_bytes).collect();
    let docs_len: usize = encoded.iter().map(Vec::len).sum();
    let section_size = 4 + identifier.len() + 1 + docs_len;

    let mut body = BytesMut::new();
    body.put_u32_le(0); // flags
    body.put_u8(1);
    body.put_i32_le(section_size as i32);
    body.extend_from_slice(identifier.as_bytes());
    body.put_u8(0);
    for doc in &encoded {
        body.extend_from_slice(doc);
    }
    raw_frame(opcode::OP_MSG, request_id, 0, &body)
}
