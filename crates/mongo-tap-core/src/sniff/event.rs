//! Structured events emitted for decoded wire frames.
//!
//! The sink is an injected collaborator: the core hands it one event per
//! decoded frame (`op_code == 0` for decode errors) and never retains the
//! event afterwards. Rendering, filtering, and persistence are sink
//! concerns.

use bson::{Bson, Document};
use serde_json::Value;
use tracing::{info, warn};

use crate::wire::message::{DecodedMessage, Section};
use crate::wire::MsgHeader;

/// Field map attached to every event.
pub type JsonMap = serde_json::Map<String, Value>;

/// Receives one event per decoded frame.
///
/// Shared across every parser of every connection, so implementations must
/// tolerate concurrent invocation; any serialization they need is their
/// own.
pub trait EventSink: Send + Sync {
    /// Record one event. `op_code == 0` is reserved for decode errors.
    fn record(&self, op_code: i32, summary: &str, fields: &JsonMap);
}

/// Default sink: logs every event through `tracing`.
///
/// Decoded frames log at info, decode errors at warn.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, op_code: i32, summary: &str, fields: &JsonMap) {
        let fields = Value::Object(fields.clone());
        if op_code == 0 {
            warn!(target: "mongo_tap::event", op_code, %fields, "{summary}");
        } else {
            info!(target: "mongo_tap::event", op_code, %fields, "{summary}");
        }
    }
}

fn doc_json(doc: &Document) -> Value {
    Bson::from(doc.clone()).into_relaxed_extjson()
}

fn docs_json(docs: &[Document]) -> Value {
    Value::Array(docs.iter().map(doc_json).collect())
}

fn section_json(section: &Section) -> Value {
    let mut map = JsonMap::new();
    match section {
        Section::Body(doc) => {
            map.insert("type".to_string(), Value::from(0));
            map.insert("body".to_string(), doc_json(doc));
        }
        Section::Sequence {
            identifier,
            documents,
        } => {
            map.insert("type".to_string(), Value::from(1));
            map.insert("identifier".to_string(), Value::from(identifier.clone()));
            map.insert("objects".to_string(), docs_json(documents));
        }
    }
    Value::Object(map)
}

/// Build the summary string and structured fields for one decoded frame.
///
/// Summaries stay terse and textual; document payloads go into fields as
/// relaxed extended JSON so the sink decides how to render them.
#[must_use]
pub fn build_event(header: &MsgHeader, msg: &DecodedMessage) -> (String, JsonMap) {
    let mut fields = JsonMap::new();
    fields.insert("request_id".to_string(), Value::from(header.request_id));
    fields.insert("response_to".to_string(), Value::from(header.response_to));

    let summary = match msg {
        DecodedMessage::Query {
            flags,
            full_collection_name,
            number_to_skip,
            number_to_return,
            query,
            return_field_selector,
        } => {
            fields.insert("flags".to_string(), Value::from(*flags));
            fields.insert(
                "full_collection_name".to_string(),
                Value::from(full_collection_name.clone()),
            );
            fields.insert("number_to_skip".to_string(), Value::from(*number_to_skip));
            fields.insert(
                "number_to_return".to_string(),
                Value::from(*number_to_return),
            );
            fields.insert("query".to_string(), doc_json(query));
            if let Some(selector) = return_field_selector {
                fields.insert("return_field_selector".to_string(), doc_json(selector));
            }
            format!(
                "QUERY id:{} coll:{} skip:{} ret:{}",
                header.request_id, full_collection_name, number_to_skip, number_to_return
            )
        }
        DecodedMessage::Insert {
            flags,
            full_collection_name,
            documents,
        } => {
            fields.insert("flags".to_string(), Value::from(*flags));
            fields.insert(
                "full_collection_name".to_string(),
                Value::from(full_collection_name.clone()),
            );
            fields.insert("documents".to_string(), docs_json(documents));
            format!(
                "INSERT id:{} coll:{} docs:{}",
                header.request_id,
                full_collection_name,
                documents.len()
            )
        }
        DecodedMessage::Update {
            full_collection_name,
            flags,
            selector,
            update,
        } => {
            fields.insert("flags".to_string(), Value::from(*flags));
            fields.insert(
                "full_collection_name".to_string(),
                Value::from(full_collection_name.clone()),
            );
            fields.insert("selector".to_string(), doc_json(selector));
            fields.insert("update".to_string(), doc_json(update));
            format!(
                "UPDATE id:{} coll:{}",
                header.request_id, full_collection_name
            )
        }
        DecodedMessage::Delete {
            full_collection_name,
            flags,
            selector,
        } => {
            fields.insert("flags".to_string(), Value::from(*flags));
            fields.insert(
                "full_collection_name".to_string(),
                Value::from(full_collection_name.clone()),
            );
            fields.insert("selector".to_string(), doc_json(selector));
            format!(
                "DELETE id:{} coll:{}",
                header.request_id, full_collection_name
            )
        }
        DecodedMessage::GetMore {
            full_collection_name,
            number_to_return,
            cursor_id,
        } => {
            fields.insert(
                "full_collection_name".to_string(),
                Value::from(full_collection_name.clone()),
            );
            fields.insert(
                "number_to_return".to_string(),
                Value::from(*number_to_return),
            );
            fields.insert("cursor_id".to_string(), Value::from(*cursor_id));
            format!(
                "GETMORE id:{} coll:{} ret:{} cursor:{}",
                header.request_id, full_collection_name, number_to_return, cursor_id
            )
        }
        DecodedMessage::KillCursors {
            number_of_cursor_ids,
            cursor_ids,
        } => {
            fields.insert(
                "number_of_cursor_ids".to_string(),
                Value::from(*number_of_cursor_ids),
            );
            fields.insert(
                "cursor_ids".to_string(),
                Value::Array(cursor_ids.iter().map(|&id| Value::from(id)).collect()),
            );
            format!(
                "KILLCURSORS id:{} count:{}",
                header.request_id, number_of_cursor_ids
            )
        }
        DecodedMessage::Reply {
            flags,
            cursor_id,
            starting_from,
            number_returned,
            documents,
        } => {
            fields.insert("flags".to_string(), Value::from(*flags));
            fields.insert("cursor_id".to_string(), Value::from(*cursor_id));
            fields.insert("starting_from".to_string(), Value::from(*starting_from));
            fields.insert(
                "number_returned".to_string(),
                Value::from(*number_returned),
            );
            fields.insert("documents".to_string(), docs_json(documents));
            format!(
                "REPLY to:{} cursor:{} from:{} ret:{}",
                header.response_to, cursor_id, starting_from, number_returned
            )
        }
        DecodedMessage::Message { message } => {
            fields.insert("message".to_string(), Value::from(message.clone()));
            format!("MSG id:{}", header.request_id)
        }
        DecodedMessage::Command {
            database,
            command_name,
            metadata,
            command_args,
            input_docs,
        } => {
            fields.insert("database".to_string(), Value::from(database.clone()));
            fields.insert(
                "command_name".to_string(),
                Value::from(command_name.clone()),
            );
            fields.insert("metadata".to_string(), doc_json(metadata));
            fields.insert("command_args".to_string(), doc_json(command_args));
            fields.insert("input_docs".to_string(), docs_json(input_docs));
            format!(
                "COMMAND id:{} db:{} cmd:{}",
                header.request_id, database, command_name
            )
        }
        DecodedMessage::CommandReply {
            metadata,
            reply,
            output_docs,
        } => {
            fields.insert("metadata".to_string(), doc_json(metadata));
            fields.insert("reply".to_string(), doc_json(reply));
            fields.insert("output_docs".to_string(), doc_json(output_docs));
            format!("COMMANDREPLY to:{}", header.response_to)
        }
        DecodedMessage::Msg {
            flags,
            sections,
            checksum,
        } => {
            fields.insert("flags".to_string(), Value::from(*flags));
            fields.insert(
                "sections".to_string(),
                Value::Array(sections.iter().map(section_json).collect()),
            );
            if let Some(checksum) = checksum {
                fields.insert("checksum".to_string(), Value::from(*checksum));
            }
            format!(
                "OP_MSG id:{} sections:{}",
                header.request_id,
                sections.len()
            )
        }
        DecodedMessage::Reserved => format!("RESERVED id:{}", header.request_id),
        DecodedMessage::CommandDeprecated => {
            format!("COMMAND_DEPRECATED id:{}", header.request_id)
        }
        DecodedMessage::CommandReplyDeprecated => {
            format!("COMMANDREPLY_DEPRECATED to:{}", header.response_to)
        }
    };

    (summary, fields)
}
