//! Decoded wire messages, one variant per recognized opcode.

use bson::Document;

use crate::error::{DecodeError, DecodeResult};

use super::codec::RawFrame;
use super::decode::FrameCursor;
use super::opcode::OpCode;

/// OP_MSG flag bit: the message ends with a CRC-32C checksum.
pub const FLAG_CHECKSUM_PRESENT: u32 = 1;
/// OP_MSG flag bit: another message follows without further action.
pub const FLAG_MORE_TO_COME: u32 = 1 << 1;
/// OP_MSG flag bit: the client accepts multiple replies via moreToCome.
pub const FLAG_EXHAUST_ALLOWED: u32 = 1 << 16;

/// One section of a modern OP_MSG frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Section {
    /// Kind 0: a single body document.
    Body(Document),
    /// Kind 1: a named document sequence.
    Sequence {
        identifier: String,
        documents: Vec<Document>,
    },
}

/// A fully decoded wire message.
///
/// Flags are opaque bit fields, recorded but never interpreted, except
/// for the OP_MSG `checksumPresent` bit which changes the frame layout.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedMessage {
    Query {
        flags: i32,
        full_collection_name: String,
        number_to_skip: i32,
        number_to_return: i32,
        query: Document,
        return_field_selector: Option<Document>,
    },
    Insert {
        flags: i32,
        full_collection_name: String,
        documents: Vec<Document>,
    },
    Update {
        full_collection_name: String,
        flags: i32,
        selector: Document,
        update: Document,
    },
    Delete {
        full_collection_name: String,
        flags: i32,
        selector: Document,
    },
    GetMore {
        full_collection_name: String,
        number_to_return: i32,
        cursor_id: i64,
    },
    KillCursors {
        number_of_cursor_ids: i32,
        cursor_ids: Vec<i64>,
    },
    Reply {
        flags: i32,
        cursor_id: i64,
        starting_from: i32,
        number_returned: i32,
        documents: Vec<Document>,
    },
    /// Legacy opcode 1000: a bare C-string message.
    Message { message: String },
    Command {
        database: String,
        command_name: String,
        metadata: Document,
        command_args: Document,
        input_docs: Vec<Document>,
    },
    CommandReply {
        metadata: Document,
        reply: Document,
        output_docs: Document,
    },
    /// Modern opcode 2013.
    Msg {
        flags: u32,
        sections: Vec<Section>,
        checksum: Option<u32>,
    },
    /// Opcode 2003: header only.
    Reserved,
    /// Opcode 2008: body is opaque and discarded.
    CommandDeprecated,
    /// Opcode 2009: body is opaque and discarded.
    CommandReplyDeprecated,
}

impl DecodedMessage {
    /// The opcode this message decodes.
    #[must_use]
    pub fn op_code(&self) -> OpCode {
        match self {
            Self::Query { .. } => OpCode::Query,
            Self::Insert { .. } => OpCode::Insert,
            Self::Update { .. } => OpCode::Update,
            Self::Delete { .. } => OpCode::Delete,
            Self::GetMore { .. } => OpCode::GetMore,
            Self::KillCursors { .. } => OpCode::KillCursors,
            Self::Reply { .. } => OpCode::Reply,
            Self::Message { .. } => OpCode::Message,
            Self::Command { .. } => OpCode::Command,
            Self::CommandReply { .. } => OpCode::CommandReply,
            Self::Msg { .. } => OpCode::Msg,
            Self::Reserved => OpCode::Reserved,
            Self::CommandDeprecated => OpCode::CommandDeprecated,
            Self::CommandReplyDeprecated => OpCode::CommandReplyDeprecated,
        }
    }
}

/// Decode a reassembled frame's body according to its opcode.
///
/// # Errors
///
/// Any error here is frame-local: the caller emits an error event and the
/// stream stays aligned, because framing already happened in the codec.
pub fn decode_frame(frame: &RawFrame) -> DecodeResult<DecodedMessage> {
    let op_code = OpCode::from_i32(frame.header.op_code)
        .ok_or(DecodeError::UnknownOpCode(frame.header.op_code))?;
    let mut cursor = FrameCursor::new(&frame.body);

    match op_code {
        OpCode::Query => decode_query(&mut cursor),
        OpCode::Insert => decode_insert(&mut cursor),
        OpCode::Update => decode_update(&mut cursor),
        OpCode::Delete => decode_delete(&mut cursor),
        OpCode::GetMore => decode_get_more(&mut cursor),
        OpCode::KillCursors => decode_kill_cursors(&mut cursor),
        OpCode::Reply => decode_reply(&mut cursor),
        OpCode::Message => Ok(DecodedMessage::Message {
            message: cursor.read_cstring()?,
        }),
        OpCode::Command => decode_command(&mut cursor),
        OpCode::CommandReply => decode_command_reply(&mut cursor),
        OpCode::Msg => decode_msg(&mut cursor),
        OpCode::Reserved => Ok(DecodedMessage::Reserved),
        OpCode::CommandDeprecated => Ok(DecodedMessage::CommandDeprecated),
        OpCode::CommandReplyDeprecated => Ok(DecodedMessage::CommandReplyDeprecated),
    }
}

fn decode_query(cursor: &mut FrameCursor<'_>) -> DecodeResult<DecodedMessage> {
    let flags = cursor.read_i32("query flags")?;
    let full_collection_name = cursor.read_cstring()?;
    let number_to_skip = cursor.read_i32("numberToSkip")?;
    let number_to_return = cursor.read_i32("numberToReturn")?;
    let query = cursor.read_required_document("query document")?;
    let return_field_selector = cursor.read_document()?;
    Ok(DecodedMessage::Query {
        flags,
        full_collection_name,
        number_to_skip,
        number_to_return,
        query,
        return_field_selector,
    })
}

fn decode_insert(cursor: &mut FrameCursor<'_>) -> DecodeResult<DecodedMessage> {
    let flags = cursor.read_i32("insert flags")?;
    let full_collection_name = cursor.read_cstring()?;
    let documents = cursor.read_documents()?;
    Ok(DecodedMessage::Insert {
        flags,
        full_collection_name,
        documents,
    })
}

fn decode_update(cursor: &mut FrameCursor<'_>) -> DecodeResult<DecodedMessage> {
    let _reserved = cursor.read_i32("reserved")?;
    let full_collection_name = cursor.read_cstring()?;
    let flags = cursor.read_i32("update flags")?;
    let selector = cursor.read_required_document("update selector")?;
    let update = cursor.read_required_document("update document")?;
    Ok(DecodedMessage::Update {
        full_collection_name,
        flags,
        selector,
        update,
    })
}

fn decode_delete(cursor: &mut FrameCursor<'_>) -> DecodeResult<DecodedMessage> {
    let _reserved = cursor.read_i32("reserved")?;
    let full_collection_name = cursor.read_cstring()?;
    let flags = cursor.read_i32("delete flags")?;
    let selector = cursor.read_required_document("delete selector")?;
    Ok(DecodedMessage::Delete {
        full_collection_name,
        flags,
        selector,
    })
}

fn decode_get_more(cursor: &mut FrameCursor<'_>) -> DecodeResult<DecodedMessage> {
    let _reserved = cursor.read_i32("reserved")?;
    let full_collection_name = cursor.read_cstring()?;
    let number_to_return = cursor.read_i32("numberToReturn")?;
    let cursor_id = cursor.read_i64("cursorID")?;
    Ok(DecodedMessage::GetMore {
        full_collection_name,
        number_to_return,
        cursor_id,
    })
}

fn decode_kill_cursors(cursor: &mut FrameCursor<'_>) -> DecodeResult<DecodedMessage> {
    let _reserved = cursor.read_i32("reserved")?;
    let number_of_cursor_ids = cursor.read_i32("numberOfCursorIDs")?;
    let mut cursor_ids = Vec::new();
    while !cursor.is_empty() {
        cursor_ids.push(cursor.read_i64("cursorID")?);
    }
    Ok(DecodedMessage::KillCursors {
        number_of_cursor_ids,
        cursor_ids,
    })
}

fn decode_reply(cursor: &mut FrameCursor<'_>) -> DecodeResult<DecodedMessage> {
    let flags = cursor.read_i32("reply flags")?;
    let cursor_id = cursor.read_i64("cursorID")?;
    let starting_from = cursor.read_i32("startingFrom")?;
    let number_returned = cursor.read_i32("numberReturned")?;
    let documents = cursor.read_documents()?;
    Ok(DecodedMessage::Reply {
        flags,
        cursor_id,
        starting_from,
        number_returned,
        documents,
    })
}

fn decode_command(cursor: &mut FrameCursor<'_>) -> DecodeResult<DecodedMessage> {
    let database = cursor.read_cstring()?;
    let command_name = cursor.read_cstring()?;
    let metadata = cursor.read_required_document("command metadata")?;
    let command_args = cursor.read_required_document("command args")?;
    let input_docs = cursor.read_documents()?;
    Ok(DecodedMessage::Command {
        database,
        command_name,
        metadata,
        command_args,
        input_docs,
    })
}

fn decode_command_reply(cursor: &mut FrameCursor<'_>) -> DecodeResult<DecodedMessage> {
    let metadata = cursor.read_required_document("reply metadata")?;
    let reply = cursor.read_required_document("command reply")?;
    let output_docs = cursor.read_required_document("output docs")?;
    Ok(DecodedMessage::CommandReply {
        metadata,
        reply,
        output_docs,
    })
}

fn decode_msg(cursor: &mut FrameCursor<'_>) -> DecodeResult<DecodedMessage> {
    let flags = cursor.read_u32("message flags")?;

    // The checksum, when the flag announces one, is a whole-message
    // trailer; split it off before walking sections so the section loop
    // sees a clean end-of-body boundary.
    let checksum = if flags & FLAG_CHECKSUM_PRESENT != 0 {
        let mut tail = cursor.split_tail(4, "checksum")?;
        Some(tail.read_u32("checksum")?)
    } else {
        None
    };

    let mut sections = Vec::new();
    while !cursor.is_empty() {
        let kind = cursor.read_u8("section kind")?;
        match kind {
            0 => {
                let body = cursor.read_required_document("section body")?;
                sections.push(Section::Body(body));
            }
            1 => {
                let section_size = cursor.read_i32("section size")?;
                if section_size < 4 {
                    return Err(DecodeError::Truncated("document sequence section"));
                }
                let mut section = cursor.take(
                    section_size as usize - 4,
                    "document sequence section",
                )?;
                let identifier = section.read_cstring()?;
                let documents = section.read_documents()?;
                sections.push(Section::Sequence {
                    identifier,
                    documents,
                });
            }
            other => return Err(DecodeError::UnknownSectionKind(other)),
        }
    }

    Ok(DecodedMessage::Msg {
        flags,
        sections,
        checksum,
    })
}
