//! MongoDB wire-protocol opcode tags.

/// The recognized opcode tag set.
///
/// Covers the legacy CRUD opcodes, the deprecated command pair, and the
/// modern section-based OP_MSG. Any other wire value is an unknown opcode
/// handled as a frame-local decode error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// Server reply to a legacy OP_QUERY or OP_GET_MORE.
    Reply,
    /// Legacy C-string message (opcode 1000).
    Message,
    /// Legacy document update.
    Update,
    /// Legacy document insert.
    Insert,
    /// Reserved; header only, no body.
    Reserved,
    /// Legacy query.
    Query,
    /// Cursor fetch.
    GetMore,
    /// Legacy document delete.
    Delete,
    /// Cursor cleanup.
    KillCursors,
    /// Deprecated command form; body is opaque.
    CommandDeprecated,
    /// Deprecated command-reply form; body is opaque.
    CommandReplyDeprecated,
    /// Intermediate command form.
    Command,
    /// Intermediate command-reply form.
    CommandReply,
    /// Modern section-based message (opcode 2013).
    Msg,
}

pub const OP_REPLY: i32 = 1;
pub const OP_MESSAGE: i32 = 1000;
pub const OP_UPDATE: i32 = 2001;
pub const OP_INSERT: i32 = 2002;
pub const OP_RESERVED: i32 = 2003;
pub const OP_QUERY: i32 = 2004;
pub const OP_GET_MORE: i32 = 2005;
pub const OP_DELETE: i32 = 2006;
pub const OP_KILL_CURSORS: i32 = 2007;
pub const OP_COMMAND_DEPRECATED: i32 = 2008;
pub const OP_COMMAND_REPLY_DEPRECATED: i32 = 2009;
pub const OP_COMMAND: i32 = 2010;
pub const OP_COMMAND_REPLY: i32 = 2011;
pub const OP_MSG: i32 = 2013;

impl OpCode {
    /// Map a wire value to an opcode, or `None` for an unknown value.
    #[must_use]
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            OP_REPLY => Some(Self::Reply),
            OP_MESSAGE => Some(Self::Message),
            OP_UPDATE => Some(Self::Update),
            OP_INSERT => Some(Self::Insert),
            OP_RESERVED => Some(Self::Reserved),
            OP_QUERY => Some(Self::Query),
            OP_GET_MORE => Some(Self::GetMore),
            OP_DELETE => Some(Self::Delete),
            OP_KILL_CURSORS => Some(Self::KillCursors),
            OP_COMMAND_DEPRECATED => Some(Self::CommandDeprecated),
            OP_COMMAND_REPLY_DEPRECATED => Some(Self::CommandReplyDeprecated),
            OP_COMMAND => Some(Self::Command),
            OP_COMMAND_REPLY => Some(Self::CommandReply),
            OP_MSG => Some(Self::Msg),
            _ => None,
        }
    }

    /// The wire value for this opcode.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Reply => OP_REPLY,
            Self::Message => OP_MESSAGE,
            Self::Update => OP_UPDATE,
            Self::Insert => OP_INSERT,
            Self::Reserved => OP_RESERVED,
            Self::Query => OP_QUERY,
            Self::GetMore => OP_GET_MORE,
            Self::Delete => OP_DELETE,
            Self::KillCursors => OP_KILL_CURSORS,
            Self::CommandDeprecated => OP_COMMAND_DEPRECATED,
            Self::CommandReplyDeprecated => OP_COMMAND_REPLY_DEPRECATED,
            Self::Command => OP_COMMAND,
            Self::CommandReply => OP_COMMAND_REPLY,
            Self::Msg => OP_MSG,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OpCode; 14] = [
        OpCode::Reply,
        OpCode::Message,
        OpCode::Update,
        OpCode::Insert,
        OpCode::Reserved,
        OpCode::Query,
        OpCode::GetMore,
        OpCode::Delete,
        OpCode::KillCursors,
        OpCode::CommandDeprecated,
        OpCode::CommandReplyDeprecated,
        OpCode::Command,
        OpCode::CommandReply,
        OpCode::Msg,
    ];

    #[test]
    fn test_opcode_round_trip() {
        for op in ALL {
            assert_eq!(OpCode::from_i32(op.as_i32()), Some(op));
        }
    }

    #[test]
    fn test_unknown_values() {
        for value in [0, 2, 999, 2000, 2012, 2014, 9999, -1] {
            assert_eq!(OpCode::from_i32(value), None);
        }
    }
}
