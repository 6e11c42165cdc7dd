/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Remote note id. Kept as a string: the Blinko API returns numbers or
/// strings depending on version.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NoteId(pub String);

/// The two content kinds the remote service accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteKind {
    Note,
    Blinko,
}

impl NoteKind {
    /// Numeric value used on the wire and in storage (0 = note, 1 = blinko).
    pub fn as_wire(self) -> i64 {
        match self {
            NoteKind::Note => 0,
            NoteKind::Blinko => 1,
        }
    }

    pub fn from_wire(v: i64) -> Option<Self> {
        match v {
            0 => Some(NoteKind::Note),
            1 => Some(NoteKind::Blinko),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            NoteKind::Note => "note",
            NoteKind::Blinko => "blinko",
        }
    }
}
