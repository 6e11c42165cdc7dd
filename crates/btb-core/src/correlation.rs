//! Maps bot-sent confirmation messages to the remote notes they announced.
//!
//! The key is the bot's own confirmation message id: that is what users reply
//! to, and it stays stable across repeated edits of the same note.

use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

use crate::domain::{ChatId, MessageId, NoteId, NoteKind};
use crate::Result;

/// One tracked confirmation message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRecord {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub note_id: NoteId,
    pub kind: NoteKind,
    pub content_hash: String,
}

/// Hex Sha256 of note text, stored so an edit can be compared against the
/// last-known content.
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

#[derive(Clone)]
pub struct CorrelationStore {
    pool: SqlitePool,
}

impl CorrelationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a record; overwrites if the message id is already mapped, which
    /// supports re-editing the same confirmation.
    pub async fn record(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        note_id: &NoteId,
        kind: NoteKind,
        content_hash: &str,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO note_messages
               (chat_id, message_id, note_id, kind, content_hash, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(chat_id, message_id) DO UPDATE SET
               note_id = excluded.note_id,
               kind = excluded.kind,
               content_hash = excluded.content_hash,
               updated_at = excluded.updated_at",
        )
        .bind(chat_id.0)
        .bind(message_id.0)
        .bind(&note_id.0)
        .bind(kind.as_wire())
        .bind(content_hash)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Absence means "not trackable": the caller creates a new note instead
    /// of updating.
    pub async fn lookup(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<Option<MessageRecord>> {
        let row = sqlx::query(
            "SELECT note_id, kind, content_hash FROM note_messages
             WHERE chat_id = ? AND message_id = ?",
        )
        .bind(chat_id.0)
        .bind(message_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let kind_raw: i64 = row.get("kind");
        let Some(kind) = NoteKind::from_wire(kind_raw) else {
            tracing::warn!(chat_id = chat_id.0, message_id = message_id.0, kind_raw, "unknown note kind in correlation row; treating as untracked");
            return Ok(None);
        };

        Ok(Some(MessageRecord {
            chat_id,
            message_id,
            note_id: NoteId(row.get("note_id")),
            kind,
            content_hash: row.get("content_hash"),
        }))
    }

    /// Rebind a tracked message to a new remote id. Used when the remote
    /// reissues an id on edit, or when a deleted note was recreated.
    pub async fn update_remote_id(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        new_note_id: &NoteId,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE note_messages SET note_id = ?, updated_at = ?
             WHERE chat_id = ? AND message_id = ?",
        )
        .bind(&new_note_id.0)
        .bind(Utc::now().to_rfc3339())
        .bind(chat_id.0)
        .bind(message_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
