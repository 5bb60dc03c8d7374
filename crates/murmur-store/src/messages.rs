use chrono::{SubsecRound, Utc};
use rusqlite::params;
use uuid::Uuid;

use murmur_shared::{Attachment, AttachmentKind, ConversationKey, Message, MessageDraft, MessageId, UserId};

use crate::database::{conversion_error, format_ts, parse_ts, Database};
use crate::error::{Result, StoreError};

const MESSAGE_COLUMNS: &str =
    "id, sender_id, receiver_id, content, created_at, read, file_url, file_type, file_name";

impl Database {
    /// Persist a draft, assigning the id, timestamp and unread flag.
    pub fn insert_message(&self, draft: &MessageDraft) -> Result<Message> {
        if draft.sender_id == draft.receiver_id {
            return Err(StoreError::Constraint(
                "sender and receiver must differ".into(),
            ));
        }
        if draft.is_blank() {
            return Err(StoreError::Constraint("message is empty".into()));
        }

        let message = Message {
            id: MessageId::new(),
            sender_id: draft.sender_id,
            receiver_id: draft.receiver_id,
            content: draft.content.clone(),
            // Stored with microsecond precision.
            created_at: Utc::now().trunc_subsecs(6),
            read: false,
            attachment: draft.attachment.clone(),
        };

        let (file_url, file_type, file_name) = match &message.attachment {
            Some(a) => (Some(a.url.as_str()), Some(a.kind.as_str()), Some(a.name.as_str())),
            None => (None, None, None),
        };

        self.conn().execute(
            "INSERT INTO messages (id, sender_id, receiver_id, content, created_at, read,
                                   file_url, file_type, file_name)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8)",
            params![
                message.id.to_string(),
                message.sender_id.to_string(),
                message.receiver_id.to_string(),
                message.content,
                format_ts(&message.created_at),
                file_url,
                file_type,
                file_name,
            ],
        )?;
        Ok(message)
    }

    /// Every message exchanged within the pair, oldest first. Rows with the
    /// same timestamp keep insertion order.
    pub fn get_conversation(&self, key: &ConversationKey) -> Result<Vec<Message>> {
        let (a, b) = key.participants();
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)
             ORDER BY created_at ASC, rowid ASC"
        ))?;

        let rows = stmt.query_map(params![a.to_string(), b.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn get_message_by_id(&self, id: &MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn set_message_read(&self, id: &MessageId, read: bool) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE messages SET read = ?1 WHERE id = ?2",
            params![read, id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Flag every unread message from `sender` to `receiver` as read.
    pub fn mark_read_from(&self, receiver: &UserId, sender: &UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE messages SET read = 1
             WHERE receiver_id = ?1 AND sender_id = ?2 AND read = 0",
            params![receiver.to_string(), sender.to_string()],
        )?;
        Ok(affected)
    }

    /// Delete `id` only when `sender` sent it.
    pub fn delete_message_from(&self, id: &MessageId, sender: &UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM messages WHERE id = ?1 AND sender_id = ?2",
            params![id.to_string(), sender.to_string()],
        )?;
        Ok(affected > 0)
    }
}

fn parse_uuid(column: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| conversion_error(column, e))
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: String = row.get(0)?;
    let sender: String = row.get(1)?;
    let receiver: String = row.get(2)?;
    let ts_str: String = row.get(4)?;
    let file_url: Option<String> = row.get(6)?;
    let file_type: Option<String> = row.get(7)?;
    let file_name: Option<String> = row.get(8)?;

    let created_at = parse_ts(&ts_str).map_err(|e| conversion_error(4, e))?;

    let attachment = match (file_url, file_type) {
        (Some(url), Some(kind)) => Some(Attachment {
            url,
            kind: kind
                .parse::<AttachmentKind>()
                .map_err(|e| conversion_error(7, e))?,
            name: file_name.unwrap_or_default(),
        }),
        _ => None,
    };

    Ok(Message {
        id: MessageId(parse_uuid(0, &id)?),
        sender_id: UserId(parse_uuid(1, &sender)?),
        receiver_id: UserId(parse_uuid(2, &receiver)?),
        content: row.get(3)?,
        created_at,
        read: row.get(5)?,
        attachment,
    })
}
