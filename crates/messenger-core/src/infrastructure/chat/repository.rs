//! Chat repository implementations
//!
//! SQLite-backed `ChatStore` and `MessageStore`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::domain::chat::{Chat, ChatStore, ChatType, pair_key};
use crate::domain::message::{Attachment, AttachmentKind, Message, MessageStore};
use crate::error::{Error, Result};
use crate::storage::codec::{decode_id, decode_opt_ts, decode_ts, encode_ts, encode_upper_bound};

const CHAT_COLUMNS: &str = "c.id, c.chat_type, c.name, c.avatar_url, c.created_at, c.updated_at";

const MESSAGE_COLUMNS: &str = "m.id, m.chat_id, m.sender_id, m.text, m.created_at, m.updated_at";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_foreign_key_violation())
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() { None } else { Some(value) }
}

/// Chat repository for database operations
#[derive(Debug, Clone)]
pub struct ChatRepository {
    pool: SqlitePool,
}

impl ChatRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn insert_chat(conn: &mut SqliteConnection, chat: &Chat, key: Option<&str>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chats (id, chat_type, name, avatar_url, pair_key, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(chat.id.to_string())
        .bind(chat.chat_type.as_str())
        .bind(non_empty(&chat.name))
        .bind(non_empty(&chat.avatar_url))
        .bind(key)
        .bind(encode_ts(chat.created_at))
        .bind(encode_ts(chat.updated_at))
        .execute(conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::AlreadyExists(format!("Chat for pair {}", key.unwrap_or("-")))
            } else {
                Error::DatabaseError(e)
            }
        })?;

        Ok(())
    }

    async fn insert_member(conn: &mut SqliteConnection, chat_id: Uuid, user_id: Uuid) -> Result<()> {
        sqlx::query("INSERT INTO chat_members (chat_id, user_id, joined_at) VALUES (?, ?, ?)")
            .bind(chat_id.to_string())
            .bind(user_id.to_string())
            .bind(encode_ts(Utc::now()))
            .execute(conn)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    Error::AlreadyInChat { chat_id, user_id }
                } else if is_foreign_key_violation(&e) {
                    Error::NotFound(format!("Chat {}", chat_id))
                } else {
                    Error::DatabaseError(e)
                }
            })?;

        Ok(())
    }
}

#[async_trait]
impl ChatStore for ChatRepository {
    async fn create_chat(&self, chat: &Chat) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_chat(&mut conn, chat, None).await?;
        debug!(chat_id = %chat.id, chat_type = %chat.chat_type, "Saved chat");
        Ok(())
    }

    async fn create_private_chat(&self, chat: &Chat, first: Uuid, second: Uuid) -> Result<()> {
        if first == second {
            return Err(Error::InvalidArgument(
                "A private chat needs two distinct participants".to_string(),
            ));
        }

        let key = pair_key(first, second);
        let mut tx = self.pool.begin().await?;
        Self::insert_chat(&mut tx, chat, Some(&key)).await?;
        Self::insert_member(&mut tx, chat.id, first).await?;
        Self::insert_member(&mut tx, chat.id, second).await?;
        tx.commit().await?;

        debug!(chat_id = %chat.id, pair_key = %key, "Saved private chat with both members");
        Ok(())
    }

    async fn get_user_chats(&self, user_id: Uuid) -> Result<Vec<Chat>> {
        let rows: Vec<ChatRow> = sqlx::query_as(&format!(
            r#"
            SELECT {CHAT_COLUMNS},
                   me.last_read AS last_read_by_me,
                   (SELECT MAX(o.last_read) FROM chat_members o
                     WHERE o.chat_id = c.id AND o.user_id != me.user_id) AS last_read_by_other
            FROM chats c
            JOIN chat_members me ON me.chat_id = c.id
            WHERE me.user_id = ?
            ORDER BY c.updated_at DESC, c.id
            "#
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        debug!(user_id = %user_id, count = rows.len(), "Fetched user chats");
        rows.into_iter().map(ChatRow::into_chat).collect()
    }

    async fn get_chat_participants(&self, chat_id: Uuid) -> Result<Vec<Uuid>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT user_id FROM chat_members WHERE chat_id = ? ORDER BY joined_at, user_id",
        )
        .bind(chat_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|(id,)| decode_id(id, "user")).collect()
    }

    async fn get_chat(&self, chat_id: Uuid) -> Result<Chat> {
        let row: Option<ChatRow> = sqlx::query_as(&format!(
            r#"
            SELECT {CHAT_COLUMNS}, NULL AS last_read_by_me, NULL AS last_read_by_other
            FROM chats c
            WHERE c.id = ?
            "#
        ))
        .bind(chat_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.into_chat(),
            None => Err(Error::NotFound(format!("Chat {}", chat_id))),
        }
    }

    async fn get_private_chat(&self, first: Uuid, second: Uuid) -> Result<Chat> {
        let key = pair_key(first, second);
        let row: Option<ChatRow> = sqlx::query_as(&format!(
            r#"
            SELECT {CHAT_COLUMNS}, NULL AS last_read_by_me, NULL AS last_read_by_other
            FROM chats c
            WHERE c.pair_key = ?
            "#
        ))
        .bind(&key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.into_chat(),
            None => Err(Error::NotFound(format!("Private chat for pair {}", key))),
        }
    }

    async fn exists(&self, chat_id: Uuid) -> Result<bool> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM chats WHERE id = ?")
            .bind(chat_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    async fn delete_chat(&self, chat_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM chats WHERE id = ?")
            .bind(chat_id.to_string())
            .execute(&self.pool)
            .await?;

        debug!(chat_id = %chat_id, "Deleted chat");
        Ok(())
    }

    async fn is_participant(&self, chat_id: Uuid, user_id: Uuid) -> Result<bool> {
        let row: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM chat_members WHERE chat_id = ? AND user_id = ?")
                .bind(chat_id.to_string())
                .bind(user_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.is_some())
    }

    async fn join_chat(&self, chat_id: Uuid, user_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Write first: a deferred transaction that starts with a read cannot
        // upgrade once another connection has committed in WAL mode
        Self::insert_member(&mut tx, chat_id, user_id).await?;

        let (chat_type,): (String,) = sqlx::query_as("SELECT chat_type FROM chats WHERE id = ?")
            .bind(chat_id.to_string())
            .fetch_one(&mut *tx)
            .await?;

        if ChatType::parse(&chat_type) == Some(ChatType::Private) {
            let members: Vec<(String,)> =
                sqlx::query_as("SELECT user_id FROM chat_members WHERE chat_id = ?")
                    .bind(chat_id.to_string())
                    .fetch_all(&mut *tx)
                    .await?;

            match members.as_slice() {
                [(a,), (b,)] => {
                    let key = pair_key(decode_id(a, "user")?, decode_id(b, "user")?);
                    sqlx::query("UPDATE chats SET pair_key = ? WHERE id = ?")
                        .bind(&key)
                        .bind(chat_id.to_string())
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| {
                            if is_unique_violation(&e) {
                                Error::AlreadyExists(format!("Private chat for pair {}", key))
                            } else {
                                Error::DatabaseError(e)
                            }
                        })?;
                }
                members if members.len() > 2 => return Err(Error::ChatFull(chat_id)),
                _ => {}
            }
        }

        tx.commit().await?;
        debug!(chat_id = %chat_id, user_id = %user_id, "User joined chat");
        Ok(())
    }

    async fn leave_chat(&self, chat_id: Uuid, user_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chat_members WHERE chat_id = ? AND user_id = ?")
            .bind(chat_id.to_string())
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await?;

        // A private chat missing one side no longer represents the pair
        sqlx::query("UPDATE chats SET pair_key = NULL WHERE id = ? AND chat_type = 'private'")
            .bind(chat_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(chat_id = %chat_id, user_id = %user_id, "User left chat");
        Ok(())
    }

    async fn get_num_unread_chats(&self, user_id: Uuid) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM chat_members me
            WHERE me.user_id = ?
              AND EXISTS (
                  SELECT 1 FROM messages m
                  WHERE m.chat_id = me.chat_id
                    AND (me.last_read IS NULL OR m.created_at > me.last_read)
              )
            "#,
        )
        .bind(user_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

/// Message repository for database operations
#[derive(Debug, Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Attach stored attachments to decoded messages, keeping attachment order
    fn assemble(rows: Vec<MessageRow>, attachments: Vec<AttachmentRow>) -> Result<Vec<Message>> {
        let mut by_message: HashMap<String, Vec<Attachment>> = HashMap::new();
        for row in attachments {
            let message_id = row.message_id.clone();
            by_message.entry(message_id).or_default().push(row.into_attachment());
        }

        rows.into_iter()
            .map(|row| {
                let attachments = by_message.remove(&row.id).unwrap_or_default();
                row.into_message(attachments)
            })
            .collect()
    }

    async fn attachments_for(&self, message_id: &str) -> Result<Vec<AttachmentRow>> {
        let rows = sqlx::query_as(
            "SELECT message_id, url, kind, name FROM message_attachments WHERE message_id = ? ORDER BY position",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn single(&self, row: Option<MessageRow>) -> Result<Option<Message>> {
        let Some(row) = row else {
            return Ok(None);
        };
        let attachments = self.attachments_for(&row.id).await?;
        Ok(Self::assemble(vec![row], attachments)?.pop())
    }
}

#[async_trait]
impl MessageStore for MessageRepository {
    async fn get_message_by_id(&self, message_id: Uuid) -> Result<Message> {
        let row: Option<MessageRow> =
            sqlx::query_as(&format!("SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.id = ?"))
                .bind(message_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        self.single(row)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Message {}", message_id)))
    }

    async fn get_messages_for_chat_older(
        &self,
        chat_id: Uuid,
        limit: u32,
        before: DateTime<Utc>,
    ) -> Result<Vec<Message>> {
        let page = r#"
            SELECT id FROM messages
            WHERE chat_id = ? AND created_at < ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
        "#;

        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.id IN ({page}) ORDER BY m.created_at DESC, m.id DESC"
        ))
        .bind(chat_id.to_string())
        .bind(encode_upper_bound(before))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let attachments: Vec<AttachmentRow> = sqlx::query_as(&format!(
            "SELECT message_id, url, kind, name FROM message_attachments WHERE message_id IN ({page}) ORDER BY message_id, position"
        ))
        .bind(chat_id.to_string())
        .bind(encode_upper_bound(before))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        debug!(chat_id = %chat_id, count = rows.len(), before = %before, "Fetched messages");
        Self::assemble(rows, attachments)
    }

    async fn get_last_chat_message(&self, chat_id: Uuid) -> Result<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.chat_id = ? ORDER BY m.created_at DESC, m.id DESC LIMIT 1"
        ))
        .bind(chat_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        self.single(row).await
    }

    async fn save_message(&self, message: &Message) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let message_id = message.id.to_string();

        sqlx::query(
            r#"
            INSERT INTO messages (id, chat_id, sender_id, text, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message_id)
        .bind(message.chat_id.to_string())
        .bind(message.sender_id.to_string())
        .bind(&message.text)
        .bind(encode_ts(message.created_at))
        .bind(encode_ts(message.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                Error::NotFound(format!("Chat {}", message.chat_id))
            } else {
                Error::DatabaseError(e)
            }
        })?;

        for (position, attachment) in message.attachments.iter().enumerate() {
            sqlx::query(
                "INSERT INTO message_attachments (message_id, position, url, kind, name) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&message_id)
            .bind(position as i64)
            .bind(&attachment.url)
            .bind(attachment.kind.as_str())
            .bind(&attachment.name)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE chats SET updated_at = MAX(updated_at, ?) WHERE id = ?")
            .bind(encode_ts(message.updated_at))
            .bind(message.chat_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(message_id = %message.id, chat_id = %message.chat_id, "Saved message");
        Ok(())
    }

    async fn delete_message(&self, message_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(message_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_last_read_ts(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>> {
        let row: Option<(Option<i64>,)> =
            sqlx::query_as("SELECT last_read FROM chat_members WHERE chat_id = ? AND user_id = ?")
                .bind(chat_id.to_string())
                .bind(user_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        decode_opt_ts(row.and_then(|(ts,)| ts))
    }

    async fn get_last_read_by_others(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>> {
        let (ts,): (Option<i64>,) = sqlx::query_as(
            "SELECT MAX(last_read) FROM chat_members WHERE chat_id = ? AND user_id != ?",
        )
        .bind(chat_id.to_string())
        .bind(user_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        decode_opt_ts(ts)
    }

    async fn update_last_read_ts(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let result =
            sqlx::query("UPDATE chat_members SET last_read = ? WHERE chat_id = ? AND user_id = ?")
                .bind(encode_ts(timestamp))
                .bind(chat_id.to_string())
                .bind(user_id.to_string())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "Membership of user {} in chat {}",
                user_id, chat_id
            )));
        }

        Ok(())
    }

    async fn get_num_unread_messages(&self, chat_id: Uuid, user_id: Uuid) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM messages m
            JOIN chat_members me ON me.chat_id = m.chat_id AND me.user_id = ?
            WHERE m.chat_id = ?
              AND (me.last_read IS NULL OR m.created_at > me.last_read)
            "#,
        )
        .bind(user_id.to_string())
        .bind(chat_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

/// Database row for a chat, optionally decorated with read positions
#[derive(sqlx::FromRow)]
struct ChatRow {
    id: String,
    chat_type: String,
    name: Option<String>,
    avatar_url: Option<String>,
    created_at: i64,
    updated_at: i64,
    last_read_by_me: Option<i64>,
    last_read_by_other: Option<i64>,
}

impl ChatRow {
    fn into_chat(self) -> Result<Chat> {
        let chat_type = ChatType::parse(&self.chat_type)
            .ok_or_else(|| Error::Parse(format!("Unknown chat type: {}", self.chat_type)))?;

        Ok(Chat {
            id: decode_id(&self.id, "chat")?,
            chat_type,
            name: self.name.unwrap_or_default(),
            avatar_url: self.avatar_url.unwrap_or_default(),
            created_at: decode_ts(self.created_at)?,
            updated_at: decode_ts(self.updated_at)?,
            last_read_by_me: decode_opt_ts(self.last_read_by_me)?,
            last_read_by_other: decode_opt_ts(self.last_read_by_other)?,
            last_message: None,
        })
    }
}

/// Database row for a message
#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    chat_id: String,
    sender_id: String,
    text: String,
    created_at: i64,
    updated_at: i64,
}

impl MessageRow {
    fn into_message(self, attachments: Vec<Attachment>) -> Result<Message> {
        Ok(Message {
            id: decode_id(&self.id, "message")?,
            chat_id: decode_id(&self.chat_id, "chat")?,
            sender_id: decode_id(&self.sender_id, "sender")?,
            text: self.text,
            attachments,
            created_at: decode_ts(self.created_at)?,
            updated_at: decode_ts(self.updated_at)?,
        })
    }
}

/// Database row for a message attachment
#[derive(sqlx::FromRow)]
struct AttachmentRow {
    message_id: String,
    url: String,
    kind: String,
    name: Option<String>,
}

impl AttachmentRow {
    fn into_attachment(self) -> Attachment {
        Attachment {
            url: self.url,
            kind: AttachmentKind::parse(&self.kind).unwrap_or_default(),
            name: self.name,
        }
    }
}
