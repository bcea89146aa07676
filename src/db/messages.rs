use sqlx::{Pool, Sqlite};

use crate::db::models::{Conversation, ConversationSummary, Message};
use crate::error::AppError;

const MESSAGE_SELECT: &str = r#"
SELECT m.message_id, m.conversation_id, m.sender_id, u.full_name AS sender_name,
       m.receiver_id, m.content, m.is_read, m.created_at
FROM messages m
JOIN users u ON u.user_id = m.sender_id
"#;

/// A message between one patient and one provider
pub struct OutgoingMessage {
    pub patient_id: i64,
    pub provider_id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub content: String,
}

pub struct MessageRepository;

impl MessageRepository {
    /// Find or open the pair's conversation and append the message, atomically
    pub async fn send(pool: &Pool<Sqlite>, outgoing: OutgoingMessage) -> Result<Message, AppError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = pool.begin().await?;

        let conversation_id: i64 = sqlx::query_scalar(
            r#"
INSERT INTO conversations (patient_id, psychiatrist_id, created_at, updated_at)
VALUES (?, ?, ?, ?)
ON CONFLICT (patient_id, psychiatrist_id) DO UPDATE SET updated_at = excluded.updated_at
RETURNING conversation_id
            "#,
        )
        .bind(outgoing.patient_id)
        .bind(outgoing.provider_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let message_id: i64 = sqlx::query_scalar(
            r#"
INSERT INTO messages (conversation_id, sender_id, receiver_id, content, is_read, created_at)
VALUES (?, ?, ?, ?, 0, ?)
RETURNING message_id
            "#,
        )
        .bind(conversation_id)
        .bind(outgoing.sender_id)
        .bind(outgoing.receiver_id)
        .bind(&outgoing.content)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!(conversation_id, message_id, "message stored");

        Self::get_by_id(pool, message_id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch created message".to_string()))
    }

    pub async fn get_by_id(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Message>, AppError> {
        let sql = format!("{} WHERE m.message_id = ?", MESSAGE_SELECT);

        let message = sqlx::query_as::<_, Message>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(message)
    }

    pub async fn get_conversation(
        pool: &Pool<Sqlite>,
        id: i64,
    ) -> Result<Option<Conversation>, AppError> {
        let conversation =
            sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE conversation_id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await?;

        Ok(conversation)
    }

    /// Conversations of `user_id`, most recently active first
    pub async fn list_conversations(
        pool: &Pool<Sqlite>,
        user_id: i64,
    ) -> Result<Vec<ConversationSummary>, AppError> {
        let conversations = sqlx::query_as::<_, ConversationSummary>(
            r#"
SELECT c.conversation_id, c.patient_id, c.psychiatrist_id,
       o.user_id AS other_user_id, o.full_name AS other_user_name, o.role AS other_user_role,
       (SELECT m.content FROM messages m
        WHERE m.conversation_id = c.conversation_id
        ORDER BY m.created_at DESC, m.message_id DESC LIMIT 1) AS last_message,
       (SELECT MAX(m.created_at) FROM messages m
        WHERE m.conversation_id = c.conversation_id) AS last_message_at,
       (SELECT COUNT(*) FROM messages m
        WHERE m.conversation_id = c.conversation_id AND m.receiver_id = ? AND m.is_read = 0) AS unread_count,
       c.updated_at
FROM conversations c
JOIN users o ON o.user_id = CASE WHEN c.patient_id = ? THEN c.psychiatrist_id ELSE c.patient_id END
WHERE c.patient_id = ? OR c.psychiatrist_id = ?
ORDER BY c.updated_at DESC, c.conversation_id DESC
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(conversations)
    }

    /// Up to `limit` messages older than `before` (a message id), oldest first
    pub async fn list_messages(
        pool: &Pool<Sqlite>,
        conversation_id: i64,
        limit: i64,
        before: Option<i64>,
    ) -> Result<Vec<Message>, AppError> {
        let sql = format!(
            r#"{}
WHERE m.conversation_id = ? AND (? IS NULL OR m.message_id < ?)
ORDER BY m.message_id DESC
LIMIT ?
            "#,
            MESSAGE_SELECT
        );

        let mut messages = sqlx::query_as::<_, Message>(&sql)
            .bind(conversation_id)
            .bind(before)
            .bind(before)
            .bind(limit)
            .fetch_all(pool)
            .await?;

        messages.reverse();
        Ok(messages)
    }

    /// Mark everything `reader_id` received in the conversation as read
    pub async fn mark_conversation_read(
        pool: &Pool<Sqlite>,
        conversation_id: i64,
        reader_id: i64,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE messages SET is_read = 1 WHERE conversation_id = ? AND receiver_id = ? AND is_read = 0",
        )
        .bind(conversation_id)
        .bind(reader_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn mark_read(pool: &Pool<Sqlite>, message_id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE messages SET is_read = 1 WHERE message_id = ?")
            .bind(message_id)
            .execute(pool)
            .await?;

        Ok(())
    }

    pub async fn unread_count(pool: &Pool<Sqlite>, user_id: i64) -> Result<i64, AppError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE receiver_id = ? AND is_read = 0")
                .bind(user_id)
                .fetch_one(pool)
                .await?;

        Ok(count)
    }
}
