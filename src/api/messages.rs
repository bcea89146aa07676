use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::AuthUser;
use crate::api::state::AppState;
use crate::api::validation;
use crate::db::messages::OutgoingMessage;
use crate::db::{ConversationSummary, Message, MessageRepository, Role, UserRepository};
use crate::error::AppError;

const MAX_MESSAGE_CHARS: usize = 5000;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub receiver_id: i64,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct GetMessagesQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub before: Option<i64>, // Message id cursor for pagination
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct UnreadResponse {
    pub unread: i64,
}

/// Order a sender/receiver pair as (patient, provider)
fn care_pair(
    sender: (i64, Role),
    receiver: (i64, Role),
) -> Result<(i64, i64), AppError> {
    match (sender.1, receiver.1) {
        (Role::Patient, r) if r.is_provider() => Ok((sender.0, receiver.0)),
        (s, Role::Patient) if s.is_provider() => Ok((receiver.0, sender.0)),
        _ => Err(AppError::Validation(
            "Messages can only be exchanged between a patient and a provider".to_string(),
        )),
    }
}

/// GET /api/messages/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<ConversationSummary>>, AppError> {
    let conversations = MessageRepository::list_conversations(&state.db, auth.user_id).await?;
    Ok(Json(conversations))
}

/// POST /api/messages
pub async fn send_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let content = validation::required_text("content", &req.content, MAX_MESSAGE_CHARS)?;

    let receiver = UserRepository::get_by_id(&state.db, req.receiver_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::NotFound("Recipient not found".to_string()))?;

    let (patient_id, provider_id) = care_pair(
        (auth.user_id, auth.role),
        (receiver.user_id, receiver.role),
    )?;

    let message = MessageRepository::send(
        &state.db,
        OutgoingMessage {
            patient_id,
            provider_id,
            sender_id: auth.user_id,
            receiver_id: receiver.user_id,
            content,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/messages/conversations/:id
pub async fn get_conversation_messages(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Query(query): Query<GetMessagesQuery>,
) -> Result<Json<Vec<Message>>, AppError> {
    let conversation = MessageRepository::get_conversation(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))?;

    if conversation.patient_id != auth.user_id && conversation.psychiatrist_id != auth.user_id {
        return Err(AppError::Forbidden("Not a participant of this conversation".to_string()));
    }

    // Mark first so the page reflects what this read consumed
    let marked = MessageRepository::mark_conversation_read(&state.db, id, auth.user_id).await?;
    if marked > 0 {
        tracing::debug!(conversation_id = id, marked, "messages marked read");
    }

    let limit = query.limit.clamp(1, 200);
    let messages = MessageRepository::list_messages(&state.db, id, limit, query.before).await?;

    Ok(Json(messages))
}

/// PATCH /api/messages/:id/read
pub async fn mark_message_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let message = MessageRepository::get_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Message not found".to_string()))?;

    if message.receiver_id != auth.user_id {
        return Err(AppError::Forbidden("Only the recipient can mark a message read".to_string()));
    }

    MessageRepository::mark_read(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/messages/unread-count
pub async fn unread_count(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<UnreadResponse>, AppError> {
    let unread = MessageRepository::unread_count(&state.db, auth.user_id).await?;
    Ok(Json(UnreadResponse { unread }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_care_pair_orders_patient_first() {
        assert_eq!(care_pair((1, Role::Patient), (2, Role::Counselor)).unwrap(), (1, 2));
        assert_eq!(care_pair((2, Role::Psychiatrist), (1, Role::Patient)).unwrap(), (1, 2));
    }

    #[test]
    fn test_care_pair_rejects_other_combinations() {
        assert!(care_pair((1, Role::Patient), (2, Role::Patient)).is_err());
        assert!(care_pair((1, Role::Counselor), (2, Role::Psychiatrist)).is_err());
        assert!(care_pair((1, Role::Admin), (2, Role::Patient)).is_err());
    }
}
