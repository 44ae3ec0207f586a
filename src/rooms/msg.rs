use axum::{
    Form, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppError, AppResult, db,
    broadcast::{self, Operation, RoomStreams},
    session,
};

/// Post a message and fan it out to the room. The envelope targets the
/// room's message list and carries the sender variant only for the author.
pub async fn create_message(
    db_pool: &SqlitePool,
    streams: &RoomStreams,
    room_id: Uuid,
    author_id: Uuid,
    content: &str,
) -> AppResult<db::Message> {
    let content = valid_content(content)?;

    // Every entry point lands here, so the room check lives here too; it
    // also keeps unknown room ids from minting stream registry entries.
    if db::room_name(db_pool, room_id).await?.is_none() {
        return Err(AppError::Validation(format!("no room {room_id}")));
    }

    let stream = streams.stream(room_id);
    let _order = stream.write_order().await;

    let message = db::insert_message(db_pool, room_id, author_id, content).await?;
    let handle = db::user_handle(db_pool, &message.user_id).await?;
    broadcast::dispatch(&stream, &message, &handle, Operation::Insert);
    Ok(message)
}

/// Edit a message in place. Only the author may edit; the envelope targets
/// the message's own element so subscribers replace rather than append.
pub async fn update_message(
    db_pool: &SqlitePool,
    streams: &RoomStreams,
    room_id: Uuid,
    author_id: Uuid,
    message_id: Uuid,
    content: &str,
) -> AppResult<db::Message> {
    let content = valid_content(content)?;

    let Some(message) = db::find_message(db_pool, message_id).await? else {
        return Err(AppError::Validation(format!("no message {message_id}")));
    };
    if message.room_id != room_id.to_string() {
        return Err(AppError::Validation(format!("message {message_id} is not in this room")));
    }
    if message.user_id != author_id.to_string() {
        return Err(AppError::Forbidden("only the author can edit a message".to_owned()));
    }

    // Write and publish under the room gate so a racing second edit cannot
    // deliver its envelope before this one.
    let stream = streams.stream(room_id);
    let _order = stream.write_order().await;

    let message = db::apply_edit(db_pool, &message, content).await?;
    let handle = db::user_handle(db_pool, &message.user_id).await?;
    broadcast::dispatch(&stream, &message, &handle, Operation::Replace);
    Ok(message)
}

fn valid_content(content: &str) -> AppResult<&str> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::Validation("message text cannot be empty".to_owned()));
    }
    Ok(content)
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostMessageForm {
    content: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn post_message(
    Path(room_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(streams): State<RoomStreams>,
    session: Session,

    Form(PostMessageForm { content }): Form<PostMessageForm>,
) -> AppResult<Response> {
    let Some(user_id) = session::current_user_id(&session).await? else {
        return Err(AppError::Forbidden("pick a handle before posting".to_owned()));
    };

    create_message(&db_pool, &streams, room_id, user_id, &content).await?;
    Ok(StatusCode::CREATED.into_response())
}
