use sqlx::SqlitePool;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::AppResult;

pub const DEFAULT_ROOM_NAME: &str = "lobby";

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Message {
    pub id: String,
    pub room_id: String,
    pub user_id: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub handle: String,
}

fn now() -> AppResult<String> {
    Ok(OffsetDateTime::now_utc().format(&Rfc3339)?)
}

/// Create the schema if needed and make sure the default room exists.
/// Returns the default room's id.
pub async fn init(db_pool: &SqlitePool) -> AppResult<Uuid> {
    for stmt in [
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            handle TEXT NOT NULL UNIQUE
        )",
        "CREATE TABLE IF NOT EXISTS rooms (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            room_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    ] {
        sqlx::query(stmt).execute(db_pool).await?;
    }

    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM rooms WHERE name=?")
        .bind(DEFAULT_ROOM_NAME)
        .fetch_optional(db_pool)
        .await?;
    if let Some((id,)) = existing {
        return Ok(Uuid::parse_str(&id)?);
    }

    let id = Uuid::now_v7();
    sqlx::query("INSERT INTO rooms (id,name) VALUES (?,?)")
        .bind(id.to_string())
        .bind(DEFAULT_ROOM_NAME)
        .execute(db_pool)
        .await?;
    tracing::info!(room = %id, "created default room");
    Ok(id)
}

pub async fn find_or_create_user(db_pool: &SqlitePool, handle: &str) -> AppResult<User> {
    let existing: Option<User> = sqlx::query_as("SELECT id,handle FROM users WHERE handle=?")
        .bind(handle)
        .fetch_optional(db_pool)
        .await?;
    if let Some(user) = existing {
        return Ok(user);
    }

    let id = Uuid::now_v7();
    sqlx::query("INSERT INTO users (id,handle) VALUES (?,?)")
        .bind(id.to_string())
        .bind(handle)
        .execute(db_pool)
        .await?;
    Ok(User { id: id.to_string(), handle: handle.to_owned() })
}

/// Display handle for a message author. Falls back to an anonymous label
/// rather than failing the render.
pub async fn user_handle(db_pool: &SqlitePool, user_id: &str) -> AppResult<String> {
    let row: Option<(String,)> = sqlx::query_as("SELECT handle FROM users WHERE id=?")
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?;
    Ok(row.map(|(handle,)| handle).unwrap_or_else(|| "anonymous".to_owned()))
}

pub async fn room_name(db_pool: &SqlitePool, room_id: Uuid) -> AppResult<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT name FROM rooms WHERE id=?")
        .bind(room_id.to_string())
        .fetch_optional(db_pool)
        .await?;
    Ok(row.map(|(name,)| name))
}

#[derive(Debug, sqlx::FromRow)]
pub struct MessageWithAuthor {
    #[sqlx(flatten)]
    pub message: Message,
    pub handle: String,
}

/// Messages of a room with their author handles, in insertion order,
/// which is display order.
pub async fn room_messages(
    db_pool: &SqlitePool,
    room_id: Uuid,
) -> AppResult<Vec<MessageWithAuthor>> {
    Ok(sqlx::query_as(
        "SELECT m.id,m.room_id,m.user_id,m.content,m.created_at,m.updated_at,
                COALESCE(u.handle,'anonymous') AS handle
         FROM messages m LEFT JOIN users u ON u.id = m.user_id
         WHERE m.room_id=? ORDER BY m.created_at, m.id",
    )
    .bind(room_id.to_string())
    .fetch_all(db_pool)
    .await?)
}

pub async fn find_message(db_pool: &SqlitePool, message_id: Uuid) -> AppResult<Option<Message>> {
    Ok(sqlx::query_as(
        "SELECT id,room_id,user_id,content,created_at,updated_at FROM messages WHERE id=?",
    )
    .bind(message_id.to_string())
    .fetch_optional(db_pool)
    .await?)
}

pub async fn insert_message(
    db_pool: &SqlitePool,
    room_id: Uuid,
    user_id: Uuid,
    content: &str,
) -> AppResult<Message> {
    let message = Message {
        id: Uuid::now_v7().to_string(),
        room_id: room_id.to_string(),
        user_id: user_id.to_string(),
        content: content.to_owned(),
        created_at: now()?,
        updated_at: now()?,
    };
    sqlx::query(
        "INSERT INTO messages (id,room_id,user_id,content,created_at,updated_at)
         VALUES (?,?,?,?,?,?)",
    )
    .bind(&message.id)
    .bind(&message.room_id)
    .bind(&message.user_id)
    .bind(&message.content)
    .bind(&message.created_at)
    .bind(&message.updated_at)
    .execute(db_pool)
    .await?;
    Ok(message)
}

/// Overwrite a message's content. Last write wins on concurrent edits.
pub async fn apply_edit(
    db_pool: &SqlitePool,
    message: &Message,
    content: &str,
) -> AppResult<Message> {
    let updated_at = now()?;
    sqlx::query("UPDATE messages SET content=?, updated_at=? WHERE id=?")
        .bind(content)
        .bind(&updated_at)
        .bind(&message.id)
        .execute(db_pool)
        .await?;
    Ok(Message {
        content: content.to_owned(),
        updated_at,
        ..message.clone()
    })
}
