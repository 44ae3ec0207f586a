use axum::{
    debug_handler,
    extract::{Path, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppResult, db, include_res, render, res, session};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn room(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(room_id): Path<Uuid>,
) -> AppResult<Response> {
    let Some(user_id) = session::current_user_id(&session).await? else {
        return Ok(Redirect::to("/u/new").into_response());
    };

    let Some(name) = db::room_name(&db_pool, room_id).await? else {
        return res::sorry("room");
    };

    // Initial history uses the same viewer split the live envelopes carry.
    let user_id = user_id.to_string();
    let mut messages = String::new();
    for entry in db::room_messages(&db_pool, room_id).await? {
        let mine = entry.message.user_id == user_id;
        messages += &render::message_fragment(&entry.message, &entry.handle, mine);
    }

    let body = include_res!(str, "/pages/rooms/room.html")
        .replace("{room_id}", &room_id.to_string())
        .replace("{room_name}", &name)
        .replace("{client_id}", &user_id)
        .replace("{messages}", &messages);

    Ok(Html(body).into_response())
}
