mod msg;
mod room;
mod ws;

pub use msg::{create_message, update_message};

use axum::{Router, routing::{get, post}};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{room_id}", get(room::room))
        .route("/{room_id}/ws", get(ws::room_ws))
        .route("/{room_id}/messages", post(msg::post_message))
}
