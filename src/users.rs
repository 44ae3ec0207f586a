use axum::{
    Form, Router, debug_handler,
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{AppError, AppResult, AppState, db, include_res, session::USER_ID};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/new", get(new_user_page))
        .route("/", post(create_user))
}

#[derive(Debug, Deserialize)]
pub(crate) struct NewUserForm {
    handle: String,
}

#[debug_handler]
pub(crate) async fn new_user_page() -> impl IntoResponse {
    Html(include_res!(str, "/pages/new_user.html"))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn create_user(
    State(state): State<AppState>,
    session: Session,

    Form(NewUserForm { handle }): Form<NewUserForm>,
) -> AppResult<Response> {
    let handle = handle.trim();
    if handle.is_empty() {
        return Err(AppError::Validation("handle cannot be empty".to_owned()));
    }

    let user = db::find_or_create_user(&state.db_pool, handle).await?;
    session.insert(USER_ID, &user.id).await?;
    tracing::info!(user = %user.id, handle = %user.handle, "user signed in");

    Ok(Redirect::to(&format!("/r/{}", state.default_room)).into_response())
}
