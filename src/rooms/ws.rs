use axum::{
    debug_handler,
    extract::{Path, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast::error::RecvError;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppError, AppResult, broadcast::RoomStreams, db, res, rooms::msg, session};

/// An action a connected tab may request over its room socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientAction {
    Create { content: String },
    Update { id: Uuid, content: String },
}

/// One socket per tab: subscribed for the lifetime of the connection,
/// unsubscribed when either side hangs up. Envelopes for the room are
/// forwarded in publish order.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn room_ws(
    Path(room_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(streams): State<RoomStreams>,
    session: Session,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let Some(user_id) = session::current_user_id(&session).await? else {
        return Err(AppError::Forbidden("pick a handle before joining a room".to_owned()));
    };
    if db::room_name(&db_pool, room_id).await?.is_none() {
        return res::sorry("room");
    }

    Ok(ws
        .on_upgrade(async move |stream| {
            let mut rx = streams.subscribe(room_id);
            let (mut sender, mut receiver) = stream.split();

            let push_task = tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(envelope) => {
                            let Ok(frame) = serde_json::to_string(&envelope) else {
                                continue;
                            };
                            if sender.send(frame.into()).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "slow subscriber dropped envelopes");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            });

            while let Some(Ok(frame)) = receiver.next().await {
                // A frame we can't parse is dropped; the socket stays up.
                let Ok(action) = serde_json::from_slice::<ClientAction>(&frame.into_data()) else {
                    continue;
                };

                let outcome = match action {
                    ClientAction::Create { content } => {
                        msg::create_message(&db_pool, &streams, room_id, user_id, &content)
                            .await
                            .map(drop)
                    }
                    ClientAction::Update { id, content } => {
                        msg::update_message(&db_pool, &streams, room_id, user_id, id, &content)
                            .await
                            .map(drop)
                    }
                };
                if let Err(err) = outcome {
                    tracing::debug!(%err, "rejected client action");
                }
            }

            push_task.abort();
        })
        .into_response())
}
