use murmur::{AppResult, AppState, broadcast::RoomStreams, rooms, session, users};
use axum::{
    debug_handler,
    extract::State,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer, cookie::SameSite};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("murmur=debug,tower_http=info")),
        )
        .init();

    let database_url = dotenv::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://murmur.db?mode=rwc".to_owned());
    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(&database_url)
        .await
        .unwrap();
    let default_room = murmur::db::init(&db_pool).await.unwrap();

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(2)));

    let app_state = AppState {
        db_pool,
        streams: RoomStreams::new(),
        default_room,
    };

    let app = Router::new()
        .route("/", get(root))

        .nest("/r", rooms::router())
        .nest("/u", users::router())

        .with_state(app_state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http());

    let bind_addr = dotenv::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());
    tracing::info!(%bind_addr, "listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

#[debug_handler(state = AppState)]
async fn root(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Response> {
    if session::current_user_id(&session).await?.is_some() {
        Ok(Redirect::to(&format!("/r/{}", state.default_room)).into_response())
    } else {
        Ok(Redirect::to("/u/new").into_response())
    }
}
