use axum::{middleware, Router};

use crate::auth::middleware::JwtSecret;
use crate::chat::routes as chat_routes;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // REST surface (JWT via Authorization header — Claims extractor)
    let api_routes = Router::new()
        .route(
            "/api/chats/with/{user_id}",
            axum::routing::get(chat_routes::open_chat),
        )
        .route(
            "/api/chats/{chat_id}/messages",
            axum::routing::get(chat_routes::chat_history),
        );

    // WebSocket endpoint (auth via query param, not JWT header)
    let ws_routes = Router::new().route(
        "/ws/{chat_id}",
        axum::routing::get(ws_handler::chat_upgrade),
    );

    // Health check
    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(api_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
