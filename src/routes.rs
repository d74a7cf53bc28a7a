use axum::{extract::DefaultBodyLimit, Router};

use crate::handlers;
use crate::AppState;

/// Router answering every path and method through the dispatcher.
///
/// Upload size is enforced while spooling multipart parts, so axum's own
/// body limit is lifted.
pub fn file_routes() -> Router<AppState> {
    Router::new()
        .fallback(handlers::serve)
        .layer(DefaultBodyLimit::disable())
}

/// [`file_routes`] with its state attached, ready to serve.
pub fn app(state: AppState) -> Router {
    file_routes().with_state(state)
}
