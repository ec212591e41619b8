//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let book_routes = Router::new()
        .route("/api/books", get(handlers::list_books))
        .route("/api/books/upload", post(handlers::upload_books))
        .route(
            "/api/books/search",
            get(handlers::search_books).post(handlers::search_books_json),
        )
        .route("/api/books/search/title/{title}", get(handlers::find_by_title))
        .route("/api/books/search/author/{author}", get(handlers::find_by_author))
        .route(
            "/api/books/search/category/{category}",
            get(handlers::find_by_category),
        )
        .route(
            "/api/books/{id}",
            get(handlers::get_book).delete(handlers::delete_book),
        )
        .route("/api/books/{id}/file", get(handlers::download_book));

    let mut router = Router::new()
        .route("/", get(handlers::welcome))
        .route("/health", get(handlers::health_check))
        .merge(book_routes);

    // When enabled, /metrics must be network-restricted to the scraper.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    // Whole-request cap; per-file limits are enforced while streaming.
    let body_limit = DefaultBodyLimit::max(state.config.server.max_request_body_size);

    router
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
