use axum::routing::get;
use axum::Router;

use crate::auth::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/users/{id}",
            get(handlers::get_user).patch(handlers::update_profile),
        )
}
