use axum::{extract::State, Json};
use tracing::debug;

use crate::{
    auth::RequestContext,
    error::AppResult,
    notifications::{build_feed, NotificationFeed},
    state::AppState,
};

pub async fn list_notifications(
    State(state): State<AppState>,
    context: RequestContext,
) -> AppResult<Json<NotificationFeed>> {
    let feed = if context.permitted_contracts.is_empty() {
        NotificationFeed::default()
    } else {
        let mut conn = state.db()?;
        build_feed(&mut *conn, context.role_id, &context.permitted_contracts)?
    };

    debug!(
        user_id = %context.user_id,
        performance = feed.performance.len(),
        invoice = feed.invoice.len(),
        advantage = feed.advantage.len(),
        "notification feed built"
    );
    Ok(Json(feed))
}
