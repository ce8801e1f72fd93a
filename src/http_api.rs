//! Public lookup API: a single read-only HTTP route for inspecting a
//! session's current snapshot without opening a WebSocket connection.
//!
//! Re-syncs the timer before serializing, so a GET a moment before the
//! active interval rolls over still reports the post-rollover state rather
//! than a stale broadcast-time snapshot.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::broker::Broker;
use crate::model::SessionExternal;

/// `GET /api/session/{sessionId}`
pub async fn get_session(
    State(broker): State<Arc<Broker>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionExternal>, StatusCode> {
    let canonical = crate::codec::canonicalize_session_id(&session_id);
    let handle = broker.sessions.get(&canonical).ok_or(StatusCode::NOT_FOUND)?;

    let mut session = handle.lock().await;
    session.timer = session.timer_core.sync();
    Ok(Json(session.to_external()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::config::Config;
    use crate::model::{IntervalList, Session, TimerStatePublic};
    use std::sync::Arc as StdArc;

    #[tokio::test]
    async fn test_get_session_returns_not_found_for_missing_session() {
        let broker = StdArc::new(Broker::with_clock(Config::default(), StdArc::new(TestClock::new(0))));
        let result = get_session(State(broker), Path("missing".to_string())).await;
        assert_eq!(result.unwrap_err(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_session_returns_sanitized_snapshot() {
        let broker = StdArc::new(Broker::with_clock(Config::default(), StdArc::new(TestClock::new(1_000))));
        let session = Session::new(
            "team-standup".to_string(),
            "Focus".to_string(),
            String::new(),
            IntervalList::default(),
            TimerStatePublic::default(),
            1_000,
        );
        broker.sessions.put(session);

        let Json(external) = get_session(State(broker), Path("team-standup".to_string()))
            .await
            .expect("session exists");
        assert_eq!(external.session_id, "team-standup");
        assert_eq!(external.name, "Focus");
        assert!(external.users.is_empty());
    }
}
