//! In-memory collaborative timer session broker.
//!
//! A session is a shared, sequenced-interval ("focus/break") timer that any
//! number of WebSocket-connected participants can observe and drive in
//! lockstep, with no authentication and no persistence — see
//! [`broker::Broker`] for the dispatch logic and [`timer_core::TimerCore`]
//! for the timer state machine itself.

pub mod broker;
pub mod clock;
pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod http_api;
pub mod model;
pub mod session_store;
pub mod timer_core;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

pub use broker::{Broker, ConnState};
pub use clock::{Clock, SystemClock, TestClock};
pub use config::Config;
pub use error::DispatchError;
pub use model::{Interval, IntervalList, Session, SessionExternal, TimerStatePublic, UserExternal, UserInternal};
pub use session_store::SessionStore;
pub use timer_core::TimerCore;

/// Assembles the WebSocket upgrade route and the public lookup route onto
/// one `axum::Router`, the same wiring `main` serves in production — shared
/// so integration tests exercise the real upgrade handshake and dispatch
/// path instead of reimplementing the route table.
pub fn build_router(broker: Arc<Broker>) -> Router {
    Router::new()
        .route("/ws", get(broker::connection::ws_handler))
        .route("/api/session/{sessionId}", get(http_api::get_session))
        .layer(TraceLayer::new_for_http())
        .with_state(broker)
}
