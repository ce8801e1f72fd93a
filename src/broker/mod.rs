//! Session broker: dispatches inbound messages, mutates sessions, fans out
//! to peers, and runs the periodic offline/empty-session sweep (§4.4).
//!
//! The broker owns two independent registries:
//! - [`SessionStore`] — the per-session state, one `tokio::sync::Mutex` each.
//! - `sockets` — a flat map from `socket_id` to the channel the transport
//!   adapter reads from to push frames out over that connection. A socket
//!   is registered here the instant it connects and deregistered the
//!   instant it closes, independent of whether it ever joined a session.

pub mod connection;

use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::clock::{Clock, SystemClock};
use crate::codec::{self, InboundMessage, OutboundMessage, SessionMetaExternal};
use crate::config::Config;
use crate::constants::SESSION_TIMEOUT;
use crate::error::DispatchError;
use crate::model::{Session, UserInternal};
use crate::session_store::SessionStore;

/// Per-connection routing state, owned and mutated exclusively by that
/// connection's task (never shared), so no lock is needed around it.
#[derive(Debug, Clone)]
pub struct ConnState {
    pub socket_id: String,
    pub session_id: Option<String>,
    pub client_id: Option<String>,
}

impl ConnState {
    pub fn new(socket_id: String) -> Self {
        Self {
            socket_id,
            session_id: None,
            client_id: None,
        }
    }
}

/// The session broker. One instance per process, shared behind `Arc`.
#[derive(Debug)]
pub struct Broker {
    pub sessions: SessionStore,
    sockets: DashMap<String, mpsc::UnboundedSender<Message>>,
    clock: Arc<dyn Clock>,
    pub config: Config,
}

impl Broker {
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: SessionStore::new(),
            sockets: DashMap::new(),
            clock,
            config,
        }
    }

    fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Registers a freshly connected socket's outbound channel. Must be
    /// called before any frame from this socket is dispatched.
    pub fn register_socket(&self, socket_id: String, sender: mpsc::UnboundedSender<Message>) {
        self.sockets.insert(socket_id, sender);
    }

    fn send_to_socket(&self, socket_id: &str, payload: String) {
        if let Some(sender) = self.sockets.get(socket_id) {
            let _ = sender.send(Message::Text(payload.into()));
        }
    }

    /// Pushes a raw transport-level frame (used by the adapter's liveness
    /// probe) rather than an encoded wire message.
    pub fn send_raw(&self, socket_id: &str, message: Message) -> Result<(), ()> {
        match self.sockets.get(socket_id) {
            Some(sender) => sender.send(message).map_err(|_| ()),
            None => Err(()),
        }
    }

    fn send_error(&self, socket_id: &str, err: &DispatchError) {
        self.send_to_socket(socket_id, codec::encode_error(err));
    }

    /// Fans `payload` out to every socket of every user in `session`,
    /// skipping a socket matching `exclude_socket` (same connection) or a
    /// user matching `ignore_client` (same user, any tab).
    fn broadcast(
        &self,
        session: &Session,
        payload: &str,
        exclude_socket: Option<&str>,
        ignore_client: Option<&str>,
    ) {
        for user in session.users.values() {
            if ignore_client.is_some_and(|id| id == user.client_id) {
                continue;
            }
            for socket_id in &user.sockets {
                if exclude_socket.is_some_and(|id| id == socket_id) {
                    continue;
                }
                self.send_to_socket(socket_id, payload.to_string());
            }
        }
    }

    /// Entry point for one inbound text frame. Never propagates an error to
    /// the caller — failures are reported back to the sending socket as an
    /// `error` wire message.
    pub async fn dispatch(&self, conn: &mut ConnState, raw: &str) {
        let message = match codec::decode(raw) {
            Ok(message) => message,
            Err(err) => {
                self.send_error(&conn.socket_id, &err);
                return;
            }
        };

        match message {
            InboundMessage::Ping => {
                self.send_to_socket(&conn.socket_id, codec::encode(&OutboundMessage::Pong {}));
            }
            InboundMessage::SessionJoin {
                session_id,
                session,
                timer,
                user,
            } => self.handle_session_join(conn, session_id, session, timer, user).await,
            InboundMessage::SessionUpdate { session, timer } => {
                self.handle_session_update(conn, session, timer).await;
            }
            InboundMessage::TimerUpdate { timer } => {
                self.handle_timer_update(conn, timer).await;
            }
            InboundMessage::UserUpdate { user } => {
                self.handle_user_update(conn, user).await;
            }
            InboundMessage::UserList => {
                self.handle_user_list(conn).await;
            }
        }
    }

    async fn handle_session_join(
        &self,
        conn: &mut ConnState,
        raw_session_id: String,
        fields: codec::SessionFields,
        timer: crate::model::TimerStatePublic,
        user: codec::UserFields,
    ) {
        let canonical = codec::canonicalize_session_id(&raw_session_id);
        if !codec::is_valid_session_id(&canonical) {
            self.send_error(
                &conn.socket_id,
                &DispatchError::Validation("Invalid session id".to_string()),
            );
            return;
        }

        let now = self.now_ms();
        let (handle, is_new) = match self.sessions.get(&canonical) {
            Some(handle) => (handle, false),
            None => {
                let mut intervals = fields.intervals.clone();
                intervals.last_updated = now;
                let session = Session::new(canonical.clone(), fields.name.clone(), fields.description.clone(), intervals, timer, now);
                (self.sessions.put(session), true)
            }
        };

        let mut session = handle.lock().await;
        session.timer = session.timer_core.sync();

        let was_online_before = session
            .users
            .get(&user.client_id)
            .is_some_and(UserInternal::is_online);

        match session.users.get_mut(&user.client_id) {
            Some(existing) => {
                existing.sockets.insert(conn.socket_id.clone());
                existing.last_ping = now;
                existing.offline_at = None;
                if !user.name.is_empty() {
                    existing.name = user.name.clone();
                }
                if !user.avatar_url.is_empty() {
                    existing.avatar_url = user.avatar_url.clone();
                }
            }
            None => {
                session.users.insert(
                    user.client_id.clone(),
                    UserInternal::new(
                        user.client_id.clone(),
                        user.name.clone(),
                        user.avatar_url.clone(),
                        conn.socket_id.clone(),
                        now,
                    ),
                );
            }
        }

        session.empty_at = None;

        conn.session_id = Some(canonical.clone());
        conn.client_id = Some(user.client_id.clone());

        if is_new {
            self.send_to_socket(
                &conn.socket_id,
                codec::encode(&OutboundMessage::SessionCreated {
                    session_id: canonical.clone(),
                    client_id: user.client_id.clone(),
                }),
            );
        } else {
            self.send_to_socket(
                &conn.socket_id,
                codec::encode(&OutboundMessage::SessionJoined {
                    session_id: canonical.clone(),
                    client_id: user.client_id.clone(),
                    session: session.to_external(),
                }),
            );
        }

        // Only a zero-to-one socket transition is a real "connect" from
        // peers' point of view; a second tab from the same user must not
        // trigger a spurious broadcast.
        if !was_online_before {
            if let Some(external) = session.users.get(&user.client_id).map(UserInternal::to_external) {
                let payload = codec::encode(&OutboundMessage::UserConnected {
                    session_id: canonical.clone(),
                    user: external,
                });
                self.broadcast(&session, &payload, Some(&conn.socket_id), Some(&user.client_id));
            }
        }
    }

    async fn handle_session_update(
        &self,
        conn: &mut ConnState,
        fields: codec::SessionFields,
        timer: Option<crate::model::TimerStatePublic>,
    ) {
        let Some(session_id) = conn.session_id.clone() else {
            self.send_error(&conn.socket_id, &DispatchError::SessionNotFound);
            return;
        };
        let Some(handle) = self.sessions.get(&session_id) else {
            self.send_error(&conn.socket_id, &DispatchError::SessionNotFound);
            return;
        };

        let mut session = handle.lock().await;
        let now = self.now_ms();

        session.name = fields.name;
        session.description = fields.description;
        let mut intervals = fields.intervals;
        intervals.last_updated = now;
        session.intervals = intervals.clone();
        session.timer_core.update_intervals(intervals.items);

        if let Some(timer) = timer {
            session.timer = session.timer_core.update_state(timer);
        }
        session.timer = session.timer_core.sync();
        session.last_activity = now;

        let meta_payload = codec::encode(&OutboundMessage::SessionUpdated {
            session_id: session_id.clone(),
            session: SessionMetaExternal {
                name: session.name.clone(),
                description: session.description.clone(),
                intervals: session.intervals.clone(),
            },
        });
        self.broadcast(&session, &meta_payload, Some(&conn.socket_id), None);

        let timer_payload = codec::encode(&OutboundMessage::TimerUpdated {
            session_id,
            timer: session.timer,
        });
        self.broadcast(&session, &timer_payload, Some(&conn.socket_id), None);
    }

    async fn handle_timer_update(&self, conn: &mut ConnState, timer: crate::model::TimerStatePublic) {
        let Some(session_id) = conn.session_id.clone() else {
            self.send_error(&conn.socket_id, &DispatchError::SessionNotFound);
            return;
        };
        let Some(handle) = self.sessions.get(&session_id) else {
            self.send_error(&conn.socket_id, &DispatchError::SessionNotFound);
            return;
        };

        let mut session = handle.lock().await;
        session.timer_core.update_state(timer);
        session.timer = session.timer_core.sync();
        session.last_activity = self.now_ms();

        let payload = codec::encode(&OutboundMessage::TimerUpdated {
            session_id,
            timer: session.timer,
        });
        self.broadcast(&session, &payload, Some(&conn.socket_id), None);
    }

    async fn handle_user_update(&self, conn: &mut ConnState, fields: codec::UserFields) {
        let (Some(session_id), Some(client_id)) = (conn.session_id.clone(), conn.client_id.clone()) else {
            self.send_error(&conn.socket_id, &DispatchError::SessionNotFound);
            return;
        };
        let Some(handle) = self.sessions.get(&session_id) else {
            self.send_error(&conn.socket_id, &DispatchError::SessionNotFound);
            return;
        };

        let mut session = handle.lock().await;
        let Some(user) = session.users.get_mut(&client_id) else {
            self.send_error(&conn.socket_id, &DispatchError::SessionNotFound);
            return;
        };
        user.name = fields.name;
        user.avatar_url = fields.avatar_url;
        let external = user.to_external();

        let payload = codec::encode(&OutboundMessage::UserUpdated {
            session_id,
            user: external,
        });
        self.broadcast(&session, &payload, Some(&conn.socket_id), None);
    }

    async fn handle_user_list(&self, conn: &mut ConnState) {
        let Some(session_id) = conn.session_id.clone() else {
            self.send_error(&conn.socket_id, &DispatchError::SessionNotFound);
            return;
        };
        let Some(handle) = self.sessions.get(&session_id) else {
            self.send_error(&conn.socket_id, &DispatchError::SessionNotFound);
            return;
        };

        let session = handle.lock().await;
        let users = session
            .users
            .values()
            .map(|user| (user.hashed_id(), user.to_external()))
            .collect();

        self.send_to_socket(
            &conn.socket_id,
            codec::encode(&OutboundMessage::UsersConnected { session_id, users }),
        );
    }

    /// Called by the transport adapter when a connection closes, regardless
    /// of whether it ever completed a `session_join`.
    pub async fn remove_client(&self, conn: &ConnState) {
        self.sockets.remove(&conn.socket_id);

        let (Some(session_id), Some(client_id)) = (&conn.session_id, &conn.client_id) else {
            return;
        };
        let Some(handle) = self.sessions.get(session_id) else {
            return;
        };

        let mut session = handle.lock().await;
        let now = self.now_ms();

        let Some(user) = session.users.get_mut(client_id) else {
            return;
        };
        user.sockets.remove(&conn.socket_id);
        if !user.sockets.is_empty() {
            return;
        }

        user.offline_at = Some(now);
        let external = user.to_external();

        if !session.has_online_user() && session.empty_at.is_none() {
            session.empty_at = Some(now);
        }

        let payload = codec::encode(&OutboundMessage::UserUpdated {
            session_id: session_id.clone(),
            user: external,
        });
        self.broadcast(&session, &payload, None, None);
    }

    /// The periodic ticker's body: track-offline, reap-users, reap-sessions,
    /// strictly in that order.
    pub async fn run_cleanup_tick(&self) {
        let now = self.now_ms();
        let cleanup_ms = i64::try_from(self.config.cleanup_interval.as_millis()).unwrap_or(i64::MAX);

        for session_id in self.sessions.ids() {
            let Some(handle) = self.sessions.get(&session_id) else {
                continue;
            };
            let mut session = handle.lock().await;

            for user in session.users.values_mut() {
                if user.sockets.is_empty() {
                    if user.offline_at.is_none() {
                        user.offline_at = Some(now);
                    }
                } else {
                    user.offline_at = None;
                }
            }

            let stale_client_ids: Vec<String> = session
                .users
                .iter()
                .filter(|(_, user)| user.offline_at.is_some_and(|since| now - since > cleanup_ms))
                .map(|(client_id, _)| client_id.clone())
                .collect();

            for client_id in stale_client_ids {
                if let Some(user) = session.users.remove(&client_id) {
                    let payload = codec::encode(&OutboundMessage::UserDisconnected {
                        session_id: session_id.clone(),
                        user: user.to_external(),
                    });
                    self.broadcast(&session, &payload, None, None);
                }
            }

            if session.users.is_empty() && session.empty_at.is_none() {
                session.empty_at = Some(now);
            }
        }

        let session_timeout_ms = i64::try_from(SESSION_TIMEOUT.as_millis()).unwrap_or(i64::MAX);
        let mut expired = Vec::new();
        for session_id in self.sessions.ids() {
            let Some(handle) = self.sessions.get(&session_id) else {
                continue;
            };
            let session = handle.lock().await;
            let is_expired = !session.has_online_user()
                && session
                    .empty_at
                    .is_some_and(|since| now - since > session_timeout_ms);
            if is_expired {
                expired.push(session_id);
            }
        }
        for session_id in expired {
            self.sessions.remove(&session_id);
        }
    }

    /// Spawns the cleanup ticker task. Returns its `JoinHandle` so `main`
    /// can abort it on graceful shutdown.
    pub fn spawn_cleanup_ticker(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let broker = Arc::clone(self);
        let period = broker.config.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await; // first tick fires immediately, skip it
            loop {
                ticker.tick().await;
                broker.run_cleanup_tick().await;
            }
        })
    }
}
