//! Core data model for intervals, timer state, users, and sessions.
//!
//! These are plain, non-networked value types. Wire (de)serialization and
//! sanitization live in [`crate::codec`]; the state machine that advances
//! [`TimerState`] over time lives in [`crate::timer_core`].

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_ALERT, DEFAULT_INTERVAL_DURATION_SECS};
use crate::timer_core::TimerCore;

/// One step in a session's focus/break cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub name: String,
    /// Duration in seconds, clamped to `[1, 86400]`.
    pub duration: i64,
    pub alert: String,
    /// Opaque, unvalidated styling payload.
    #[serde(rename = "customCSS", default)]
    pub custom_css: String,
}

impl Interval {
    pub fn duration_ms(&self) -> i64 {
        self.duration * 1_000
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self {
            name: String::new(),
            duration: DEFAULT_INTERVAL_DURATION_SECS,
            alert: DEFAULT_ALERT.to_string(),
            custom_css: String::new(),
        }
    }
}

/// Ordered list of intervals plus the wall-clock time it was last written.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IntervalList {
    #[serde(rename = "lastUpdated")]
    pub last_updated: i64,
    pub items: Vec<Interval>,
}

/// Wire-form timer snapshot: everything a client needs to render the timer,
/// and nothing of the broker's internal baseline.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimerStatePublic {
    pub repeat: bool,
    pub interval: usize,
    /// Milliseconds left in the active interval, clamped to `[0, 86400000]`.
    pub remaining: i64,
    #[serde(rename = "isRunning")]
    pub is_running: bool,
    #[serde(rename = "isPaused")]
    pub is_paused: bool,
}

impl Default for TimerStatePublic {
    fn default() -> Self {
        Self {
            repeat: false,
            interval: 0,
            remaining: DEFAULT_INTERVAL_DURATION_SECS * 1_000,
            is_running: false,
            is_paused: false,
        }
    }
}

/// Authoritative internal timer state: the public snapshot plus the
/// wall-clock baseline used to derive it. See §3/§4.1 of the spec for the
/// invariants this struct must preserve at every transition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimerState {
    pub repeat: bool,
    pub interval: usize,
    pub remaining: i64,
    pub is_running: bool,
    pub is_paused: bool,
    pub started_interval: usize,
    pub started_at: i64,
    pub paused_at: i64,
    pub time_paused: i64,
}

impl Default for TimerState {
    fn default() -> Self {
        Self {
            repeat: false,
            interval: 0,
            remaining: DEFAULT_INTERVAL_DURATION_SECS * 1_000,
            is_running: false,
            is_paused: false,
            started_interval: 0,
            started_at: 0,
            paused_at: 0,
            time_paused: 0,
        }
    }
}

impl TimerState {
    pub fn to_public(self) -> TimerStatePublic {
        TimerStatePublic {
            repeat: self.repeat,
            interval: self.interval,
            remaining: self.remaining,
            is_running: self.is_running,
            is_paused: self.is_paused,
        }
    }
}

/// A connected user, keyed internally by their raw `clientId`.
///
/// The raw id is routing-only: it must never reach a peer. Outbound
/// messages always go through [`UserInternal::to_external`].
#[derive(Clone, Debug)]
pub struct UserInternal {
    pub client_id: String,
    pub name: String,
    pub avatar_url: String,
    /// Live socket ids bound to this user (multiple tabs share a user).
    pub sockets: HashSet<String>,
    pub last_ping: i64,
    pub offline_at: Option<i64>,
}

impl UserInternal {
    pub fn new(client_id: String, name: String, avatar_url: String, socket_id: String, now_ms: i64) -> Self {
        let mut sockets = HashSet::new();
        sockets.insert(socket_id);
        Self {
            client_id,
            name,
            avatar_url,
            sockets,
            last_ping: now_ms,
            offline_at: None,
        }
    }

    pub fn is_online(&self) -> bool {
        !self.sockets.is_empty()
    }

    pub fn hashed_id(&self) -> String {
        crate::codec::hash_client_id(&self.client_id)
    }

    pub fn to_external(&self) -> UserExternal {
        UserExternal {
            hashed_id: self.hashed_id(),
            name: self.name.clone(),
            avatar_url: self.avatar_url.clone(),
            is_online: self.is_online(),
        }
    }
}

/// Wire-form user: the raw `clientId` is replaced by its SHA-256 hash.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserExternal {
    #[serde(rename = "clientId")]
    pub hashed_id: String,
    pub name: String,
    #[serde(rename = "avatarUrl")]
    pub avatar_url: String,
    #[serde(rename = "isOnline")]
    pub is_online: bool,
}

/// A session room: metadata, interval list, timer, and roster.
///
/// Owns its users and its [`TimerCore`] exclusively; nothing outside a
/// session references it directly other than the broker's session map.
#[derive(Debug)]
pub struct Session {
    pub session_id: String,
    pub name: String,
    pub description: String,
    pub intervals: IntervalList,
    /// Last snapshot written by `sync()`/a mutation, cached for immediate
    /// reuse by the broadcast path (re-synced immediately before every
    /// outbound `timer_updated`, per §4.4).
    pub timer: TimerStatePublic,
    pub timer_core: TimerCore,
    /// Keyed by raw `clientId` — internal routing key, never serialized.
    pub users: HashMap<String, UserInternal>,
    pub created_at: i64,
    pub last_activity: i64,
    pub empty_at: Option<i64>,
}

impl Session {
    pub fn new(
        session_id: String,
        name: String,
        description: String,
        intervals: IntervalList,
        timer: TimerStatePublic,
        now_ms: i64,
    ) -> Self {
        let timer_core = TimerCore::with_state(intervals.items.clone(), timer);
        Self {
            session_id,
            name,
            description,
            intervals,
            timer,
            timer_core,
            users: HashMap::new(),
            created_at: now_ms,
            last_activity: now_ms,
            empty_at: None,
        }
    }

    /// Any user with at least one open socket.
    pub fn has_online_user(&self) -> bool {
        self.users.values().any(UserInternal::is_online)
    }

    /// Sanitized snapshot of the full session, the one form ever sent to a
    /// peer (§4.6 "Public Lookup API" reuses exactly this).
    pub fn to_external(&self) -> SessionExternal {
        SessionExternal {
            session_id: self.session_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            intervals: self.intervals.clone(),
            timer: self.timer,
            users: self
                .users
                .values()
                .map(|u| (u.hashed_id(), u.to_external()))
                .collect(),
        }
    }
}

/// Wire-form full session snapshot (used by `session_joined` and the public
/// lookup API).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionExternal {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub name: String,
    pub description: String,
    pub intervals: IntervalList,
    pub timer: TimerStatePublic,
    pub users: HashMap<String, UserExternal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_default_matches_spec_defaults() {
        let interval = Interval::default();
        assert_eq!(interval.duration, 1_500);
        assert_eq!(interval.alert, "Default");
    }

    #[test]
    fn test_user_is_online_reflects_sockets() {
        let mut user = UserInternal::new(
            "11111111-1111-4111-8111-111111111111".to_string(),
            "Ada".to_string(),
            String::new(),
            "sock-1".to_string(),
            1_000,
        );
        assert!(user.is_online());
        user.sockets.clear();
        assert!(!user.is_online());
    }

    #[test]
    fn test_user_to_external_never_leaks_raw_client_id() {
        let user = UserInternal::new(
            "11111111-1111-4111-8111-111111111111".to_string(),
            "Ada".to_string(),
            String::new(),
            "sock-1".to_string(),
            1_000,
        );
        let external = user.to_external();
        assert_ne!(external.hashed_id, user.client_id);
        assert_eq!(external.hashed_id.len(), 64);
    }

    #[test]
    fn test_session_has_online_user() {
        let session = Session::new(
            "abc-123".to_string(),
            String::new(),
            String::new(),
            IntervalList::default(),
            TimerStatePublic::default(),
            1_000,
        );
        assert!(!session.has_online_user());
    }
}
