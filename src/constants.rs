//! Application-wide constants for the timer broker.
//!
//! This module centralizes the protocol-level bounds and timeouts that the
//! wire contract treats as fixed rather than deployment knobs. Constants are
//! grouped by domain with documentation explaining their purpose.
//!
//! # Categories
//!
//! - **Validation**: length/duration bounds and defaults for the wire format.
//! - **Timeouts**: session and socket liveness windows.

use std::time::Duration;

// ============================================================================
// Validation bounds
// ============================================================================

/// Minimum duration for a single interval, in seconds.
pub const MIN_INTERVAL_DURATION_SECS: i64 = 1;

/// Maximum duration for a single interval, in seconds (24h).
pub const MAX_INTERVAL_DURATION_SECS: i64 = 86_400;

/// Default interval duration when none is supplied, in seconds (25 min).
pub const DEFAULT_INTERVAL_DURATION_SECS: i64 = 1_500;

/// Maximum remaining-time value on the wire, in milliseconds (24h).
pub const MAX_REMAINING_MS: i64 = MAX_INTERVAL_DURATION_SECS * 1_000;

/// Maximum length for an interval/session/user display name.
pub const MAX_NAME_LEN: usize = 50;

/// Maximum length for a session description.
pub const MAX_DESCRIPTION_LEN: usize = 1_000;

/// Maximum length for an avatar URL.
pub const MAX_AVATAR_URL_LEN: usize = 500;

/// Default alert tag applied to an interval when none is supplied.
pub const DEFAULT_ALERT: &str = "Default";

// ============================================================================
// Timeouts
// ============================================================================

/// How long a session may sit empty (no online users) before it is reaped.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// How long a socket may go unanswered on a liveness probe before the
/// transport adapter terminates the connection.
pub const SOCKET_TIMEOUT: Duration = Duration::from_secs(30);

/// Default period for the broker's offline-tracking / reaping ticker.
///
/// Overridable via `Config::cleanup_interval` (env `CLEANUP_INTERVAL`).
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);
