//! Ambient session configuration: identification banner, timeouts and the
//! byte/time thresholds that trigger an opportunistic rekey.

use std::time::Duration;

use crate::factory::FactoryManager;

/// Byte count after which a direction becomes eligible for rekeying, per
/// RFC 4253 §9's recommendation to rekey well before 2**32 packets or
/// a gigabyte of traffic accumulate under one set of keys.
pub const REKEY_BYTES_THRESHOLD: u64 = 1 << 30;

/// Time after which a direction becomes eligible for rekeying regardless of
/// traffic volume.
pub const REKEY_TIME_THRESHOLD: Duration = Duration::from_secs(3600);

/// Default `auth-timeout`: how long an unauthenticated session is tolerated
/// before it is disconnected.
pub const AUTH_TIMEOUT: Duration = Duration::from_millis(120_000);

/// Default `idle-timeout`: how long a session may go without writing a
/// packet or seeing a response before it is disconnected.
pub const IDLE_TIMEOUT: Duration = Duration::from_millis(600_000);

/// Default `disconnect-timeout`: grace period bounding the final
/// `SSH_MSG_DISCONNECT` write.
pub const DISCONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default cap on authentication attempts an upstream auth service may
/// consult before giving up; the session core itself never enforces this,
/// it only carries the value for that service to read.
pub const MAX_AUTH_REQUESTS: u32 = 20;

/// Ambient configuration shared by both [`crate::side::Client`] and
/// [`crate::side::Server`].
#[derive(Clone)]
pub struct Config {
    /// How long an unauthenticated session is tolerated before disconnect.
    pub auth_timeout: Duration,

    /// How long a session may sit idle (no packet written, no response
    /// seen) before disconnect.
    pub idle_timeout: Duration,

    /// Grace period bounding the final `SSH_MSG_DISCONNECT` write.
    pub disconnect_timeout: Duration,

    /// Byte threshold past which this session offers to rekey.
    pub rekey_bytes_threshold: u64,

    /// Time threshold past which this session offers to rekey.
    pub rekey_time_threshold: Duration,

    /// Cap on authentication attempts, consulted by an upstream auth
    /// service; the session core doesn't enforce this itself.
    pub max_auth_requests: u32,

    /// Optional pre-auth welcome banner text and its language tag, sent by
    /// an upstream auth service rather than the transport core itself.
    pub welcome_banner: Option<(String, String)>,

    /// The factories this session resolves negotiated algorithm names
    /// through.
    pub factories: FactoryManager,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("auth_timeout", &self.auth_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("disconnect_timeout", &self.disconnect_timeout)
            .field("rekey_bytes_threshold", &self.rekey_bytes_threshold)
            .field("rekey_time_threshold", &self.rekey_time_threshold)
            .field("max_auth_requests", &self.max_auth_requests)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auth_timeout: AUTH_TIMEOUT,
            idle_timeout: IDLE_TIMEOUT,
            disconnect_timeout: DISCONNECT_TIMEOUT,
            rekey_bytes_threshold: REKEY_BYTES_THRESHOLD,
            rekey_time_threshold: REKEY_TIME_THRESHOLD,
            max_auth_requests: MAX_AUTH_REQUESTS,
            welcome_banner: None,
            factories: FactoryManager::with_defaults(),
        }
    }
}
