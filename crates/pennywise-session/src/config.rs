//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::CooldownPolicy;

/// Tuning knobs for session coordination.
///
/// Every value is injectable; the defaults are the documented policy:
/// refresh 5 minutes ahead of expiry, open the breaker after 3 consecutive
/// failures, cool down for 30 seconds, give a refresh call 15 seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long before expiry a token counts as `Expiring`.
    pub lead_time: Duration,

    /// Consecutive refresh failures that open the breaker.
    pub failure_threshold: u32,

    /// Base cool-down once the breaker opens.
    pub cooldown: Duration,

    /// Whether repeated probe failures stretch the cool-down.
    pub cooldown_policy: CooldownPolicy,

    /// Deadline for a single refresh (or sign-in / sign-out) call.
    pub refresh_timeout: Duration,

    /// Buffer size of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lead_time: Duration::from_secs(5 * 60),
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
            cooldown_policy: CooldownPolicy::Fixed,
            refresh_timeout: Duration::from_secs(15),
            event_capacity: 64,
        }
    }
}

impl SessionConfig {
    /// Smallest accepted refresh timeout.
    pub const MIN_REFRESH_TIMEOUT: Duration = Duration::from_secs(1);
    /// Largest accepted refresh timeout; waiters must not block forever.
    pub const MAX_REFRESH_TIMEOUT: Duration = Duration::from_secs(60);

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called by the session builder. Rules:
    /// - `failure_threshold` is at least 1.
    /// - `cooldown` is at least 1 second.
    /// - `refresh_timeout` is clamped to
    ///   [`MIN_REFRESH_TIMEOUT`](Self::MIN_REFRESH_TIMEOUT)..=[`MAX_REFRESH_TIMEOUT`](Self::MAX_REFRESH_TIMEOUT).
    /// - an exponential cool-down cap below the base cool-down is raised to it.
    pub fn validated(mut self) -> Self {
        if self.failure_threshold == 0 {
            warn!("failure_threshold of 0 would keep the breaker open; using 1");
            self.failure_threshold = 1;
        }
        if self.cooldown < Duration::from_secs(1) {
            warn!(cooldown_ms = self.cooldown.as_millis() as u64, "cooldown too short; using 1s");
            self.cooldown = Duration::from_secs(1);
        }
        let clamped = self
            .refresh_timeout
            .clamp(Self::MIN_REFRESH_TIMEOUT, Self::MAX_REFRESH_TIMEOUT);
        if clamped != self.refresh_timeout {
            warn!(
                requested_ms = self.refresh_timeout.as_millis() as u64,
                clamped_ms = clamped.as_millis() as u64,
                "refresh_timeout out of range, clamping"
            );
            self.refresh_timeout = clamped;
        }
        if let CooldownPolicy::Exponential { max } = self.cooldown_policy {
            if max < self.cooldown {
                self.cooldown_policy = CooldownPolicy::Exponential { max: self.cooldown };
            }
        }
        self.event_capacity = self.event_capacity.max(1);
        self
    }
}
