// ── Failure classification and cooldown ──
//
// Protocol libraries report failures as free text. `FailureKind::classify`
// maps that text onto a small taxonomy; `FailureTracker` counts
// consecutive failures per session and gates new attempts once the
// configured limit is reached.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{AsRefStr, Display};
use tokio::time::Instant;

/// Heuristic failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    #[strum(serialize = "connection failed")]
    ConnectionFailed,
    #[strum(serialize = "authentication failed")]
    AuthenticationFailed,
    #[strum(serialize = "invalid protocol response")]
    InvalidProtocolResponse,
    #[strum(serialize = "device offline")]
    DeviceOffline,
    #[strum(serialize = "unknown")]
    Unknown,
}

impl FailureKind {
    /// Classify an error message. Keyword groups are checked in order, so
    /// "connect timeout: unauthorized" is a connection failure.
    pub fn classify(message: &str) -> Self {
        const GROUPS: &[(&[&str], FailureKind)] = &[
            (
                &["timeout", "connect", "network"],
                FailureKind::ConnectionFailed,
            ),
            (
                &["auth", "login", "password", "unauthorized"],
                FailureKind::AuthenticationFailed,
            ),
            (
                &["soap", "xml", "response"],
                FailureKind::InvalidProtocolResponse,
            ),
            (&["offline", "unreachable"], FailureKind::DeviceOffline),
        ];

        let lower = message.to_lowercase();
        GROUPS
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
            .map_or(FailureKind::Unknown, |(_, kind)| *kind)
    }
}

/// How many consecutive failures are tolerated before attempts pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownPolicy {
    pub max_consecutive_failures: u32,
    pub cooldown: Duration,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 5,
            cooldown: Duration::from_secs(30 * 60),
        }
    }
}

/// Snapshot of a session's failure history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FailureStatus {
    pub last_error: Option<String>,
    pub kind: Option<FailureKind>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

/// Per-session failure counter with a cooldown gate.
///
/// The counter survives successful attempts; it only returns to zero when
/// a new attempt is permitted after the cooldown window.
#[derive(Debug)]
pub struct FailureTracker {
    policy: CooldownPolicy,
    status: FailureStatus,
    last_failure_at: Option<Instant>,
}

impl FailureTracker {
    pub fn new(policy: CooldownPolicy) -> Self {
        Self {
            policy,
            status: FailureStatus::default(),
            last_failure_at: None,
        }
    }

    pub fn policy(&self) -> CooldownPolicy {
        self.policy
    }

    pub fn status(&self) -> &FailureStatus {
        &self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.status.consecutive_failures
    }

    /// Check the cooldown gate. `Err` carries the remaining wait.
    pub fn permit_attempt(&mut self, now: Instant) -> Result<(), Duration> {
        if self.status.consecutive_failures < self.policy.max_consecutive_failures {
            return Ok(());
        }

        let Some(last) = self.last_failure_at else {
            return Ok(());
        };

        let elapsed = now.saturating_duration_since(last);
        if elapsed < self.policy.cooldown {
            return Err(self.policy.cooldown - elapsed);
        }

        self.status.consecutive_failures = 0;
        Ok(())
    }

    /// Record a failed connect or subscribe attempt.
    pub fn record_failure(&mut self, message: &str, now: Instant) -> FailureKind {
        let kind = FailureKind::classify(message);
        self.status.last_error = Some(message.to_owned());
        self.status.kind = Some(kind);
        self.status.last_attempt = Some(Utc::now());
        self.status.consecutive_failures = self.status.consecutive_failures.saturating_add(1);
        self.last_failure_at = Some(now);
        kind
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn classify_keyword_groups() {
        assert_eq!(
            FailureKind::classify("Connection timeout after 10s"),
            FailureKind::ConnectionFailed
        );
        assert_eq!(
            FailureKind::classify("ECONNREFUSED: network error"),
            FailureKind::ConnectionFailed
        );
        assert_eq!(
            FailureKind::classify("ServerFault: 401 Unauthorized"),
            FailureKind::AuthenticationFailed
        );
        assert_eq!(
            FailureKind::classify("Wrong password"),
            FailureKind::AuthenticationFailed
        );
        assert_eq!(
            FailureKind::classify("Invalid SOAP envelope"),
            FailureKind::InvalidProtocolResponse
        );
        assert_eq!(
            FailureKind::classify("host unreachable"),
            FailureKind::DeviceOffline
        );
        assert_eq!(FailureKind::classify("boom"), FailureKind::Unknown);
    }

    #[test]
    fn classify_prefers_earlier_groups() {
        assert_eq!(
            FailureKind::classify("connect failed: unauthorized"),
            FailureKind::ConnectionFailed
        );
        assert_eq!(
            FailureKind::classify("Login returned malformed XML"),
            FailureKind::AuthenticationFailed
        );
    }

    #[test]
    fn cooldown_refuses_after_limit() {
        let mut tracker = FailureTracker::new(CooldownPolicy::default());
        let start = Instant::now();

        for _ in 0..5 {
            tracker.permit_attempt(start).unwrap();
            tracker.record_failure("401 Unauthorized", start);
        }
        assert_eq!(tracker.consecutive_failures(), 5);

        let wait = tracker
            .permit_attempt(start + Duration::from_secs(60))
            .unwrap_err();
        assert_eq!(wait, Duration::from_secs(29 * 60));
        assert_eq!(tracker.consecutive_failures(), 5);
    }

    #[test]
    fn cooldown_resets_counter_once_elapsed() {
        let policy = CooldownPolicy {
            max_consecutive_failures: 2,
            cooldown: Duration::from_secs(60),
        };
        let mut tracker = FailureTracker::new(policy);
        let start = Instant::now();

        tracker.record_failure("timeout", start);
        tracker.record_failure("timeout", start);
        assert!(tracker.permit_attempt(start).is_err());

        let later = start + Duration::from_secs(61);
        tracker.permit_attempt(later).unwrap();
        assert_eq!(tracker.consecutive_failures(), 0);

        tracker.record_failure("timeout", later);
        assert_eq!(tracker.consecutive_failures(), 1);
    }

    #[test]
    fn record_failure_updates_status() {
        let mut tracker = FailureTracker::new(CooldownPolicy::default());
        let kind = tracker.record_failure("SOAP fault", Instant::now());

        assert_eq!(kind, FailureKind::InvalidProtocolResponse);
        let status = tracker.status();
        assert_eq!(status.last_error.as_deref(), Some("SOAP fault"));
        assert_eq!(status.kind, Some(FailureKind::InvalidProtocolResponse));
        assert!(status.last_attempt.is_some());
    }
}
