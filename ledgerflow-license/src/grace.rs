//! Offline grace period state machine.
//!
//! Tracks elapsed offline time against a tier-specific allowance:
//!
//! - `Online` — clock stopped (or offline with ample allowance left)
//! - `Warning` — ≤ 2 days of allowance remaining
//! - `Critical` — < 24 hours remaining
//! - `Expired` — allowance fully consumed, or the authority explicitly
//!   rejected the license
//!
//! The clock advances only while the most recent successful validation was
//! served from the offline cache. A successful online validation resets it
//! to zero; a server rejection forces `Expired` regardless of elapsed time.
//! Once `Expired`, offline validations are no longer honored until a fresh
//! online success.
//!
//! A level-change event is emitted exactly once per transition, not per
//! tick, so subscribers only see actual changes.

use chrono::{DateTime, Utc};
use ledgerflow_types::LicenseTier;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Capacity of the grace event channel.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Warning level of the grace period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraceLevel {
    /// Clock stopped after an online success, or plenty of allowance left.
    Online,
    /// Two days or less of allowance remaining.
    Warning,
    /// Less than 24 hours remaining.
    Critical,
    /// Allowance consumed or license rejected by the authority.
    Expired,
}

/// Emitted on every grace level transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraceEvent {
    /// Level before the transition.
    pub from: GraceLevel,
    /// Level after the transition.
    pub to: GraceLevel,
    /// Offline allowance remaining at transition time, in seconds.
    pub remaining_secs: i64,
}

/// Thresholds for the warning levels, expressed as remaining allowance.
///
/// For tiers whose allowance is shorter than the absolute defaults, the
/// thresholds are clamped to half / a quarter of the allowance so all four
/// levels stay reachable.
#[derive(Debug, Clone)]
pub struct GraceConfig {
    /// Enter `Warning` when remaining allowance drops to this many seconds.
    pub warning_remaining_secs: i64,
    /// Enter `Critical` when remaining allowance drops below this.
    pub critical_remaining_secs: i64,
}

impl Default for GraceConfig {
    fn default() -> Self {
        Self {
            warning_remaining_secs: 2 * 24 * 60 * 60,
            critical_remaining_secs: 24 * 60 * 60,
        }
    }
}

/// Tracks one license's offline grace state.
#[derive(Debug)]
pub struct GracePeriodManager {
    allowance_secs: i64,
    config: GraceConfig,
    last_online_at: Option<DateTime<Utc>>,
    offline_since: Option<DateTime<Utc>>,
    level: GraceLevel,
    events: broadcast::Sender<GraceEvent>,
}

impl GracePeriodManager {
    /// Creates a manager with the allowance of the given tier and default
    /// thresholds.
    #[must_use]
    pub fn new(tier: LicenseTier) -> Self {
        Self::with_config(tier.offline_allowance_secs(), GraceConfig::default())
    }

    /// Creates a manager with an explicit allowance and thresholds.
    #[must_use]
    pub fn with_config(allowance_secs: i64, config: GraceConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            allowance_secs,
            config,
            last_online_at: None,
            offline_since: None,
            level: GraceLevel::Online,
            events,
        }
    }

    /// Subscribes to level-change events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GraceEvent> {
        self.events.subscribe()
    }

    /// Current warning level.
    #[must_use]
    pub fn level(&self) -> GraceLevel {
        self.level
    }

    /// The tier allowance in seconds.
    #[must_use]
    pub fn allowance_secs(&self) -> i64 {
        self.allowance_secs
    }

    /// Timestamp of the last successful online validation.
    #[must_use]
    pub fn last_online_at(&self) -> Option<DateTime<Utc>> {
        self.last_online_at
    }

    /// When the current offline stretch began, if the clock is running.
    #[must_use]
    pub fn offline_since(&self) -> Option<DateTime<Utc>> {
        self.offline_since
    }

    /// Seconds of allowance remaining at `now`.
    #[must_use]
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        if self.level == GraceLevel::Expired {
            return 0;
        }
        match self.offline_since {
            None => self.allowance_secs,
            Some(since) => (self.allowance_secs - (now - since).num_seconds()).max(0),
        }
    }

    /// Updates the allowance when the validated tier changes; the level is
    /// recomputed against the new allowance.
    pub fn set_allowance_secs(&mut self, allowance_secs: i64, now: DateTime<Utc>) {
        if self.allowance_secs != allowance_secs {
            debug!(allowance_secs, "grace allowance changed");
            self.allowance_secs = allowance_secs;
            self.tick(now);
        }
    }

    /// Records a successful online validation: the clock stops and resets.
    pub fn record_online_success(&mut self, now: DateTime<Utc>) {
        self.last_online_at = Some(now);
        self.offline_since = None;
        self.transition(GraceLevel::Online, now);
    }

    /// Anchors the clock from a persisted last-online timestamp after a
    /// restart, so the offline stretch resumes instead of restarting from
    /// zero in every new process. No effect once this process has recorded
    /// a validation of its own.
    pub fn restore_last_online(&mut self, last_online_at: DateTime<Utc>, now: DateTime<Utc>) {
        if self.last_online_at.is_some() || self.offline_since.is_some() {
            return;
        }
        debug!(%last_online_at, "grace clock restored from persisted validation");
        self.last_online_at = Some(last_online_at);
        self.offline_since = Some(last_online_at);
        self.tick(now);
    }

    /// Records a successful cached-offline validation. Starts the clock on
    /// the first offline validation and keeps it running afterwards.
    ///
    /// Returns false if the grace period is already expired, in which case
    /// the validation must not be honored.
    pub fn record_offline_success(&mut self, now: DateTime<Utc>) -> bool {
        if self.level == GraceLevel::Expired {
            warn!("offline validation ignored, grace period already expired");
            return false;
        }
        if self.offline_since.is_none() {
            self.offline_since = Some(now);
        }
        self.tick(now);
        self.level != GraceLevel::Expired
    }

    /// Records an explicit server rejection: `Expired` immediately,
    /// regardless of elapsed time.
    pub fn record_server_rejection(&mut self, now: DateTime<Utc>) {
        self.transition(GraceLevel::Expired, now);
    }

    /// Advances the state machine to `now`. Idempotent between level
    /// changes; emits an event only when the level actually moves.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        // Expired is sticky until a fresh online success.
        if self.level == GraceLevel::Expired {
            return;
        }
        let Some(since) = self.offline_since else {
            return;
        };

        let elapsed = (now - since).num_seconds();
        let remaining = self.allowance_secs - elapsed;
        let warning_at = self
            .config
            .warning_remaining_secs
            .min(self.allowance_secs / 2);
        let critical_at = self
            .config
            .critical_remaining_secs
            .min(self.allowance_secs / 4);

        let level = if remaining <= 0 {
            GraceLevel::Expired
        } else if remaining < critical_at {
            GraceLevel::Critical
        } else if remaining <= warning_at {
            GraceLevel::Warning
        } else {
            GraceLevel::Online
        };
        self.transition(level, now);
    }

    fn transition(&mut self, to: GraceLevel, now: DateTime<Utc>) {
        if self.level == to {
            return;
        }
        let from = self.level;
        self.level = to;
        let remaining = self.remaining_secs(now);
        info!(?from, ?to, remaining_secs = remaining, "grace level changed");
        // Nobody listening is fine.
        let _ = self.events.send(GraceEvent {
            from,
            to,
            remaining_secs: remaining,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn manager() -> GracePeriodManager {
        GracePeriodManager::new(LicenseTier::Standard)
    }

    #[test]
    fn starts_online_with_full_allowance() {
        let m = manager();
        let now = Utc::now();
        assert_eq!(m.level(), GraceLevel::Online);
        assert_eq!(m.remaining_secs(now), LicenseTier::Standard.offline_allowance_secs());
    }

    #[test]
    fn online_success_stops_the_clock() {
        let mut m = manager();
        let t0 = Utc::now();
        m.record_offline_success(t0);
        m.record_online_success(t0 + Duration::hours(1));
        assert_eq!(m.level(), GraceLevel::Online);
        assert!(m.offline_since().is_none());
        assert_eq!(
            m.remaining_secs(t0 + Duration::days(10)),
            LicenseTier::Standard.offline_allowance_secs()
        );
    }

    #[test]
    fn warning_at_two_days_remaining() {
        let mut m = manager();
        let t0 = Utc::now();
        m.record_offline_success(t0);
        // 7d allowance: 5 days elapsed leaves exactly 2 days.
        m.tick(t0 + Duration::days(5));
        assert_eq!(m.level(), GraceLevel::Warning);
    }

    #[test]
    fn critical_below_one_day_remaining() {
        let mut m = manager();
        let t0 = Utc::now();
        m.record_offline_success(t0);
        m.tick(t0 + Duration::days(6) + Duration::hours(1));
        assert_eq!(m.level(), GraceLevel::Critical);
    }

    #[test]
    fn expired_exactly_at_allowance() {
        let mut m = manager();
        let t0 = Utc::now();
        m.record_offline_success(t0);
        let allowance = Duration::seconds(LicenseTier::Standard.offline_allowance_secs());

        m.tick(t0 + allowance - Duration::seconds(1));
        assert_ne!(m.level(), GraceLevel::Expired);

        m.tick(t0 + allowance);
        assert_eq!(m.level(), GraceLevel::Expired);
        assert_eq!(m.remaining_secs(t0 + allowance), 0);
    }

    #[test]
    fn server_rejection_forces_expired_immediately() {
        let mut m = manager();
        let t0 = Utc::now();
        m.record_offline_success(t0);
        m.record_server_rejection(t0 + Duration::minutes(5));
        assert_eq!(m.level(), GraceLevel::Expired);
    }

    #[test]
    fn expired_is_sticky_for_offline_validations() {
        let mut m = manager();
        let t0 = Utc::now();
        m.record_server_rejection(t0);
        assert!(!m.record_offline_success(t0 + Duration::seconds(1)));
        assert_eq!(m.level(), GraceLevel::Expired);
    }

    #[test]
    fn online_success_clears_expired() {
        let mut m = manager();
        let t0 = Utc::now();
        m.record_server_rejection(t0);
        m.record_online_success(t0 + Duration::hours(1));
        assert_eq!(m.level(), GraceLevel::Online);
        assert!(m.record_offline_success(t0 + Duration::hours(2)));
    }

    #[test]
    fn events_emitted_once_per_transition() {
        let mut m = manager();
        let mut rx = m.subscribe();
        let t0 = Utc::now();
        m.record_offline_success(t0);

        // Repeated ticks inside the warning window: one event only.
        m.tick(t0 + Duration::days(5));
        m.tick(t0 + Duration::days(5) + Duration::hours(1));
        m.tick(t0 + Duration::days(5) + Duration::hours(2));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.from, GraceLevel::Online);
        assert_eq!(event.to, GraceLevel::Warning);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn short_trial_allowance_clamps_thresholds() {
        // Trial allowance (24h) is shorter than the default warning
        // threshold (48h): warning must not fire immediately.
        let mut m = GracePeriodManager::new(LicenseTier::Trial);
        let t0 = Utc::now();
        m.record_offline_success(t0);
        assert_eq!(m.level(), GraceLevel::Online);

        // Half the allowance left -> warning.
        m.tick(t0 + Duration::hours(12));
        assert_eq!(m.level(), GraceLevel::Warning);

        // Under a quarter left -> critical.
        m.tick(t0 + Duration::hours(19));
        assert_eq!(m.level(), GraceLevel::Critical);
    }

    #[test]
    fn restored_clock_resumes_elapsed_offline_time() {
        let mut m = manager();
        let t0 = Utc::now();
        // 7d allowance, restored 5 days after the persisted online success.
        m.restore_last_online(t0, t0 + Duration::days(5));
        assert_eq!(m.level(), GraceLevel::Warning);
        assert_eq!(m.remaining_secs(t0 + Duration::days(5)), 2 * 24 * 3600);
    }

    #[test]
    fn restored_clock_past_allowance_is_expired() {
        let mut m = manager();
        let t0 = Utc::now();
        m.restore_last_online(t0, t0 + Duration::days(10));
        assert_eq!(m.level(), GraceLevel::Expired);
        assert!(!m.record_offline_success(t0 + Duration::days(10)));
    }

    #[test]
    fn restore_does_not_override_live_state() {
        let mut m = manager();
        let t0 = Utc::now();
        m.record_online_success(t0);
        // A stale persisted timestamp must not restart a clock this
        // process already reset.
        m.restore_last_online(t0 - Duration::days(30), t0 + Duration::hours(1));
        assert_eq!(m.level(), GraceLevel::Online);
        assert!(m.offline_since().is_none());
    }

    #[test]
    fn remaining_decreases_while_offline() {
        let mut m = manager();
        let t0 = Utc::now();
        m.record_offline_success(t0);
        let allowance = LicenseTier::Standard.offline_allowance_secs();
        assert_eq!(m.remaining_secs(t0 + Duration::hours(3)), allowance - 3 * 3600);
    }
}
