//! Classifier & Streak State (spec §4.4): turns a probe's raw outcome into
//! a persisted [`Status`], tracking a per-service consecutive-hard-failure
//! streak.
//!
//! [`classify`] is a pure function: given the same `CheckResult` and streak
//! count it always returns the same `(Status, new_streak)` pair, with no
//! hidden state and no I/O (spec §8's round-trip law). [`StreakTable`] is the
//! only stateful piece, and it is owned exclusively by the
//! [`scheduler`](crate::scheduler) — it is mutated once per cycle, after all
//! of that cycle's results have been joined, never concurrently.

use std::collections::HashMap;

use crate::records::{CheckResult, RawStatus, Status};

/// Per-service consecutive-hard-failure counters.
///
/// Only `Ok` clears the streak. `Degraded` persists as `Warn` but leaves the
/// streak untouched, and only `HardFailure` increments it.
#[derive(Debug, Default)]
pub struct StreakTable {
    streaks: HashMap<String, u32>,
}

impl StreakTable {
    /// Creates an empty streak table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current streak for `service_id`, or 0 if never observed.
    pub fn get(&self, service_id: &str) -> u32 {
        self.streaks.get(service_id).copied().unwrap_or(0)
    }

    /// Classifies `result` for `service_id`, updating and returning the new
    /// streak alongside the persisted [`Status`].
    pub fn classify(&mut self, service_id: &str, result: &CheckResult) -> Status {
        let before = self.get(service_id);
        let (status, after) = classify(result, before);
        self.streaks.insert(service_id.to_string(), after);
        status
    }
}

/// Pure classification: maps a probe's raw outcome and the prior streak
/// count to a persisted [`Status`] and the streak count to carry forward.
///
/// - `Ok` resets the streak to 0.
/// - `Degraded` persists as [`Status::Warn`] but leaves the streak
///   unchanged: a transient degraded observation does not extinguish a
///   pending failure streak (spec §4.4 rule 2).
/// - `HardFailure` increments the streak. The first hard failure in a row
///   persists as `Warn`; the second and any further consecutive hard
///   failure persists as `Crit` (spec §4.4's two-strike rule).
/// - `result.bypass_two_strike` short-circuits the streak entirely: a
///   `HardFailure` with this flag set always persists as `Crit` regardless
///   of `streak_before` (used by the already-expired-certificate case in
///   the `ssl_cert` check, spec §4.3/§9).
pub fn classify(result: &CheckResult, streak_before: u32) -> (Status, u32) {
    match result.raw_status {
        RawStatus::Ok => (Status::Ok, 0),
        RawStatus::Degraded => (Status::Warn, streak_before),
        RawStatus::HardFailure => {
            if result.bypass_two_strike {
                return (Status::Crit, streak_before.max(1));
            }
            let streak = streak_before.saturating_add(1);
            let status = if streak >= crate::CRIT_STREAK_THRESHOLD {
                Status::Crit
            } else {
                Status::Warn
            };
            (status, streak)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_resets_streak() {
        let (status, streak) = classify(&CheckResult::ok(10), 3);
        assert_eq!(status, Status::Ok);
        assert_eq!(streak, 0);
    }

    #[test]
    fn degraded_persists_as_warn_and_leaves_streak_unchanged() {
        let (status, streak) = classify(&CheckResult::degraded(10), 1);
        assert_eq!(status, Status::Warn);
        assert_eq!(streak, 1);
    }

    #[test]
    fn first_hard_failure_is_warn() {
        let (status, streak) = classify(&CheckResult::hard_failure(), 0);
        assert_eq!(status, Status::Warn);
        assert_eq!(streak, 1);
    }

    #[test]
    fn second_consecutive_hard_failure_is_crit() {
        let (status, streak) = classify(&CheckResult::hard_failure(), 1);
        assert_eq!(status, Status::Crit);
        assert_eq!(streak, 2);
    }

    #[test]
    fn streak_keeps_climbing_while_still_crit() {
        let (status, streak) = classify(&CheckResult::hard_failure(), 5);
        assert_eq!(status, Status::Crit);
        assert_eq!(streak, 6);
    }

    #[test]
    fn bypass_two_strike_is_immediate_crit_on_first_failure() {
        let result = CheckResult::hard_failure().bypassing_two_strike();
        let (status, streak) = classify(&result, 0);
        assert_eq!(status, Status::Crit);
        assert_eq!(streak, 1);
    }

    #[test]
    fn streak_table_tracks_per_service() {
        let mut table = StreakTable::new();
        assert_eq!(table.classify("a", &CheckResult::hard_failure()), Status::Warn);
        assert_eq!(table.classify("a", &CheckResult::hard_failure()), Status::Crit);
        assert_eq!(table.classify("b", &CheckResult::hard_failure()), Status::Warn);
        assert_eq!(table.classify("a", &CheckResult::ok(5)), Status::Ok);
        assert_eq!(table.get("a"), 0);
        assert_eq!(table.get("b"), 1);
    }
}
