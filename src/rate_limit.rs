//! Submission and resume-upload budgets.
//!
//! Counters live in the persisted [`RateLimitState`] document so
//! budgets survive restarts. Every decision takes the current time as a
//! parameter, which keeps the window arithmetic testable without a
//! mock clock.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::RateLimitState;

const WINDOW_SECS: i64 = 3600;
const UPLOAD_COOLDOWN_SECS: i64 = 60;

/// Gatekeeper over the persisted rate-limit counters.
#[derive(Debug)]
pub struct RateLimiter {
    state: RateLimitState,
}

impl RateLimiter {
    /// Wraps stored counters, overriding the budgets with this run's
    /// configuration. Budgets below one are clamped to one.
    pub fn new(mut state: RateLimitState, jobs_per_hour: u32, resumes_per_minute: u32) -> Self {
        state.jobs_per_hour = jobs_per_hour.max(1);
        state.resumes_per_minute = resumes_per_minute.max(1);
        Self { state }
    }

    /// Counters to hand back to the store after each mutation.
    pub fn state(&self) -> &RateLimitState {
        &self.state
    }

    pub fn jobs_per_hour(&self) -> u32 {
        self.state.jobs_per_hour
    }

    /// Whether another submission fits the hourly budget right now.
    pub fn can_submit(&self, now: DateTime<Utc>) -> bool {
        match self.state.window_started_at {
            None => true,
            Some(started) if window_expired(started, now) => true,
            Some(_) => self.state.jobs_in_window < self.state.jobs_per_hour,
        }
    }

    /// Counts one submission. The window anchors at the first
    /// submission and rolls over once a full hour has passed.
    pub fn record_submission(&mut self, now: DateTime<Utc>) {
        let expired = self
            .state
            .window_started_at
            .is_none_or(|started| window_expired(started, now));
        if expired {
            self.state.window_started_at = Some(now);
            self.state.jobs_in_window = 1;
        } else {
            self.state.jobs_in_window += 1;
        }
    }

    /// Pause after each submission that spreads the hourly budget
    /// evenly instead of bursting it.
    pub fn submission_pause(&self) -> Duration {
        Duration::from_secs_f64(3600.0 / f64::from(self.state.jobs_per_hour))
    }

    /// Whether a resume upload is allowed right now.
    pub fn can_upload(&self, now: DateTime<Utc>) -> bool {
        self.upload_retry_in(now).is_none()
    }

    /// Time remaining until the next upload is allowed, if any.
    pub fn upload_retry_in(&self, now: DateTime<Utc>) -> Option<Duration> {
        let last = self.state.last_resume_upload?;
        let elapsed = (now - last).num_seconds();
        if elapsed >= UPLOAD_COOLDOWN_SECS {
            None
        } else {
            let remaining = UPLOAD_COOLDOWN_SECS - elapsed.max(0);
            Some(Duration::from_secs(remaining as u64))
        }
    }

    pub fn record_upload(&mut self, now: DateTime<Utc>) {
        self.state.last_resume_upload = Some(now);
    }
}

fn window_expired(started: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    (now - started).num_seconds() >= WINDOW_SECS
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn budget_of_three_rejects_the_fourth_submission() {
        let mut limiter = RateLimiter::new(RateLimitState::default(), 3, 1);

        for i in 0..3 {
            let now = at(i * 10);
            assert!(limiter.can_submit(now), "submission {i} should fit");
            limiter.record_submission(now);
        }
        assert!(!limiter.can_submit(at(40)));
    }

    #[test]
    fn window_anchors_at_first_submission_and_rolls_over() {
        let mut limiter = RateLimiter::new(RateLimitState::default(), 2, 1);

        limiter.record_submission(at(0));
        limiter.record_submission(at(100));
        assert!(!limiter.can_submit(at(200)));

        // 3599s after the anchor the window is still in force.
        assert!(!limiter.can_submit(at(3599)));

        // One hour after the anchor the budget resets.
        assert!(limiter.can_submit(at(3600)));
        limiter.record_submission(at(3600));
        assert_eq!(limiter.state().jobs_in_window, 1);
        assert_eq!(limiter.state().window_started_at, Some(at(3600)));
    }

    #[test]
    fn submission_pause_spreads_the_hour() {
        let limiter = RateLimiter::new(RateLimitState::default(), 15, 1);
        assert_eq!(limiter.submission_pause(), Duration::from_secs(240));

        let three = RateLimiter::new(RateLimitState::default(), 3, 1);
        assert_eq!(three.submission_pause(), Duration::from_secs(1200));
    }

    #[test]
    fn upload_cooldown_blocks_for_one_minute() {
        let mut limiter = RateLimiter::new(RateLimitState::default(), 15, 1);
        assert!(limiter.can_upload(at(0)));
        limiter.record_upload(at(0));

        assert!(!limiter.can_upload(at(30)));
        assert_eq!(limiter.upload_retry_in(at(30)), Some(Duration::from_secs(30)));
        assert!(limiter.can_upload(at(60)));
    }

    #[test]
    fn zero_budget_is_clamped_to_one() {
        let limiter = RateLimiter::new(RateLimitState::default(), 0, 0);
        assert_eq!(limiter.jobs_per_hour(), 1);
        assert!(limiter.can_submit(at(0)));
    }
}
