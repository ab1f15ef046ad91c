//! Intervention session state machine.
//!
//! Like the timer engine it has no internal threads: the owner feeds it the
//! elapsed time via [`InterventionSession::advance`] and gets back the events
//! that became true since the previous call.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> (Completed | Skipped)
//!            \-> Abandoned
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::breathing::{BreathPhase, BreathingPattern};
use crate::error::GateError;
use crate::storage::{InterventionRecord, Settings};

/// An externally reported completion may lead the local countdown by up to
/// one tick.
const FINISH_TOLERANCE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateState {
    Idle,
    Running,
    Completed,
    Skipped,
    /// Torn down before reaching a terminal outcome. Nothing is recorded.
    Abandoned,
}

impl GateState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GateState::Completed | GateState::Skipped | GateState::Abandoned
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateOutcome {
    Completed,
    Skipped,
    Abandoned,
}

/// How a skipped session's completion rate is computed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CompletionRatePolicy {
    /// elapsed / duration
    #[default]
    ElapsedRatio,
    /// The same rate for every skip regardless of elapsed time.
    Fixed(f64),
}

impl CompletionRatePolicy {
    fn rate(self, elapsed: Duration, duration: Duration) -> f64 {
        match self {
            CompletionRatePolicy::Fixed(rate) => rate.clamp(0.0, 1.0),
            CompletionRatePolicy::ElapsedRatio => {
                if duration.is_zero() {
                    return 1.0;
                }
                (elapsed.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0)
            }
        }
    }
}

/// Parameters a session runs with, captured at trigger time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionParams {
    pub duration: Duration,
    pub allow_skip: bool,
    pub skip_delay: Duration,
    pub pattern: BreathingPattern,
    pub rate_policy: CompletionRatePolicy,
}

impl SessionParams {
    pub fn from_settings(settings: &Settings, rate_policy: CompletionRatePolicy) -> Self {
        Self {
            duration: Duration::from_secs(settings.intervention_duration_seconds),
            allow_skip: settings.allow_skip,
            skip_delay: Duration::from_secs(settings.skip_delay_seconds),
            pattern: settings.breathing_pattern,
            rate_policy,
        }
    }
}

impl Default for SessionParams {
    fn default() -> Self {
        Self::from_settings(&Settings::default(), CompletionRatePolicy::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GateEvent {
    PhaseChanged { phase: BreathPhase },
    SkipAvailable,
    Tick { remaining_secs: u64 },
    Resolved { outcome: GateOutcome },
}

#[derive(Debug, Clone)]
pub struct InterventionSession {
    site_or_app_id: String,
    display_name: String,
    params: SessionParams,
    state: GateState,
    started_at: Option<DateTime<Utc>>,
    elapsed: Duration,
    phase: Option<BreathPhase>,
    skip_announced: bool,
    last_remaining_secs: Option<u64>,
}

impl InterventionSession {
    pub fn new(
        site_or_app_id: impl Into<String>,
        display_name: impl Into<String>,
        params: SessionParams,
    ) -> Self {
        Self {
            site_or_app_id: site_or_app_id.into(),
            display_name: display_name.into(),
            params,
            state: GateState::Idle,
            started_at: None,
            elapsed: Duration::ZERO,
            phase: None,
            skip_announced: false,
            last_remaining_secs: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn site_or_app_id(&self) -> &str {
        &self.site_or_app_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn phase(&self) -> Option<BreathPhase> {
        self.phase
    }

    pub fn remaining(&self) -> Duration {
        self.params.duration.saturating_sub(self.elapsed)
    }

    /// Whole seconds left, rounded up so the display never shows 0 while
    /// still running.
    pub fn remaining_secs(&self) -> u64 {
        let remaining = self.remaining();
        let whole = remaining.as_secs();
        if remaining.subsec_nanos() > 0 {
            whole + 1
        } else {
            whole
        }
    }

    pub fn skip_available(&self) -> bool {
        self.state == GateState::Running
            && self.params.allow_skip
            && self.elapsed >= self.params.skip_delay
    }

    pub fn outcome(&self) -> Option<GateOutcome> {
        match self.state {
            GateState::Completed => Some(GateOutcome::Completed),
            GateState::Skipped => Some(GateOutcome::Skipped),
            GateState::Abandoned => Some(GateOutcome::Abandoned),
            GateState::Idle | GateState::Running => None,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Enter `Running`. No-op unless `Idle`.
    pub fn start(&mut self, now: DateTime<Utc>) -> Vec<GateEvent> {
        if self.state != GateState::Idle {
            return Vec::new();
        }
        self.state = GateState::Running;
        self.started_at = Some(now);
        self.elapsed = Duration::ZERO;
        let mut events = self.collect_events();
        if self.params.duration.is_zero() {
            events.extend(self.complete());
        }
        events
    }

    /// Move the session to `elapsed` since start. Time never runs backwards:
    /// an `elapsed` smaller than the current one is ignored.
    pub fn advance(&mut self, elapsed: Duration) -> Vec<GateEvent> {
        if self.state != GateState::Running || elapsed < self.elapsed {
            return Vec::new();
        }
        self.elapsed = elapsed;
        let mut events = self.collect_events();
        if self.elapsed >= self.params.duration {
            events.extend(self.complete());
        }
        events
    }

    /// Skip the rest of the session.
    ///
    /// # Errors
    /// `SkipDisabled` when skipping is off, `SkipUnavailable` before the skip
    /// delay has elapsed (the session keeps running), `NotRunning` otherwise.
    pub fn skip(&mut self) -> Result<GateEvent, GateError> {
        if self.state != GateState::Running {
            return Err(GateError::NotRunning);
        }
        if !self.params.allow_skip {
            return Err(GateError::SkipDisabled);
        }
        if self.elapsed < self.params.skip_delay {
            let left = self.params.skip_delay - self.elapsed;
            return Err(GateError::SkipUnavailable {
                remaining_secs: ceil_secs(left),
            });
        }
        self.state = GateState::Skipped;
        Ok(GateEvent::Resolved {
            outcome: GateOutcome::Skipped,
        })
    }

    /// Completion reported by the display side.
    ///
    /// # Errors
    /// `StillRunning` if more than one tick of the countdown remains.
    pub fn finish(&mut self) -> Result<GateEvent, GateError> {
        if self.state != GateState::Running {
            return Err(GateError::NotRunning);
        }
        if self.elapsed + FINISH_TOLERANCE < self.params.duration {
            return Err(GateError::StillRunning {
                remaining_secs: self.remaining_secs(),
            });
        }
        self.elapsed = self.elapsed.max(self.params.duration);
        self.complete()
            .into_iter()
            .last()
            .ok_or(GateError::NotRunning)
    }

    /// Tear down without an outcome. No-op once terminal.
    pub fn abandon(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = GateState::Abandoned;
        true
    }

    /// The record to persist for a resolved session. `None` unless the
    /// session is `Completed` or `Skipped`.
    pub fn to_record(&self) -> Option<InterventionRecord> {
        let started_at = self.started_at?;
        let (duration_seconds, was_skipped, completion_rate) = match self.state {
            GateState::Completed => (self.params.duration.as_secs(), false, 1.0),
            GateState::Skipped => (
                self.elapsed.as_secs(),
                true,
                self.params
                    .rate_policy
                    .rate(self.elapsed, self.params.duration),
            ),
            _ => return None,
        };
        Some(InterventionRecord {
            id: InterventionRecord::make_id(started_at, &self.site_or_app_id),
            site_or_app_id: self.site_or_app_id.clone(),
            display_name: self.display_name.clone(),
            timestamp: started_at,
            duration_seconds,
            was_skipped,
            completion_rate,
        })
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn complete(&mut self) -> Vec<GateEvent> {
        self.state = GateState::Completed;
        vec![GateEvent::Resolved {
            outcome: GateOutcome::Completed,
        }]
    }

    fn collect_events(&mut self) -> Vec<GateEvent> {
        let mut events = Vec::new();

        let phase = self.params.pattern.phase_at(self.elapsed);
        if self.phase != Some(phase) {
            self.phase = Some(phase);
            events.push(GateEvent::PhaseChanged { phase });
        }

        if !self.skip_announced && self.skip_available() {
            self.skip_announced = true;
            events.push(GateEvent::SkipAvailable);
        }

        let remaining_secs = self.remaining_secs();
        if self.last_remaining_secs != Some(remaining_secs) {
            self.last_remaining_secs = Some(remaining_secs);
            events.push(GateEvent::Tick { remaining_secs });
        }

        events
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SessionParams {
        SessionParams::default()
    }

    fn running(params: SessionParams) -> InterventionSession {
        let mut s = InterventionSession::new("instagram.com", "Instagram", params);
        s.start(Utc::now());
        s
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn start_emits_initial_phase_and_tick() {
        let mut s = InterventionSession::new("a", "A", params());
        let events = s.start(Utc::now());
        assert_eq!(s.state(), GateState::Running);
        assert_eq!(
            events,
            vec![
                GateEvent::PhaseChanged {
                    phase: BreathPhase::Inhale
                },
                GateEvent::Tick { remaining_secs: 60 },
            ]
        );
        assert!(s.start(Utc::now()).is_empty());
    }

    #[test]
    fn countdown_reaching_zero_completes_without_input() {
        let mut s = running(params());
        s.advance(secs(30));
        let events = s.advance(secs(60));
        assert_eq!(
            events.last(),
            Some(&GateEvent::Resolved {
                outcome: GateOutcome::Completed
            })
        );
        let record = s.to_record().unwrap();
        assert!(!record.was_skipped);
        assert_eq!(record.completion_rate, 1.0);
        assert_eq!(record.duration_seconds, 60);
        assert!(record.id.ends_with("-instagram.com"));
    }

    #[test]
    fn skip_before_delay_is_rejected_and_session_keeps_running() {
        let mut s = running(params());
        s.advance(secs(3));
        assert_eq!(
            s.skip(),
            Err(GateError::SkipUnavailable { remaining_secs: 7 })
        );
        assert_eq!(s.state(), GateState::Running);
        assert!(s.to_record().is_none());
    }

    #[test]
    fn skip_after_delay_records_elapsed_ratio() {
        let mut s = running(params());
        let events = s.advance(secs(15));
        assert!(events.contains(&GateEvent::SkipAvailable));
        s.skip().unwrap();
        let record = s.to_record().unwrap();
        assert!(record.was_skipped);
        assert_eq!(record.duration_seconds, 15);
        assert!((record.completion_rate - 0.25).abs() < 1e-9);
    }

    #[test]
    fn fixed_policy_records_constant_rate() {
        let mut p = params();
        p.rate_policy = CompletionRatePolicy::Fixed(0.17);
        let mut s = running(p);
        s.advance(secs(45));
        s.skip().unwrap();
        assert!((s.to_record().unwrap().completion_rate - 0.17).abs() < 1e-9);
    }

    #[test]
    fn skip_disabled_never_available() {
        let mut p = params();
        p.allow_skip = false;
        let mut s = running(p);
        let events = s.advance(secs(59));
        assert!(!events.contains(&GateEvent::SkipAvailable));
        assert_eq!(s.skip(), Err(GateError::SkipDisabled));
        s.advance(secs(60));
        assert_eq!(s.state(), GateState::Completed);
    }

    #[test]
    fn skip_available_announced_once() {
        let mut s = running(params());
        let announced = (1..=20)
            .flat_map(|t| s.advance(secs(t)))
            .filter(|e| *e == GateEvent::SkipAvailable)
            .count();
        assert_eq!(announced, 1);
    }

    #[test]
    fn zero_duration_completes_at_start() {
        let mut p = params();
        p.duration = Duration::ZERO;
        let mut s = InterventionSession::new("a", "A", p);
        let events = s.start(Utc::now());
        assert_eq!(s.state(), GateState::Completed);
        assert!(events.contains(&GateEvent::Resolved {
            outcome: GateOutcome::Completed
        }));
        assert_eq!(s.to_record().unwrap().completion_rate, 1.0);
    }

    #[test]
    fn finish_accepts_within_one_tick() {
        let mut s = running(params());
        s.advance(secs(30));
        assert!(matches!(s.finish(), Err(GateError::StillRunning { .. })));
        s.advance(Duration::from_millis(59_200));
        assert_eq!(
            s.finish(),
            Ok(GateEvent::Resolved {
                outcome: GateOutcome::Completed
            })
        );
        assert_eq!(s.to_record().unwrap().duration_seconds, 60);
    }

    #[test]
    fn terminal_session_ignores_further_input() {
        let mut s = running(params());
        s.advance(secs(12));
        s.skip().unwrap();
        assert!(s.advance(secs(60)).is_empty());
        assert_eq!(s.skip(), Err(GateError::NotRunning));
        assert!(!s.abandon());
        assert_eq!(s.state(), GateState::Skipped);
    }

    #[test]
    fn abandoned_session_writes_no_record() {
        let mut s = running(params());
        s.advance(secs(20));
        assert!(s.abandon());
        assert_eq!(s.outcome(), Some(GateOutcome::Abandoned));
        assert!(s.to_record().is_none());
    }

    #[test]
    fn time_does_not_run_backwards() {
        let mut s = running(params());
        s.advance(secs(20));
        assert!(s.advance(secs(10)).is_empty());
        assert_eq!(s.elapsed(), secs(20));
    }

    #[test]
    fn ticks_once_per_whole_second() {
        let mut s = running(params());
        let ticks = (1..=50)
            .flat_map(|i| s.advance(Duration::from_millis(i * 100)))
            .filter(|e| matches!(e, GateEvent::Tick { .. }))
            .count();
        // 0.1s..5.0s crosses 59, 58, 57, 56, 55
        assert_eq!(ticks, 5);
    }
}
