//! Breathing guidance shown while an intervention runs.
//!
//! The phase is a pure function of elapsed time. It is display-only and never
//! gates completion.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BreathingPattern {
    /// Inhale 4s, hold 7s, exhale 8s.
    #[default]
    #[serde(rename = "4-7-8")]
    FourSevenEight,
    /// Inhale, hold, exhale, hold; 4s each.
    #[serde(rename = "box", alias = "4-4-4-4")]
    Box,
    /// Inhale 4s, exhale 4s.
    #[serde(rename = "simple")]
    Simple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreathPhase {
    Inhale,
    Hold,
    Exhale,
}

impl BreathPhase {
    pub fn instruction(self) -> &'static str {
        match self {
            BreathPhase::Inhale => "Breathe In",
            BreathPhase::Hold => "Hold",
            BreathPhase::Exhale => "Breathe Out",
        }
    }
}

const FOUR: Duration = Duration::from_secs(4);

static FOUR_SEVEN_EIGHT: [(BreathPhase, Duration); 3] = [
    (BreathPhase::Inhale, FOUR),
    (BreathPhase::Hold, Duration::from_secs(7)),
    (BreathPhase::Exhale, Duration::from_secs(8)),
];
static BOX: [(BreathPhase, Duration); 4] = [
    (BreathPhase::Inhale, FOUR),
    (BreathPhase::Hold, FOUR),
    (BreathPhase::Exhale, FOUR),
    (BreathPhase::Hold, FOUR),
];
static SIMPLE: [(BreathPhase, Duration); 2] =
    [(BreathPhase::Inhale, FOUR), (BreathPhase::Exhale, FOUR)];

impl BreathingPattern {
    /// One cycle of the pattern as (phase, length) pairs.
    pub fn phases(self) -> &'static [(BreathPhase, Duration)] {
        match self {
            BreathingPattern::FourSevenEight => &FOUR_SEVEN_EIGHT,
            BreathingPattern::Box => &BOX,
            BreathingPattern::Simple => &SIMPLE,
        }
    }

    pub fn cycle_length(self) -> Duration {
        self.phases().iter().map(|(_, d)| *d).sum()
    }

    /// Phase active at `elapsed` since the session started.
    pub fn phase_at(self, elapsed: Duration) -> BreathPhase {
        let cycle_ms = self.cycle_length().as_millis();
        let mut offset = elapsed.as_millis() % cycle_ms;
        for (phase, len) in self.phases() {
            let len_ms = len.as_millis();
            if offset < len_ms {
                return *phase;
            }
            offset -= len_ms;
        }
        BreathPhase::Inhale
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BreathingPattern::FourSevenEight => "4-7-8",
            BreathingPattern::Box => "box",
            BreathingPattern::Simple => "simple",
        }
    }
}

impl fmt::Display for BreathingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BreathingPattern {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "4-7-8" => Ok(BreathingPattern::FourSevenEight),
            "box" | "4-4-4-4" => Ok(BreathingPattern::Box),
            "simple" => Ok(BreathingPattern::Simple),
            other => Err(ValidationError::InvalidValue {
                field: "breathingPattern".into(),
                message: format!("unknown pattern '{other}'"),
            }),
        }
    }
}
