//! Intervention gate: a mandatory breathing pause before a blocked
//! destination opens.

pub mod breathing;
pub mod service;
pub mod session;

pub use breathing::{BreathPhase, BreathingPattern};
pub use service::{GateHandle, GateStatus, InterventionGate, TriggerResult};
pub use session::{
    CompletionRatePolicy, GateEvent, GateOutcome, GateState, InterventionSession, SessionParams,
};
