//! Small value objects shared across entities.

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// A confidence score in `[0.0, 1.0]`.
///
/// Used for `SchemaRelationship.confidence` and LLM verdict confidence.
/// DB-declared FKs always carry `Confidence::certain()` (1.0); inferred
/// relationships carry either the LLM's reported confidence or the
/// statistical match rate.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Confidence(f64);

impl Confidence {
    pub fn new(value: f64) -> Result<Self, DomainError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(DomainError::Validation(format!(
                "confidence must be within [0.0, 1.0], got {value}"
            )));
        }
        Ok(Self(value))
    }

    /// Confidence 1.0, used for DB-declared FKs and deterministic
    /// zero-orphan acceptances.
    pub const fn certain() -> Self {
        Self(1.0)
    }

    pub fn as_f64(&self) -> f64 {
        self.0
    }

    pub fn meets(&self, threshold: f64) -> bool {
        self.0 >= threshold
    }
}

/// Progress reported by a running workflow: `{ current, total, phase, message }`.
///
/// Invariant: `current <= total`; values never regress within a phase. The
/// `advance` method enforces both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub current: u64,
    pub total: u64,
    pub phase: String,
    pub message: String,
}

impl Progress {
    pub fn new(total: u64, phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            current: 0,
            total,
            phase: phase.into(),
            message: message.into(),
        }
    }

    /// Advance progress to `current`, rejecting regression within the same
    /// phase and any `current > total` state.
    pub fn advance(&mut self, current: u64, message: impl Into<String>) -> Result<(), DomainError> {
        if current > self.total {
            return Err(DomainError::Validation(format!(
                "progress current {current} exceeds total {}",
                self.total
            )));
        }
        if current < self.current {
            return Err(DomainError::Validation(format!(
                "progress may not regress: {current} < {}",
                self.current
            )));
        }
        self.current = current;
        self.message = message.into();
        Ok(())
    }

    /// Move to a new phase, resetting `current` and `total` for it.
    pub fn enter_phase(&mut self, phase: impl Into<String>, total: u64, message: impl Into<String>) {
        self.phase = phase.into();
        self.total = total;
        self.current = 0;
        self.message = message.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_rejects_out_of_range() {
        assert!(Confidence::new(1.5).is_err());
        assert!(Confidence::new(-0.1).is_err());
    }

    #[test]
    fn confidence_certain_is_one() {
        assert_eq!(Confidence::certain().as_f64(), 1.0);
    }

    #[test]
    fn progress_advance_rejects_overflow_of_total() {
        let mut p = Progress::new(10, "relationships", "start");
        assert!(p.advance(11, "oops").is_err());
    }

    #[test]
    fn progress_advance_rejects_regression() {
        let mut p = Progress::new(10, "relationships", "start");
        p.advance(5, "halfway").unwrap();
        assert!(p.advance(3, "back up").is_err());
    }

    #[test]
    fn progress_advance_accepts_monotonic_steps() {
        let mut p = Progress::new(10, "relationships", "start");
        p.advance(5, "halfway").unwrap();
        p.advance(10, "done").unwrap();
        assert_eq!(p.current, 10);
        assert_eq!(p.message, "done");
    }
}
