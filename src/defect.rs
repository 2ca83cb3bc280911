//! Severity-thresholded handling of format deviations.

use crate::error::{OleError, Result};

/// Severity of a deviation from strict format compliance.
///
/// Real-world producers violate the specification in mostly harmless ways,
/// so each anomaly is classified rather than treated as fatal outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Looks odd, but may well be valid.
    Unsure,
    /// Likely a producer bug; parsing is unaffected.
    Potential,
    /// A specification violation that parsing can survive.
    Incorrect,
    /// Parsing cannot continue.
    Fatal,
}

/// A deviation that was tolerated under the configured strictness.
#[derive(Debug, Clone)]
pub struct Defect {
    pub severity: Severity,
    pub message: String,
}

/// Single escalation point for every anomaly found during parsing.
///
/// Defects at or above the threshold abort with the given error; anything
/// below is logged, recorded, and parsing continues.
#[derive(Debug)]
pub struct DefectSink {
    threshold: Severity,
    recorded: Vec<Defect>,
}

impl DefectSink {
    pub fn new(threshold: Severity) -> Self {
        Self {
            threshold,
            recorded: Vec::new(),
        }
    }

    /// Escalate or record a defect, depending on the threshold.
    pub fn raise(&mut self, severity: Severity, error: OleError) -> Result<()> {
        if severity >= self.threshold {
            return Err(error);
        }
        log::warn!("tolerated {severity:?} defect: {error}");
        self.recorded.push(Defect {
            severity,
            message: error.to_string(),
        });
        Ok(())
    }

    /// Defects tolerated so far, in detection order.
    pub fn recorded(&self) -> &[Defect] {
        &self.recorded
    }
}
