//! Run configuration.

use std::time::Duration;

use hyperreal_remote::GenerationOptions;
use serde::{Deserialize, Serialize};

use crate::plan::DEFAULT_SUBJECT;

/// Default pause between completed shots.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(4);

/// Judge policy: images scoring below `threshold` are regenerated from the
/// same sketch up to `max_retries` times, then accepted regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityGate {
    pub threshold: u8,
    pub max_retries: u32,
}

impl QualityGate {
    pub const DEFAULT_THRESHOLD: u8 = 7;

    pub fn new(threshold: u8, max_retries: u32) -> Self {
        Self {
            threshold: threshold.min(10),
            max_retries,
        }
    }

    pub fn accepts(&self, score: u8) -> bool {
        score >= self.threshold
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD, 0)
    }
}

/// Everything a run needs besides references and the trigger label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub generation: GenerationOptions,
    /// `None` skips the judging phase.
    pub quality_gate: Option<QualityGate>,
    pub cooldown: Duration,
    /// Subject noun used in scene prompts and fallback captions.
    pub subject: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            generation: GenerationOptions::default(),
            quality_gate: Some(QualityGate::default()),
            cooldown: DEFAULT_COOLDOWN,
            subject: DEFAULT_SUBJECT.to_string(),
        }
    }
}

impl RunConfig {
    pub fn with_generation(mut self, generation: GenerationOptions) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_quality_gate(mut self, gate: Option<QualityGate>) -> Self {
        self.quality_gate = gate;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.cooldown, Duration::from_secs(4));
        assert_eq!(config.quality_gate, Some(QualityGate::new(7, 0)));
        assert_eq!(config.subject, "woman");
    }

    #[test]
    fn test_gate_threshold_is_inclusive_and_clamped() {
        let gate = QualityGate::new(12, 1);
        assert_eq!(gate.threshold, 10);
        assert!(gate.accepts(10));
        assert!(!QualityGate::new(7, 0).accepts(6));
        assert!(QualityGate::new(7, 0).accepts(7));
    }
}
