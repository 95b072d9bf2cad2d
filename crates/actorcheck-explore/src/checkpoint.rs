//! Checkpoint save/load for resumable exploration sessions.
//!
//! Saves what a later session needs to carry on without repeating itself:
//! - global event coverage
//! - bugs found so far, with their traces
//! - progress counters
//! - configuration
//!
//! Strategy state (feedback corpora, PCT priorities) is not saved. On resume
//! the strategy is rebuilt from a seed derived from the progress counters,
//! so the resumed session draws schedules the first one never did.

use crate::bugs::BugReport;
use crate::config::ExplorerConfig;
use crate::coverage::EventCoverage;
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use std::fs;
use std::path::Path;

/// Errors from checkpoint operations.
#[derive(Debug, Snafu)]
pub enum CheckpointError {
    #[snafu(display("I/O error"), context(false))]
    Io { source: std::io::Error },

    #[snafu(display("JSON error"), context(false))]
    Json { source: serde_json::Error },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorationCheckpoint {
    pub config: ExplorerConfig,
    pub global_coverage: EventCoverage,
    pub bugs: Vec<BugReport>,
    pub iterations_completed: u64,
    pub total_steps: u64,
}

impl ExplorationCheckpoint {
    /// Seed for the strategy of a session resumed from this checkpoint.
    pub fn resume_seed(&self) -> u64 {
        self.config.seed.wrapping_add(self.iterations_completed)
    }
}

/// Save a checkpoint as pretty-printed JSON.
pub fn save_checkpoint<P: AsRef<Path>>(
    path: P,
    checkpoint: &ExplorationCheckpoint,
) -> Result<(), CheckpointError> {
    let json = serde_json::to_string_pretty(checkpoint)?;
    fs::write(path, json)?;
    Ok(())
}

/// Load a checkpoint from a JSON file.
pub fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<ExplorationCheckpoint, CheckpointError> {
    let json = fs::read_to_string(path)?;
    let checkpoint = serde_json::from_str(&json)?;
    Ok(checkpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyKind;

    fn checkpoint() -> ExplorationCheckpoint {
        let mut coverage = EventCoverage::new();
        coverage.record("server", "Write");
        coverage.record("client0", "Ack");
        ExplorationCheckpoint {
            config: ExplorerConfig {
                iterations: 100,
                seed: 123,
                strategy: StrategyKind::FeedbackPct,
                ..Default::default()
            },
            global_coverage: coverage,
            bugs: vec![BugReport {
                bug_id: 0,
                iteration: 17,
                message: "client0 read 201 after writing 104".to_string(),
                steps: 14,
                strategy: "random".to_string(),
                trace: "(0)\n3\n(1)\n".to_string(),
            }],
            iterations_completed: 40,
            total_steps: 900,
        }
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let checkpoint = checkpoint();
        let json = serde_json::to_string(&checkpoint).unwrap();
        let roundtrip: ExplorationCheckpoint = serde_json::from_str(&json).unwrap();

        assert_eq!(roundtrip.config, checkpoint.config);
        assert_eq!(roundtrip.iterations_completed, 40);
        assert_eq!(roundtrip.global_coverage, checkpoint.global_coverage);
        assert_eq!(roundtrip.bugs, checkpoint.bugs);
    }

    #[test]
    fn test_save_load_checkpoint() {
        let path = std::env::temp_dir().join("actorcheck_test_checkpoint.json");
        let checkpoint = checkpoint();

        save_checkpoint(&path, &checkpoint).unwrap();
        let loaded = load_checkpoint(&path).unwrap();
        assert_eq!(loaded.total_steps, 900);
        assert_eq!(loaded.global_coverage.count(), 2);
        assert_eq!(loaded.resume_seed(), 163);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("actorcheck_no_such_checkpoint.json");
        assert!(matches!(
            load_checkpoint(&path),
            Err(CheckpointError::Io { .. })
        ));
    }

    #[test]
    fn test_load_garbage() {
        let path = std::env::temp_dir().join("actorcheck_garbage_checkpoint.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            load_checkpoint(&path),
            Err(CheckpointError::Json { .. })
        ));
        std::fs::remove_file(&path).ok();
    }
}
