//! Exploration session configuration and strategy selection.

use actorcheck_pattern::{NfaMatcher, ParseError};
use actorcheck_sched::{
    ChangePointSampling, FeedbackMode, FeedbackSignal, FeedbackStrategy, PatternGuidedStrategy,
    PctScheduleGenerator, PctStrategy, PctcpScheduleGenerator, PctcpStrategy,
    RandomScheduleGenerator, RandomStrategy, SchedulingStrategy,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors found before any iteration runs.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("iterations must be at least 1")]
    NoIterations,

    #[error("max-steps {unfair},{fair} requires the fair bound to be at least the unfair bound")]
    StepBounds { unfair: usize, fair: usize },

    #[error("strategy '{0}' needs at least one switch point")]
    NoSwitchPoints(StrategyKind),

    #[error("strategy '{0}' needs an event pattern")]
    MissingPattern(StrategyKind),

    #[error("invalid event pattern: {0}")]
    Pattern(#[from] ParseError),

    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which scheduling strategy a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StrategyKind {
    #[default]
    #[serde(rename = "random")]
    Random,
    #[serde(rename = "pct")]
    Pct,
    #[serde(rename = "pctcp")]
    Pctcp,
    #[serde(rename = "feedback")]
    Feedback,
    #[serde(rename = "2stagefeedback")]
    TwoStageFeedback,
    #[serde(rename = "feedbackpct")]
    FeedbackPct,
    #[serde(rename = "2stagefeedbackpct")]
    TwoStageFeedbackPct,
    #[serde(rename = "feedbackpctcp")]
    FeedbackPctcp,
    #[serde(rename = "pattern")]
    Pattern,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 9] = [
        StrategyKind::Random,
        StrategyKind::Pct,
        StrategyKind::Pctcp,
        StrategyKind::Feedback,
        StrategyKind::TwoStageFeedback,
        StrategyKind::FeedbackPct,
        StrategyKind::TwoStageFeedbackPct,
        StrategyKind::FeedbackPctcp,
        StrategyKind::Pattern,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::Random => "random",
            StrategyKind::Pct => "pct",
            StrategyKind::Pctcp => "pctcp",
            StrategyKind::Feedback => "feedback",
            StrategyKind::TwoStageFeedback => "2stagefeedback",
            StrategyKind::FeedbackPct => "feedbackpct",
            StrategyKind::TwoStageFeedbackPct => "2stagefeedbackpct",
            StrategyKind::FeedbackPctcp => "feedbackpctcp",
            StrategyKind::Pattern => "pattern",
        }
    }

    /// PCT-family strategies take `strategy_bound` as their switch-point bound.
    pub fn uses_switch_points(self) -> bool {
        matches!(
            self,
            StrategyKind::Pct
                | StrategyKind::Pctcp
                | StrategyKind::FeedbackPct
                | StrategyKind::TwoStageFeedbackPct
                | StrategyKind::FeedbackPctcp
        )
    }

    /// Strategies that search by mutating a corpus of saved runs.
    pub fn is_feedback(self) -> bool {
        matches!(
            self,
            StrategyKind::Feedback
                | StrategyKind::TwoStageFeedback
                | StrategyKind::FeedbackPct
                | StrategyKind::TwoStageFeedbackPct
                | StrategyKind::FeedbackPctcp
                | StrategyKind::Pattern
        )
    }

    pub fn needs_pattern(self) -> bool {
        self == StrategyKind::Pattern
    }

    /// Whether generated traces are marked as fair scheduling.
    pub fn is_fair(self) -> bool {
        !self.uses_switch_points()
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "sch-random" {
            return Ok(StrategyKind::Random);
        }
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ConfigError::UnknownStrategy(s.to_string()))
    }
}

/// Configuration for an exploration session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Iterations to run in this session.
    pub iterations: u64,
    /// Master seed.
    pub seed: u64,
    pub strategy: StrategyKind,
    /// Switch points for PCT-family strategies.
    pub strategy_bound: usize,
    /// Step bound for unfair strategies (0 = unbounded).
    pub max_unfair_steps: usize,
    /// Step bound for fair strategies (0 = unbounded).
    pub max_fair_steps: usize,
    /// Event pattern to track, in pattern-language text.
    pub pattern: Option<String>,
    /// Keep going after the first bug.
    pub full_exploration: bool,
    /// Report hitting the step bound as a bug.
    pub fail_on_max_steps: bool,
    /// Wall-clock budget, checked between iterations.
    pub timeout_secs: Option<u64>,
    /// Written to trace headers.
    pub liveness_temperature_threshold: Option<u64>,
    /// Written to trace headers.
    pub test_method: Option<String>,
    pub feedback_signal: FeedbackSignal,
    /// Optional output directory for checkpoints and traces.
    pub output_dir: Option<String>,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            iterations: 1,
            seed: 42,
            strategy: StrategyKind::Random,
            strategy_bound: 10,
            max_unfair_steps: 10_000,
            max_fair_steps: 100_000,
            pattern: None,
            full_exploration: false,
            fail_on_max_steps: false,
            timeout_secs: None,
            liveness_temperature_threshold: None,
            test_method: None,
            feedback_signal: FeedbackSignal::Coverage,
            output_dir: None,
        }
    }
}

impl ExplorerConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::NoIterations);
        }
        let fair = self.max_fair_steps;
        let unfair = self.max_unfair_steps;
        if fair != 0 && (unfair == 0 || unfair > fair) {
            return Err(ConfigError::StepBounds { unfair, fair });
        }
        if self.strategy.uses_switch_points() && self.strategy_bound == 0 {
            return Err(ConfigError::NoSwitchPoints(self.strategy));
        }
        if self.strategy.needs_pattern() && self.pattern.is_none() {
            return Err(ConfigError::MissingPattern(self.strategy));
        }
        self.compile_pattern()?;
        Ok(())
    }

    pub fn compile_pattern(&self) -> Result<Option<NfaMatcher>, ConfigError> {
        match &self.pattern {
            Some(text) => Ok(Some(NfaMatcher::compile(text)?)),
            None => Ok(None),
        }
    }

    /// Step bound for `strategy`.
    /// Step bound for the configured strategy. Fair and feedback strategies
    /// run under `max_fair_steps`, the rest under `max_unfair_steps`.
    pub fn max_steps(&self) -> usize {
        if self.strategy.is_fair() || self.strategy.is_feedback() {
            self.max_fair_steps
        } else {
            self.max_unfair_steps
        }
    }
}

/// Build the configured strategy. `matcher` is the compiled pattern, if any.
pub fn build_strategy(
    config: &ExplorerConfig,
    matcher: Option<&NfaMatcher>,
) -> Result<Box<dyn SchedulingStrategy>, ConfigError> {
    let seed = config.seed;
    let bound = config.strategy_bound;
    let max_steps = config.max_steps();
    let signal = config.feedback_signal;

    let strategy: Box<dyn SchedulingStrategy> = match config.strategy {
        StrategyKind::Random => Box::new(RandomStrategy::new(max_steps, seed)),
        StrategyKind::Pct => Box::new(PctStrategy::new(
            max_steps,
            bound,
            ChangePointSampling::Shuffled,
            seed,
        )),
        StrategyKind::Pctcp => Box::new(PctcpStrategy::new(max_steps, bound, seed)),
        StrategyKind::Feedback | StrategyKind::TwoStageFeedback => Box::new(
            FeedbackStrategy::from_generator(RandomScheduleGenerator::new, max_steps, true, seed)
                .with_mode(feedback_mode(config.strategy))
                .with_signal(signal),
        ),
        StrategyKind::FeedbackPct | StrategyKind::TwoStageFeedbackPct => Box::new(
            FeedbackStrategy::from_generator(
                |rng| PctScheduleGenerator::new(bound, ChangePointSampling::Geometric, rng),
                max_steps,
                false,
                seed,
            )
            .with_mode(feedback_mode(config.strategy))
            .with_signal(signal),
        ),
        StrategyKind::FeedbackPctcp => Box::new(
            FeedbackStrategy::from_generator(
                |rng| PctcpScheduleGenerator::new(bound, rng),
                max_steps,
                false,
                seed,
            )
            .with_signal(signal),
        ),
        StrategyKind::Pattern => {
            let matcher = matcher.ok_or(ConfigError::MissingPattern(config.strategy))?;
            let inner =
                FeedbackStrategy::from_generator(RandomScheduleGenerator::new, max_steps, true, seed)
                    .with_signal(signal);
            Box::new(PatternGuidedStrategy::new(
                Box::new(inner),
                matcher.interesting_events().clone(),
            ))
        }
    };
    Ok(strategy)
}

fn feedback_mode(kind: StrategyKind) -> FeedbackMode {
    match kind {
        StrategyKind::TwoStageFeedback | StrategyKind::TwoStageFeedbackPct => FeedbackMode::TwoStage,
        _ => FeedbackMode::OneStage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explorer_config_default() {
        let config = ExplorerConfig::default();
        assert_eq!(config.iterations, 1);
        assert_eq!(config.seed, 42);
        assert_eq!(config.strategy, StrategyKind::Random);
        assert_eq!(config.strategy_bound, 10);
        assert_eq!(config.max_unfair_steps, 10_000);
        assert_eq!(config.max_fair_steps, 100_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_strategy_names() {
        for kind in StrategyKind::ALL {
            assert_eq!(kind.name().parse::<StrategyKind>().unwrap(), kind);
        }
        assert_eq!(
            "sch-random".parse::<StrategyKind>().unwrap(),
            StrategyKind::Random
        );
        assert!(matches!(
            "dfs".parse::<StrategyKind>(),
            Err(ConfigError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        let bad = |config: ExplorerConfig| config.validate().unwrap_err();
        assert!(matches!(
            bad(ExplorerConfig {
                iterations: 0,
                ..Default::default()
            }),
            ConfigError::NoIterations
        ));
        assert!(matches!(
            bad(ExplorerConfig {
                max_unfair_steps: 500,
                max_fair_steps: 100,
                ..Default::default()
            }),
            ConfigError::StepBounds {
                unfair: 500,
                fair: 100
            }
        ));
        assert!(matches!(
            bad(ExplorerConfig {
                strategy: StrategyKind::Pctcp,
                strategy_bound: 0,
                ..Default::default()
            }),
            ConfigError::NoSwitchPoints(StrategyKind::Pctcp)
        ));
        assert!(matches!(
            bad(ExplorerConfig {
                strategy: StrategyKind::Pattern,
                ..Default::default()
            }),
            ConfigError::MissingPattern(_)
        ));
        assert!(matches!(
            bad(ExplorerConfig {
                pattern: Some("(A, B".into()),
                ..Default::default()
            }),
            ConfigError::Pattern(_)
        ));
    }

    #[test]
    fn test_unbounded_steps() {
        let config = ExplorerConfig {
            max_unfair_steps: 0,
            max_fair_steps: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_build_every_strategy() {
        for kind in StrategyKind::ALL {
            let config = ExplorerConfig {
                strategy: kind,
                pattern: Some("Write, Ack".into()),
                ..Default::default()
            };
            config.validate().unwrap();
            let matcher = config.compile_pattern().unwrap();
            let strategy = build_strategy(&config, matcher.as_ref()).unwrap();
            assert_eq!(strategy.is_fair(), kind.is_fair(), "{}", kind);
            assert!(!strategy.description().is_empty());
        }
    }

    #[test]
    fn test_config_json() {
        let config = ExplorerConfig {
            strategy: StrategyKind::TwoStageFeedbackPct,
            pattern: Some("A*".into()),
            feedback_signal: FeedbackSignal::Timeline,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"2stagefeedbackpct\""));
        let back: ExplorerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);

        let partial: ExplorerConfig = serde_json::from_str(r#"{"iterations": 7}"#).unwrap();
        assert_eq!(partial.iterations, 7);
        assert_eq!(partial.seed, 42);
    }

    #[test]
    fn test_max_steps_follows_fairness() {
        let pct = ExplorerConfig {
            strategy: StrategyKind::Pct,
            ..Default::default()
        };
        assert_eq!(pct.max_steps(), 10_000);
        assert_eq!(ExplorerConfig::default().max_steps(), 100_000);
    }

    #[test]
    fn test_feedback_strategies_use_fair_bound() {
        for kind in StrategyKind::ALL.into_iter().filter(|k| k.is_feedback()) {
            let config = ExplorerConfig {
                strategy: kind,
                max_unfair_steps: 30,
                max_fair_steps: 60,
                pattern: Some("Write".into()),
                ..Default::default()
            };
            assert_eq!(config.max_steps(), 60, "{}", kind);
        }
        assert!(!StrategyKind::FeedbackPct.is_fair());
        assert!(!StrategyKind::Pctcp.is_feedback());
    }
}
