//! Feedback-guided mutation search.
//!
//! Each iteration runs one [`StrategyGenerator`]. When the finished run shows
//! something new, the generator that produced it is saved to a corpus, and
//! later iterations are derived from corpus entries by mutation. Corpus
//! entries rotate once an entry has spent its mutation budget without
//! producing a save.

use crate::generator::{InputGenerator, ScheduleGenerator, StrategyGenerator};
use crate::operation::{enabled, Operation, OperationId};
use crate::strategy::{reached, FeedbackStats, RunSummary, SchedulingStrategy, StrategyError};
use log::debug;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Mutations derived from one corpus entry before moving to the next.
pub const DEFAULT_MAX_MUTATIONS: usize = 50;

/// Unproductive iterations after which two-stage search mutates the input
/// once instead of the schedule.
pub const DEFAULT_TWO_STAGE_THRESHOLD: usize = 5;

/// How the next generator is derived from a corpus entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedbackMode {
    /// Mutate input and schedule together.
    #[default]
    OneStage,
    /// Hold one half fixed and mutate the other.
    TwoStage,
}

/// What counts as "something new" after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedbackSignal {
    /// New `receiver:event` pairs or new pattern states, or a first pattern match.
    #[default]
    Coverage,
    /// A per-actor event timeline not seen before.
    Timeline,
    /// More enabled operations at some step than any earlier run saw there.
    PrefixBranching,
}

impl fmt::Display for FeedbackSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeedbackSignal::Coverage => "coverage",
            FeedbackSignal::Timeline => "timeline",
            FeedbackSignal::PrefixBranching => "prefix-branching",
        };
        f.write_str(name)
    }
}

impl FromStr for FeedbackSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coverage" => Ok(FeedbackSignal::Coverage),
            "timeline" => Ok(FeedbackSignal::Timeline),
            "prefix-branching" | "unbiased" => Ok(FeedbackSignal::PrefixBranching),
            other => Err(format!("unknown feedback signal '{}'", other)),
        }
    }
}

#[derive(Debug)]
pub struct FeedbackStrategy<S> {
    current: StrategyGenerator<S>,
    corpus: Vec<StrategyGenerator<S>>,
    rng: ChaCha8Rng,
    mode: FeedbackMode,
    signal: FeedbackSignal,
    max_mutations: usize,
    two_stage_threshold: usize,
    max_steps: usize,
    fair: bool,
    scheduled_steps: usize,
    schedule_length: usize,
    current_input_index: usize,
    /// Mutations of the current corpus entry since the last save.
    mutations_without_save: usize,
    /// Iterations without a save since the last save, input mutation or
    /// corpus rotation.
    stale_iterations: usize,
    covered_events: BTreeSet<String>,
    covered_states: BTreeSet<usize>,
    pattern_matched: bool,
    timelines: BTreeSet<u64>,
    /// Most enabled operations seen at each step index.
    max_branching: Vec<usize>,
    /// Enabled operations at each step of the current run.
    branching: Vec<usize>,
    last_saved_scheduling: Vec<String>,
}

impl<S: ScheduleGenerator> FeedbackStrategy<S> {
    /// `max_steps == 0` means unbounded.
    pub fn from_generator(
        build: impl FnOnce(&mut ChaCha8Rng) -> S,
        max_steps: usize,
        fair: bool,
        seed: u64,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let schedule = build(&mut rng);
        let input = InputGenerator::new(&mut rng);
        let mut current = StrategyGenerator::new(input, schedule);
        current.start_iteration(0);
        Self {
            current,
            corpus: Vec::new(),
            rng,
            mode: FeedbackMode::default(),
            signal: FeedbackSignal::default(),
            max_mutations: DEFAULT_MAX_MUTATIONS,
            two_stage_threshold: DEFAULT_TWO_STAGE_THRESHOLD,
            max_steps,
            fair,
            scheduled_steps: 0,
            schedule_length: 0,
            current_input_index: 0,
            mutations_without_save: 0,
            stale_iterations: 0,
            covered_events: BTreeSet::new(),
            covered_states: BTreeSet::new(),
            pattern_matched: false,
            timelines: BTreeSet::new(),
            max_branching: Vec::new(),
            branching: Vec::new(),
            last_saved_scheduling: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: FeedbackMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_signal(mut self, signal: FeedbackSignal) -> Self {
        self.signal = signal;
        self
    }

    pub fn with_max_mutations(mut self, max_mutations: usize) -> Self {
        self.max_mutations = max_mutations.max(1);
        self
    }

    pub fn corpus_len(&self) -> usize {
        self.corpus.len()
    }

    fn is_novel(&mut self, summary: &RunSummary) -> bool {
        match self.signal {
            FeedbackSignal::Coverage => {
                let mut novel = false;
                for key in &summary.event_coverage {
                    novel |= self.covered_events.insert(key.clone());
                }
                for state in &summary.visited_states {
                    novel |= self.covered_states.insert(*state);
                }
                if summary.pattern_matched && !self.pattern_matched {
                    self.pattern_matched = true;
                    novel = true;
                }
                novel
            }
            FeedbackSignal::Timeline => summary
                .timeline_hash
                .map(|hash| self.timelines.insert(hash))
                .unwrap_or(false),
            FeedbackSignal::PrefixBranching => {
                let mut novel = false;
                for (step, &count) in self.branching.iter().enumerate() {
                    match self.max_branching.get_mut(step) {
                        Some(best) if count > *best => {
                            *best = count;
                            novel = true;
                        }
                        Some(_) => {}
                        None => {
                            self.max_branching.push(count);
                            novel = true;
                        }
                    }
                }
                novel
            }
        }
    }

    fn next_generator(&mut self) -> StrategyGenerator<S> {
        if self.corpus.is_empty() {
            return self.current.mutate_both(&mut self.rng);
        }
        if self.mutations_without_save >= self.max_mutations {
            self.current_input_index = (self.current_input_index + 1) % self.corpus.len();
            self.mutations_without_save = 0;
            self.stale_iterations = 0;
            debug!("feedback: moving to corpus entry {}", self.current_input_index);
        }
        let index = self.current_input_index.min(self.corpus.len() - 1);
        let base = &self.corpus[index];
        match self.mode {
            FeedbackMode::OneStage => base.mutate_both(&mut self.rng),
            FeedbackMode::TwoStage if self.stale_iterations >= self.two_stage_threshold => {
                // One input mutation, then back to mutating schedules.
                self.stale_iterations = 0;
                base.mutate_input(&mut self.rng)
            }
            FeedbackMode::TwoStage => base.mutate_schedule(&mut self.rng),
        }
    }
}

impl<S: ScheduleGenerator> SchedulingStrategy for FeedbackStrategy<S> {
    fn next_operation(
        &mut self,
        current: Option<OperationId>,
        ops: &[Operation],
    ) -> Result<Option<OperationId>, StrategyError> {
        let enabled = enabled(ops);
        if enabled.is_empty() {
            return Ok(None);
        }
        self.scheduled_steps += 1;
        self.branching.push(enabled.len());
        self.current.schedule.next_operation(current, &enabled).map(Some)
    }

    fn next_boolean_choice(
        &mut self,
        _current: Option<OperationId>,
        max_value: u64,
    ) -> Result<bool, StrategyError> {
        self.scheduled_steps += 1;
        Ok(self.current.input.next_bool(max_value))
    }

    fn next_integer_choice(
        &mut self,
        _current: Option<OperationId>,
        max_value: u64,
    ) -> Result<u64, StrategyError> {
        self.scheduled_steps += 1;
        Ok(self.current.input.next_int(max_value))
    }

    fn prepare_for_next_iteration(&mut self) -> bool {
        self.schedule_length = self.schedule_length.max(self.scheduled_steps);
        self.current = self.next_generator();
        self.current.start_iteration(self.schedule_length);
        self.scheduled_steps = 0;
        self.branching.clear();
        true
    }

    fn scheduled_steps(&self) -> usize {
        self.scheduled_steps
    }

    fn has_reached_max_steps(&self) -> bool {
        reached(self.max_steps, self.scheduled_steps)
    }

    fn is_fair(&self) -> bool {
        self.fair
    }

    fn description(&self) -> String {
        let prefix = match self.mode {
            FeedbackMode::OneStage => "feedback",
            FeedbackMode::TwoStage => "2stagefeedback",
        };
        format!("{}[{}, {}]", prefix, self.current.schedule.description(), self.signal)
    }

    fn observe_running_results(&mut self, summary: &RunSummary) {
        if self.is_novel(summary) {
            self.corpus.push(self.current.clone());
            self.last_saved_scheduling = summary.matched_events.clone();
            self.mutations_without_save = 0;
            self.stale_iterations = 0;
            debug!(
                "feedback: saved input #{} after {} steps",
                self.corpus.len(),
                summary.steps
            );
        } else {
            self.mutations_without_save += 1;
            self.stale_iterations += 1;
        }
    }

    fn feedback_stats(&self) -> Option<FeedbackStats> {
        Some(FeedbackStats {
            total_saved_inputs: self.corpus.len(),
            current_input_index: self.current_input_index,
            covered_states: self.covered_states.clone(),
            last_saved_scheduling: self.last_saved_scheduling.clone(),
        })
    }
}
