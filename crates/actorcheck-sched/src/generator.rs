//! Generators: choice streams shaped into schedules and program inputs.
//!
//! Generators are values. `copied`, `mutated` and `renewed` always return a
//! new generator and leave `self` untouched, so saved generators can be kept
//! in a corpus for as long as needed.

use crate::choice::{
    ChoiceStream, INPUT_MEAN_MUTATION_COUNT, INPUT_MEAN_MUTATION_SIZE,
    SCHEDULE_MEAN_MUTATION_COUNT, SCHEDULE_MEAN_MUTATION_SIZE,
};
use crate::operation::{Operation, OperationId};
use crate::strategy::StrategyError;
use rand_chacha::ChaCha8Rng;
use std::fmt;

/// Turns choice streams into scheduling decisions.
pub trait ScheduleGenerator: Clone + fmt::Debug {
    /// Rewind to the start of the recorded choices and clear per-run state.
    ///
    /// `schedule_length` is the longest run seen so far (0 if unknown).
    fn start_iteration(&mut self, schedule_length: usize);

    /// Pick one of `enabled`, which is never empty.
    fn next_operation(
        &mut self,
        current: Option<OperationId>,
        enabled: &[&Operation],
    ) -> Result<OperationId, StrategyError>;

    /// Same configuration, fresh empty streams.
    fn renewed(&self, rng: &mut ChaCha8Rng) -> Self;

    /// Same recorded choices.
    fn copied(&self, rng: &mut ChaCha8Rng) -> Self;

    /// Recorded choices with some bursts overwritten.
    fn mutated(&self, rng: &mut ChaCha8Rng) -> Self;

    fn description(&self) -> String;
}

/// Uniform choice among enabled operations.
#[derive(Debug, Clone)]
pub struct RandomScheduleGenerator {
    choices: ChoiceStream,
}

impl RandomScheduleGenerator {
    pub fn new(rng: &mut ChaCha8Rng) -> Self {
        Self {
            choices: ChoiceStream::from_rng(rng),
        }
    }

    pub fn choices(&self) -> &ChoiceStream {
        &self.choices
    }
}

impl ScheduleGenerator for RandomScheduleGenerator {
    fn start_iteration(&mut self, _schedule_length: usize) {
        self.choices.rewind();
    }

    fn next_operation(
        &mut self,
        _current: Option<OperationId>,
        enabled: &[&Operation],
    ) -> Result<OperationId, StrategyError> {
        let index = self.choices.next_index(enabled.len());
        enabled
            .get(index)
            .map(|op| op.id)
            .ok_or_else(|| StrategyError::Invariant("no enabled operation to pick".into()))
    }

    fn renewed(&self, rng: &mut ChaCha8Rng) -> Self {
        Self::new(rng)
    }

    fn copied(&self, rng: &mut ChaCha8Rng) -> Self {
        Self {
            choices: self.choices.copy(rng),
        }
    }

    fn mutated(&self, rng: &mut ChaCha8Rng) -> Self {
        Self {
            choices: self.choices.mutate(
                SCHEDULE_MEAN_MUTATION_COUNT,
                SCHEDULE_MEAN_MUTATION_SIZE,
                rng,
            ),
        }
    }

    fn description(&self) -> String {
        "random".to_string()
    }
}

/// Values handed to the program under test.
#[derive(Debug, Clone)]
pub struct InputGenerator {
    ints: ChoiceStream,
    doubles: ChoiceStream,
}

impl InputGenerator {
    pub fn new(rng: &mut ChaCha8Rng) -> Self {
        Self {
            ints: ChoiceStream::from_rng(rng),
            doubles: ChoiceStream::from_rng(rng),
        }
    }

    pub fn next_int(&mut self, bound: u64) -> u64 {
        self.ints.next_int(bound)
    }

    /// True with probability `1 / max_value`.
    pub fn next_bool(&mut self, max_value: u64) -> bool {
        self.ints.next_int(max_value.max(1)) == 0
    }

    pub fn next_double(&mut self) -> f64 {
        self.doubles.next_double()
    }

    pub fn rewind(&mut self) {
        self.ints.rewind();
        self.doubles.rewind();
    }

    pub fn len(&self) -> usize {
        self.ints.len() + self.doubles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn copied(&self, rng: &mut ChaCha8Rng) -> Self {
        Self {
            ints: self.ints.copy(rng),
            doubles: self.doubles.copy(rng),
        }
    }

    pub fn mutated(&self, rng: &mut ChaCha8Rng) -> Self {
        Self {
            ints: self
                .ints
                .mutate(INPUT_MEAN_MUTATION_COUNT, INPUT_MEAN_MUTATION_SIZE, rng),
            doubles: self
                .doubles
                .mutate(INPUT_MEAN_MUTATION_COUNT, INPUT_MEAN_MUTATION_SIZE, rng),
        }
    }
}

/// The unit feedback search saves and mutates.
#[derive(Debug, Clone)]
pub struct StrategyGenerator<S> {
    pub input: InputGenerator,
    pub schedule: S,
}

impl<S: ScheduleGenerator> StrategyGenerator<S> {
    pub fn new(input: InputGenerator, schedule: S) -> Self {
        Self { input, schedule }
    }

    pub fn mutate_both(&self, rng: &mut ChaCha8Rng) -> Self {
        Self::new(self.input.mutated(rng), self.schedule.mutated(rng))
    }

    /// Mutate the input, keep the schedule.
    pub fn mutate_input(&self, rng: &mut ChaCha8Rng) -> Self {
        Self::new(self.input.mutated(rng), self.schedule.copied(rng))
    }

    /// Keep the input, mutate the schedule.
    pub fn mutate_schedule(&self, rng: &mut ChaCha8Rng) -> Self {
        Self::new(self.input.copied(rng), self.schedule.mutated(rng))
    }

    /// Rewind both halves for a new run.
    pub fn start_iteration(&mut self, schedule_length: usize) {
        self.input.rewind();
        self.schedule.start_iteration(schedule_length);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn ops(n: u64) -> Vec<Operation> {
        (0..n).map(|i| Operation::new(i, format!("a{}", i))).collect()
    }

    fn drive<S: ScheduleGenerator>(gen: &mut S, ops: &[Operation], steps: usize) -> Vec<OperationId> {
        let enabled: Vec<&Operation> = ops.iter().collect();
        (0..steps)
            .map(|_| gen.next_operation(None, &enabled).unwrap())
            .collect()
    }

    #[test]
    fn test_random_generator_replays_after_restart() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let ops = ops(4);
        let mut gen = RandomScheduleGenerator::new(&mut rng);
        gen.start_iteration(0);
        let first = drive(&mut gen, &ops, 30);
        gen.start_iteration(30);
        assert_eq!(drive(&mut gen, &ops, 30), first);
    }

    #[test]
    fn test_copy_replays_schedule() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let ops = ops(3);
        let mut gen = RandomScheduleGenerator::new(&mut rng);
        let first = drive(&mut gen, &ops, 25);
        let mut copy = gen.copied(&mut rng);
        assert_eq!(drive(&mut copy, &ops, 25), first);
    }

    #[test]
    fn test_mutated_keeps_source_intact() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let ops = ops(5);
        let mut gen = RandomScheduleGenerator::new(&mut rng);
        drive(&mut gen, &ops, 40);
        let before = gen.choices().values().to_vec();
        let mutated = gen.mutated(&mut rng);
        assert_eq!(gen.choices().values(), &before[..]);
        assert_eq!(mutated.choices().len(), before.len());
    }

    #[test]
    fn test_input_generator_replay() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut input = InputGenerator::new(&mut rng);
        let ints: Vec<u64> = (0..10).map(|_| input.next_int(100)).collect();
        let d = input.next_double();
        input.rewind();
        assert_eq!((0..10).map(|_| input.next_int(100)).collect::<Vec<_>>(), ints);
        assert_eq!(input.next_double(), d);
        assert!(input.next_bool(1));
    }
}
