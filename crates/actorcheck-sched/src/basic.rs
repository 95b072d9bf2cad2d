//! Strategies that draw a fresh schedule generator every iteration.

use crate::generator::{InputGenerator, RandomScheduleGenerator, ScheduleGenerator};
use crate::operation::{enabled, Operation, OperationId};
use crate::pct::{ChangePointSampling, PctScheduleGenerator};
use crate::pctcp::PctcpScheduleGenerator;
use crate::strategy::{reached, SchedulingStrategy, StrategyError};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// A schedule generator plus an input generator, both renewed from a
/// seeded source after every iteration.
#[derive(Debug)]
pub struct GeneratorStrategy<S> {
    generator: S,
    inputs: InputGenerator,
    rng: ChaCha8Rng,
    max_steps: usize,
    fair: bool,
    scheduled_steps: usize,
    schedule_length: usize,
}

pub type RandomStrategy = GeneratorStrategy<RandomScheduleGenerator>;
pub type PctStrategy = GeneratorStrategy<PctScheduleGenerator>;
pub type PctcpStrategy = GeneratorStrategy<PctcpScheduleGenerator>;

impl<S: ScheduleGenerator> GeneratorStrategy<S> {
    /// `max_steps == 0` means unbounded.
    pub fn from_generator(
        build: impl FnOnce(&mut ChaCha8Rng) -> S,
        max_steps: usize,
        fair: bool,
        seed: u64,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let generator = build(&mut rng);
        let inputs = InputGenerator::new(&mut rng);
        Self {
            generator,
            inputs,
            rng,
            max_steps,
            fair,
            scheduled_steps: 0,
            schedule_length: 0,
        }
    }

    pub fn generator(&self) -> &S {
        &self.generator
    }
}

impl RandomStrategy {
    pub fn new(max_steps: usize, seed: u64) -> Self {
        Self::from_generator(RandomScheduleGenerator::new, max_steps, true, seed)
    }
}

impl PctStrategy {
    pub fn new(
        max_steps: usize,
        max_switch_points: usize,
        sampling: ChangePointSampling,
        seed: u64,
    ) -> Self {
        Self::from_generator(
            |rng| PctScheduleGenerator::new(max_switch_points, sampling, rng),
            max_steps,
            false,
            seed,
        )
    }
}

impl PctcpStrategy {
    pub fn new(max_steps: usize, max_switch_points: usize, seed: u64) -> Self {
        Self::from_generator(
            |rng| PctcpScheduleGenerator::new(max_switch_points, rng),
            max_steps,
            false,
            seed,
        )
    }
}

impl<S: ScheduleGenerator> SchedulingStrategy for GeneratorStrategy<S> {
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
        self.generator.next_operation(current, &enabled).map(Some)
    }

    fn next_boolean_choice(
        &mut self,
        _current: Option<OperationId>,
        max_value: u64,
    ) -> Result<bool, StrategyError> {
        self.scheduled_steps += 1;
        Ok(self.inputs.next_bool(max_value))
    }

    fn next_integer_choice(
        &mut self,
        _current: Option<OperationId>,
        max_value: u64,
    ) -> Result<u64, StrategyError> {
        self.scheduled_steps += 1;
        Ok(self.inputs.next_int(max_value))
    }

    fn prepare_for_next_iteration(&mut self) -> bool {
        self.schedule_length = self.schedule_length.max(self.scheduled_steps);
        self.generator = self.generator.renewed(&mut self.rng);
        self.generator.start_iteration(self.schedule_length);
        self.inputs = InputGenerator::new(&mut self.rng);
        self.scheduled_steps = 0;
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
        self.generator.description()
    }
}
