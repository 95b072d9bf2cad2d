//! PCT: probabilistic concurrency testing with priority change points.
//!
//! Operations get a priority the first time they are seen. The
//! highest-priority enabled operation always runs, except that at a few
//! sampled steps (change points) the operation that would have run is
//! demoted to the lowest priority first.

use crate::choice::{
    sample_geometric, ChoiceStream, SCHEDULE_MEAN_MUTATION_COUNT, SCHEDULE_MEAN_MUTATION_SIZE,
};
use crate::generator::ScheduleGenerator;
use crate::operation::{Operation, OperationId};
use crate::strategy::StrategyError;
use log::trace;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;

/// Probability of a change point per step while the schedule length is unknown.
const UNKNOWN_LENGTH_SWITCH_PROBABILITY: f64 = 0.1;

/// How change points are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangePointSampling {
    /// The first `k` entries of a shuffled `0..schedule_length`.
    #[default]
    Shuffled,
    /// Geometric gaps, recalculated after each inversion.
    Geometric,
}

/// Where the next change points are.
#[derive(Debug, Clone)]
enum ChangePoints {
    Fixed(BTreeSet<usize>),
    Next(usize),
}

#[derive(Debug, Clone)]
pub struct PctScheduleGenerator {
    priority_choices: ChoiceStream,
    switch_choices: ChoiceStream,
    max_switch_points: usize,
    sampling: ChangePointSampling,
    schedule_length: usize,
    // Per iteration.
    prioritized: Vec<OperationId>,
    change_points: ChangePoints,
    inversions: usize,
    steps: usize,
}

impl PctScheduleGenerator {
    pub fn new(max_switch_points: usize, sampling: ChangePointSampling, rng: &mut ChaCha8Rng) -> Self {
        let mut generator = Self {
            priority_choices: ChoiceStream::from_rng(rng),
            switch_choices: ChoiceStream::from_rng(rng),
            max_switch_points,
            sampling,
            schedule_length: 0,
            prioritized: Vec::new(),
            change_points: ChangePoints::Fixed(BTreeSet::new()),
            inversions: 0,
            steps: 0,
        };
        generator.start_iteration(0);
        generator
    }

    fn with_streams(&self, priority_choices: ChoiceStream, switch_choices: ChoiceStream) -> Self {
        let mut generator = Self {
            priority_choices,
            switch_choices,
            max_switch_points: self.max_switch_points,
            sampling: self.sampling,
            schedule_length: self.schedule_length,
            prioritized: Vec::new(),
            change_points: ChangePoints::Fixed(BTreeSet::new()),
            inversions: 0,
            steps: 0,
        };
        generator.start_iteration(self.schedule_length);
        generator
    }

    /// Priority inversions performed so far this iteration.
    pub fn inversions(&self) -> usize {
        self.inversions
    }

    /// Highest priority first.
    pub fn priorities(&self) -> &[OperationId] {
        &self.prioritized
    }

    fn switches_left(&self) -> usize {
        self.max_switch_points.saturating_sub(self.inversions)
    }

    fn sample_next_change_point(&mut self) -> ChangePoints {
        let left = self.switches_left();
        if left == 0 {
            return ChangePoints::Next(usize::MAX);
        }
        let p = if self.schedule_length == 0 {
            UNKNOWN_LENGTH_SWITCH_PROBABILITY
        } else {
            let remaining = self.schedule_length.saturating_sub(self.steps) + 1;
            left as f64 / remaining as f64
        };
        let gap = sample_geometric(p, self.switch_choices.next_double());
        ChangePoints::Next(self.steps.saturating_add(gap))
    }

    fn shuffled_change_points(&mut self) -> ChangePoints {
        let mut range: Vec<usize> = (0..self.schedule_length).collect();
        for i in (1..range.len()).rev() {
            let j = self.switch_choices.next_index(i + 1);
            range.swap(i, j);
        }
        range.truncate(self.max_switch_points);
        ChangePoints::Fixed(range.into_iter().collect())
    }

    fn is_change_point(&self) -> bool {
        match &self.change_points {
            ChangePoints::Fixed(points) => points.contains(&self.steps),
            ChangePoints::Next(next) => *next == self.steps,
        }
    }

    /// An inversion among a single enabled operation is a no-op; try again
    /// on the next step instead.
    fn move_change_point_forward(&mut self) {
        let step = self.steps;
        match &mut self.change_points {
            ChangePoints::Fixed(points) => {
                points.remove(&step);
                let mut next = step + 1;
                while points.contains(&next) {
                    next += 1;
                }
                points.insert(next);
            }
            ChangePoints::Next(next) => *next = step + 1,
        }
    }

    fn discover(&mut self, enabled: &[&Operation]) {
        for op in enabled {
            if self.prioritized.contains(&op.id) {
                continue;
            }
            let index = if self.prioritized.is_empty() {
                0
            } else {
                self.priority_choices.next_index(self.prioritized.len()) + 1
            };
            trace!("PCT: new operation {} at priority {}", op.id, index);
            self.prioritized.insert(index, op.id);
        }
    }

    fn highest_enabled(&self, enabled: &[&Operation]) -> Option<OperationId> {
        self.prioritized
            .iter()
            .copied()
            .find(|id| enabled.iter().any(|op| op.id == *id))
    }
}

impl ScheduleGenerator for PctScheduleGenerator {
    fn start_iteration(&mut self, schedule_length: usize) {
        self.priority_choices.rewind();
        self.switch_choices.rewind();
        self.schedule_length = self.schedule_length.max(schedule_length);
        self.prioritized.clear();
        self.inversions = 0;
        self.steps = 0;
        self.change_points = match self.sampling {
            ChangePointSampling::Shuffled => self.shuffled_change_points(),
            ChangePointSampling::Geometric => self.sample_next_change_point(),
        };
    }

    fn next_operation(
        &mut self,
        _current: Option<OperationId>,
        enabled: &[&Operation],
    ) -> Result<OperationId, StrategyError> {
        self.discover(enabled);

        if self.is_change_point() {
            if enabled.len() == 1 {
                self.move_change_point_forward();
            } else if let Some(demoted) = self.highest_enabled(enabled) {
                self.prioritized.retain(|id| *id != demoted);
                self.prioritized.push(demoted);
                self.inversions += 1;
                trace!("PCT: demoted {} at step {}", demoted, self.steps);
                if self.sampling == ChangePointSampling::Geometric {
                    self.change_points = self.sample_next_change_point();
                }
            }
        }

        let chosen = self.highest_enabled(enabled).ok_or_else(|| {
            StrategyError::Invariant("enabled operation missing from priority list".into())
        })?;
        self.steps += 1;
        Ok(chosen)
    }

    fn renewed(&self, rng: &mut ChaCha8Rng) -> Self {
        self.with_streams(ChoiceStream::from_rng(rng), ChoiceStream::from_rng(rng))
    }

    fn copied(&self, rng: &mut ChaCha8Rng) -> Self {
        self.with_streams(self.priority_choices.copy(rng), self.switch_choices.copy(rng))
    }

    fn mutated(&self, rng: &mut ChaCha8Rng) -> Self {
        let (count, size) = (SCHEDULE_MEAN_MUTATION_COUNT, SCHEDULE_MEAN_MUTATION_SIZE);
        self.with_streams(
            self.priority_choices.mutate(count, size, rng),
            self.switch_choices.mutate(count, size, rng),
        )
    }

    fn description(&self) -> String {
        let sampling = match self.sampling {
            ChangePointSampling::Shuffled => "shuffled",
            ChangePointSampling::Geometric => "geometric",
        };
        format!("pct[{} switch points, {}]", self.max_switch_points, sampling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn ops(n: u64) -> Vec<Operation> {
        (0..n).map(|i| Operation::new(i, format!("a{}", i))).collect()
    }

    fn run(gen: &mut PctScheduleGenerator, ops: &[Operation], steps: usize) -> Vec<OperationId> {
        let enabled: Vec<&Operation> = ops.iter().collect();
        (0..steps)
            .map(|_| gen.next_operation(None, &enabled).unwrap())
            .collect()
    }

    #[test]
    fn test_without_change_points_one_op_runs() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut gen = PctScheduleGenerator::new(3, ChangePointSampling::Shuffled, &mut rng);
        // Unknown schedule length: no change points on the first iteration.
        let schedule = run(&mut gen, &ops(3), 20);
        assert!(schedule.iter().all(|id| *id == schedule[0]));
        assert_eq!(gen.inversions(), 0);
    }

    #[test]
    fn test_inversions_bounded_shuffled() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut gen = PctScheduleGenerator::new(2, ChangePointSampling::Shuffled, &mut rng);
        for _ in 0..20 {
            gen.start_iteration(50);
            run(&mut gen, &ops(4), 50);
            assert!(gen.inversions() <= 2);
            gen = gen.renewed(&mut rng);
        }
    }

    #[test]
    fn test_inversions_bounded_geometric() {
        let mut rng = ChaCha8Rng::seed_from_u64(10);
        let mut gen = PctScheduleGenerator::new(3, ChangePointSampling::Geometric, &mut rng);
        let mut total = 0;
        for _ in 0..30 {
            run(&mut gen, &ops(4), 40);
            assert!(gen.inversions() <= 3);
            total += gen.inversions();
            gen = gen.renewed(&mut rng);
            gen.start_iteration(40);
        }
        assert!(total > 0);
    }

    #[test]
    fn test_single_enabled_op_moves_change_point() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut gen = PctScheduleGenerator::new(5, ChangePointSampling::Shuffled, &mut rng);
        gen.start_iteration(10);
        let ops = ops(1);
        run(&mut gen, &ops, 10);
        assert_eq!(gen.inversions(), 0);
    }

    #[test]
    fn test_copy_replays() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut gen = PctScheduleGenerator::new(2, ChangePointSampling::Shuffled, &mut rng);
        gen.start_iteration(30);
        let first = run(&mut gen, &ops(3), 30);
        let mut copy = gen.copied(&mut rng);
        assert_eq!(run(&mut copy, &ops(3), 30), first);
    }

    #[test]
    fn test_new_operations_never_take_top_priority() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut gen = PctScheduleGenerator::new(0, ChangePointSampling::Shuffled, &mut rng);
        let all = ops(5);
        let first: Vec<&Operation> = all.iter().take(1).collect();
        gen.next_operation(None, &first).unwrap();
        let enabled: Vec<&Operation> = all.iter().collect();
        gen.next_operation(None, &enabled).unwrap();
        assert_eq!(gen.priorities()[0], OperationId(0));
        assert_eq!(gen.priorities().len(), 5);
    }
}
