//! PCTCP: PCT over chains of causally ordered operations.
//!
//! Every operation offered to the scheduler is recorded with its vector
//! clock. Operations are partitioned into chains, each totally ordered by
//! happens-before, and priorities are assigned to chains instead of to
//! operations. A chain runs its operations in order; change points demote
//! whole chains.

use crate::choice::{
    sample_geometric, ChoiceStream, SCHEDULE_MEAN_MUTATION_COUNT, SCHEDULE_MEAN_MUTATION_SIZE,
};
use crate::clock::VectorClock;
use crate::generator::ScheduleGenerator;
use crate::operation::{Operation, OperationId};
use crate::strategy::StrategyError;
use log::trace;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

const UNKNOWN_LENGTH_SWITCH_PROBABILITY: f64 = 0.1;

type ChainId = usize;

/// Augmenting path found by [`ChainSet::find_reducing_sequence`]:
/// moved op → (its new predecessor, the op to move next).
type ReducingPairs = BTreeMap<usize, (usize, usize)>;

fn invariant(message: &str) -> StrategyError {
    StrategyError::Invariant(format!("pctcp: {}", message))
}

#[derive(Debug, Clone)]
struct ChainedOperation {
    op: OperationId,
    clock: VectorClock,
    /// Earlier operations that happen before this one.
    preds: Vec<usize>,
}

/// Chain partition of every operation seen this iteration.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChainSet {
    ops: Vec<ChainedOperation>,
    chains: BTreeMap<ChainId, Vec<usize>>,
    /// Highest priority first.
    order: Vec<ChainId>,
    chain_of: BTreeMap<usize, ChainId>,
    next_in_chain: BTreeMap<usize, usize>,
    next_chain_id: ChainId,
}

impl ChainSet {
    pub(crate) fn add(&mut self, op: OperationId, clock: VectorClock) -> usize {
        let id = self.ops.len();
        let preds = self
            .ops
            .iter()
            .enumerate()
            .filter(|(_, earlier)| earlier.clock.lt(&clock))
            .map(|(i, _)| i)
            .collect();
        self.ops.push(ChainedOperation { op, clock, preds });
        id
    }

    fn before(&self, a: usize, b: usize) -> bool {
        self.ops[a].clock.lt(&self.ops[b].clock)
    }

    fn head(&self, chain: ChainId) -> Option<usize> {
        self.chains.get(&chain).and_then(|ops| ops.first().copied())
    }

    fn tail(&self, chain: ChainId) -> Option<usize> {
        self.chains.get(&chain).and_then(|ops| ops.last().copied())
    }

    /// Append `id` to the first chain whose tail happens before it, or start
    /// a new chain at a random priority below the top. Returns true if a
    /// chain was created.
    pub(crate) fn place(&mut self, id: usize, priority_choices: &mut ChoiceStream) -> bool {
        let target = self
            .order
            .iter()
            .copied()
            .find(|&chain| self.tail(chain).is_some_and(|tail| self.before(tail, id)));

        if let Some(chain) = target {
            if let Some(tail) = self.tail(chain) {
                self.next_in_chain.insert(tail, id);
            }
            self.chains.entry(chain).or_default().push(id);
            self.chain_of.insert(id, chain);
            return false;
        }

        let chain = self.next_chain_id;
        self.next_chain_id += 1;
        self.chains.insert(chain, vec![id]);
        self.chain_of.insert(id, chain);
        let position = if self.order.is_empty() {
            0
        } else {
            priority_choices.next_index(self.order.len()) + 1
        };
        self.order.insert(position, chain);
        true
    }

    /// Splice chains together until no chain's tail happens before another
    /// chain's head.
    pub(crate) fn reduce(&mut self) -> Result<(), StrategyError> {
        // Each splice removes one chain.
        let mut budget = self.chains.len();
        while let Some((pred, op, pairs)) = self.find_reducing_sequence()? {
            budget = budget
                .checked_sub(1)
                .ok_or_else(|| invariant("chain reduction did not converge"))?;
            self.splice(pred, op, &pairs)?;
        }
        Ok(())
    }

    /// Breadth-first search from every chain head, following predecessor
    /// edges into other chains, for an op that some other chain's tail
    /// happens before.
    fn find_reducing_sequence(
        &self,
    ) -> Result<Option<(usize, usize, ReducingPairs)>, StrategyError> {
        let mut queue: VecDeque<usize> = self
            .order
            .iter()
            .filter_map(|&chain| self.head(chain))
            .collect();
        let mut pairs = ReducingPairs::new();

        while let Some(op) = queue.pop_front() {
            let op_chain = *self
                .chain_of
                .get(&op)
                .ok_or_else(|| invariant("queued operation has no chain"))?;
            for &chain in &self.order {
                if chain == op_chain {
                    continue;
                }
                if let Some(tail) = self.tail(chain) {
                    if self.before(tail, op) {
                        return Ok(Some((tail, op, pairs)));
                    }
                }
            }
            for &pred in &self.ops[op].preds {
                if self.chain_of.get(&pred) == Some(&op_chain) {
                    continue;
                }
                if let Some(&next) = self.next_in_chain.get(&pred) {
                    if !pairs.contains_key(&next) {
                        pairs.insert(next, (pred, op));
                        queue.push_back(next);
                    }
                }
            }
        }
        Ok(None)
    }

    fn splice(&mut self, pred: usize, op: usize, pairs: &ReducingPairs) -> Result<(), StrategyError> {
        let (mut pred, mut op) = (pred, op);
        let mut budget = self.ops.len() + 1;
        loop {
            budget = budget
                .checked_sub(1)
                .ok_or_else(|| invariant("chain splice cycled"))?;
            let pred_chain = *self
                .chain_of
                .get(&pred)
                .ok_or_else(|| invariant("unplaced predecessor"))?;
            let op_chain = *self
                .chain_of
                .get(&op)
                .ok_or_else(|| invariant("unplaced operation"))?;
            if pred_chain == op_chain || self.tail(pred_chain) != Some(pred) {
                return Err(invariant("splice target is not the tail of another chain"));
            }

            let source = self
                .chains
                .get_mut(&op_chain)
                .ok_or_else(|| invariant("missing chain"))?;
            let at = source
                .iter()
                .position(|&x| x == op)
                .ok_or_else(|| invariant("operation missing from its chain"))?;
            let moved = source.split_off(at);
            if let Some(&new_tail) = source.last() {
                self.next_in_chain.remove(&new_tail);
            }
            self.next_in_chain.insert(pred, op);
            for &m in &moved {
                self.chain_of.insert(m, pred_chain);
            }
            self.chains.entry(pred_chain).or_default().extend(moved);

            match pairs.get(&op) {
                Some(&(next_pred, next_op)) => {
                    pred = next_pred;
                    op = next_op;
                }
                None => break,
            }
        }

        let emptied: Vec<ChainId> = self
            .chains
            .iter()
            .filter(|(_, ops)| ops.is_empty())
            .map(|(&chain, _)| chain)
            .collect();
        for chain in emptied {
            self.chains.remove(&chain);
            self.order.retain(|c| *c != chain);
        }
        Ok(())
    }

    /// No chain's tail happens before another chain's head.
    pub(crate) fn is_reduced(&self) -> bool {
        self.order.iter().all(|&a| {
            self.order.iter().all(|&b| {
                a == b
                    || match (self.tail(a), self.head(b)) {
                        (Some(tail), Some(head)) => !self.before(tail, head),
                        _ => true,
                    }
            })
        })
    }

    /// Every chain is ordered by happens-before.
    pub(crate) fn chains_are_ordered(&self) -> bool {
        self.chains
            .values()
            .all(|ops| ops.windows(2).all(|w| self.before(w[0], w[1])))
    }

    fn demote(&mut self, chain: ChainId) {
        self.order.retain(|c| *c != chain);
        self.order.push(chain);
    }

    pub(crate) fn chain_count(&self) -> usize {
        self.order.len()
    }
}

#[derive(Debug, Clone)]
pub struct PctcpScheduleGenerator {
    priority_choices: ChoiceStream,
    switch_choices: ChoiceStream,
    max_switch_points: usize,
    schedule_length: usize,
    // Per iteration.
    chains: ChainSet,
    /// Runtime operation → its chained entry that has not run yet.
    pending: BTreeMap<OperationId, usize>,
    scheduled: BTreeSet<usize>,
    next_change_point: usize,
    inversions: usize,
    steps: usize,
}

impl PctcpScheduleGenerator {
    pub fn new(max_switch_points: usize, rng: &mut ChaCha8Rng) -> Self {
        let mut generator = Self {
            priority_choices: ChoiceStream::from_rng(rng),
            switch_choices: ChoiceStream::from_rng(rng),
            max_switch_points,
            schedule_length: 0,
            chains: ChainSet::default(),
            pending: BTreeMap::new(),
            scheduled: BTreeSet::new(),
            next_change_point: usize::MAX,
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
            schedule_length: self.schedule_length,
            chains: ChainSet::default(),
            pending: BTreeMap::new(),
            scheduled: BTreeSet::new(),
            next_change_point: usize::MAX,
            inversions: 0,
            steps: 0,
        };
        generator.start_iteration(self.schedule_length);
        generator
    }

    pub fn inversions(&self) -> usize {
        self.inversions
    }

    pub fn chain_count(&self) -> usize {
        self.chains.chain_count()
    }

    fn sample_next_change_point(&mut self) -> usize {
        let left = self.max_switch_points.saturating_sub(self.inversions);
        if left == 0 {
            return usize::MAX;
        }
        let p = if self.schedule_length == 0 {
            UNKNOWN_LENGTH_SWITCH_PROBABILITY
        } else {
            left as f64 / (self.schedule_length.saturating_sub(self.steps) + 1) as f64
        };
        let gap = sample_geometric(p, self.switch_choices.next_double());
        self.steps.saturating_add(gap)
    }

    fn discover(&mut self, enabled: &[&Operation]) -> Result<(), StrategyError> {
        for op in enabled {
            if self.pending.contains_key(&op.id) {
                continue;
            }
            let id = self.chains.add(op.id, op.clock.clone());
            self.pending.insert(op.id, id);
            if self.chains.place(id, &mut self.priority_choices) {
                trace!("PCTCP: operation {} starts a new chain", op.id);
                self.chains.reduce()?;
            }
        }
        Ok(())
    }

    /// The current operation of the highest-priority chain whose current
    /// operation is enabled; failing that, the first enabled operation in
    /// chain priority order.
    fn select(&self, enabled: &[&Operation]) -> Option<(ChainId, usize)> {
        let runnable = |id: &usize| {
            !self.scheduled.contains(id) && enabled.iter().any(|op| op.id == self.chains.ops[*id].op)
        };
        let chain_ops = |chain: &ChainId| self.chains.chains.get(chain).map(Vec::as_slice).unwrap_or(&[]);

        for chain in &self.chains.order {
            let current = chain_ops(chain)
                .iter()
                .find(|id| !self.scheduled.contains(*id));
            if let Some(id) = current.filter(|id| runnable(*id)) {
                return Some((*chain, *id));
            }
        }
        self.chains.order.iter().find_map(|chain| {
            chain_ops(chain)
                .iter()
                .find(|id| runnable(*id))
                .map(|id| (*chain, *id))
        })
    }
}

impl ScheduleGenerator for PctcpScheduleGenerator {
    fn start_iteration(&mut self, schedule_length: usize) {
        self.priority_choices.rewind();
        self.switch_choices.rewind();
        self.schedule_length = self.schedule_length.max(schedule_length);
        self.chains = ChainSet::default();
        self.pending.clear();
        self.scheduled.clear();
        self.inversions = 0;
        self.steps = 0;
        self.next_change_point = self.sample_next_change_point();
    }

    fn next_operation(
        &mut self,
        _current: Option<OperationId>,
        enabled: &[&Operation],
    ) -> Result<OperationId, StrategyError> {
        self.discover(enabled)?;

        if self.steps == self.next_change_point {
            if enabled.len() == 1 {
                self.next_change_point += 1;
            } else if let Some((chain, _)) = self.select(enabled) {
                self.chains.demote(chain);
                self.inversions += 1;
                trace!("PCTCP: demoted chain {} at step {}", chain, self.steps);
                self.next_change_point = self.sample_next_change_point();
            }
        }

        let (_, id) = self
            .select(enabled)
            .ok_or_else(|| invariant("no enabled operation in any chain"))?;
        let op = self.chains.ops[id].op;
        self.scheduled.insert(id);
        self.pending.remove(&op);
        self.steps += 1;
        Ok(op)
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
        format!("pctcp[{} switch points]", self.max_switch_points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;

    fn vc(entries: &[(&str, u64)]) -> VectorClock {
        entries.iter().map(|&(a, v)| (a, v)).collect()
    }

    #[test]
    fn test_ordered_operations_share_a_chain() {
        let mut set = ChainSet::default();
        let mut choices = ChoiceStream::new(0);
        for i in 1..=4 {
            let id = set.add(OperationId(0), vc(&[("a", i)]));
            set.place(id, &mut choices);
        }
        assert_eq!(set.chain_count(), 1);
        assert!(set.chains_are_ordered());
    }

    #[test]
    fn test_concurrent_operations_get_their_own_chains() {
        let mut set = ChainSet::default();
        let mut choices = ChoiceStream::new(0);
        for actor in ["a", "b", "c"] {
            let id = set.add(OperationId(0), vc(&[(actor, 1)]));
            set.place(id, &mut choices);
        }
        assert_eq!(set.chain_count(), 3);
    }

    #[test]
    fn test_reduction_merges_tail_before_head() {
        let mut set = ChainSet::default();
        let mut choices = ChoiceStream::new(0);
        let late = set.add(OperationId(0), vc(&[("a", 2)]));
        assert!(set.place(late, &mut choices));
        // Offered later, but happens before the first chain's head.
        let early = set.add(OperationId(1), vc(&[("a", 1)]));
        assert!(set.place(early, &mut choices));
        assert!(!set.is_reduced());
        set.reduce().unwrap();
        assert!(set.is_reduced());
        assert_eq!(set.chain_count(), 1);
        assert_eq!(set.chains.values().next().unwrap(), &vec![early, late]);
    }

    #[test]
    fn test_unplaced_chain_head_is_an_invariant_error() {
        let mut set = ChainSet::default();
        let mut choices = ChoiceStream::new(0);
        let late = set.add(OperationId(0), vc(&[("a", 2)]));
        set.place(late, &mut choices);
        let early = set.add(OperationId(1), vc(&[("a", 1)]));
        set.place(early, &mut choices);
        set.chain_of.remove(&late);
        assert!(matches!(set.reduce(), Err(StrategyError::Invariant(_))));
    }

    #[test]
    fn test_generator_runs_every_actor() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let mut gen = PctcpScheduleGenerator::new(2, &mut rng);
        let ops: Vec<Operation> = (0..3)
            .map(|i| {
                let actor = format!("a{}", i);
                let clock = vc(&[(actor.as_str(), 1)]);
                Operation::new(i, actor).with_clock(clock)
            })
            .collect();
        let mut remaining: Vec<&Operation> = ops.iter().collect();
        let mut order = Vec::new();
        while !remaining.is_empty() {
            let chosen = gen.next_operation(None, &remaining).unwrap();
            order.push(chosen);
            remaining.retain(|op| op.id != chosen);
        }
        order.sort();
        assert_eq!(order, vec![OperationId(0), OperationId(1), OperationId(2)]);
        assert!(gen.inversions() <= 2);
    }

    #[test]
    fn test_copy_replays() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let mut gen = PctcpScheduleGenerator::new(3, &mut rng);
        gen.start_iteration(40);
        let run = |gen: &mut PctcpScheduleGenerator| {
            let mut clocks: Vec<VectorClock> = (0..3).map(|_| VectorClock::new()).collect();
            let mut out = Vec::new();
            for _ in 0..40 {
                let ops: Vec<Operation> = (0..3)
                    .map(|i| Operation::new(i, format!("a{}", i)).with_clock(clocks[i as usize].clone()))
                    .collect();
                let enabled: Vec<&Operation> = ops.iter().collect();
                let chosen = gen.next_operation(None, &enabled).unwrap();
                clocks[chosen.0 as usize].increment(&format!("a{}", chosen.0));
                out.push(chosen);
            }
            out
        };
        let first = run(&mut gen);
        let mut copy = gen.copied(&mut rng);
        assert_eq!(run(&mut copy), first);
    }

    proptest! {
        #[test]
        fn reduction_reaches_fixed_point(
            clocks in prop::collection::vec((0u64..4, 0u64..4, 0u64..4), 1..24),
            seed in any::<u64>(),
        ) {
            let mut set = ChainSet::default();
            let mut choices = ChoiceStream::new(seed);
            for (i, (a, b, c)) in clocks.into_iter().enumerate() {
                let id = set.add(OperationId(i as u64), vc(&[("a", a), ("b", b), ("c", c)]));
                if set.place(id, &mut choices) {
                    set.reduce().unwrap();
                }
                prop_assert!(set.is_reduced());
                prop_assert!(set.chains_are_ordered());
            }
        }
    }
}
