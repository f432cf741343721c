use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, trace};

use seqforge_util::{RandomSource, SharedList, WeightedList, WeightedSampler, WeightedTree};

use crate::error::EngineError;
use crate::sequence::Sequence;
use crate::types::{TypeDesc, TypeOracle};
use crate::value::{Literal, LiteralKey};

/// Longest string a runtime primitive may have to become a seed.
pub const MAX_LITERAL_STRING_LEN: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchMode {
    /// Only components indexed under exactly the requested type.
    Exact,
    /// Components of any type the oracle says is assignable to it.
    Assignable,
}

/// Primitive constants every pool starts with.
pub fn default_seed_literals() -> Vec<Literal> {
    vec![
        Literal::Int(-1),
        Literal::Int(0),
        Literal::Int(1),
        Literal::Int(10),
        Literal::Int(100),
        Literal::Bool(true),
        Literal::Bool(false),
        Literal::Float(0.0),
        Literal::Float(1.0),
        Literal::Str(String::new()),
        Literal::Str("hi!".into()),
    ]
}

struct Bucket {
    /// Append-only; lookups hand out views of it.
    members: Arc<Vec<Sequence>>,
    weights: WeightedTree<usize>,
    selections: Vec<u64>,
}

impl Bucket {
    fn new() -> Self {
        Bucket {
            members: Arc::new(Vec::new()),
            weights: WeightedTree::new(),
            selections: Vec::new(),
        }
    }

    fn push(&mut self, seq: Sequence) -> Result<(), EngineError> {
        let idx = self.members.len();
        self.weights.add(idx, selection_weight(&seq, 1))?;
        self.selections.push(1);
        Arc::make_mut(&mut self.members).push(seq);
        Ok(())
    }
}

/// Weight of a component that has been handed out `selections - 1` times.
fn selection_weight(seq: &Sequence, selections: u64) -> f64 {
    let calls = seq.method_calls().max(1) as f64;
    1.0 / (selections as f64 * calls.sqrt())
}

/// The growing collection of reusable sequences, indexed by the types they
/// produce.
pub struct ComponentPool {
    oracle: Arc<dyn TypeOracle>,
    seeds: Vec<Sequence>,
    seen_literals: BTreeSet<LiteralKey>,
    /// Generated components since the last reset.
    components: Vec<Sequence>,
    buckets: BTreeMap<TypeDesc, Bucket>,
    memo: BTreeMap<(TypeDesc, MatchMode), Vec<TypeDesc>>,
    clear_threshold: usize,
    favor_shorter: bool,
    resets: u64,
}

impl ComponentPool {
    pub fn new(
        oracle: Arc<dyn TypeOracle>,
        clear_threshold: usize,
        favor_shorter: bool,
    ) -> Result<Self, EngineError> {
        let mut pool = ComponentPool {
            oracle,
            seeds: Vec::new(),
            seen_literals: BTreeSet::new(),
            components: Vec::new(),
            buckets: BTreeMap::new(),
            memo: BTreeMap::new(),
            clear_threshold,
            favor_shorter,
            resets: 0,
        };
        for lit in default_seed_literals() {
            pool.add_literal(lit)?;
        }
        Ok(pool)
    }

    /// Add a generated component, resetting the pool first if it has
    /// reached the clear threshold. Duplicates are permitted.
    ///
    /// Returns false, leaving the pool untouched, when the sequence has no
    /// active reference value to offer.
    pub fn add(&mut self, seq: Sequence) -> Result<bool, EngineError> {
        if seq.produced_types().is_empty() {
            trace!(fingerprint = seq.fingerprint(), "component has no reusable value");
            return Ok(false);
        }
        if self.size() >= self.clear_threshold {
            debug!(size = self.size(), threshold = self.clear_threshold, "pool reset");
            self.clear()?;
        }
        self.index(&seq)?;
        self.components.push(seq);
        Ok(true)
    }

    /// Add a component that survives resets and is not counted by `size()`.
    pub fn add_seed(&mut self, seq: Sequence) -> Result<(), EngineError> {
        if let Some(lit) = seq.as_literal() {
            self.seen_literals.insert(lit.key());
        }
        self.index(&seq)?;
        self.seeds.push(seq);
        Ok(())
    }

    /// Add a primitive observed at runtime as a new seed. Returns false if
    /// it was already known or is too long to keep.
    pub fn add_literal(&mut self, lit: Literal) -> Result<bool, EngineError> {
        let lit = lit.canonical();
        if let Literal::Str(s) = &lit {
            if s.chars().count() > MAX_LITERAL_STRING_LEN {
                return Ok(false);
            }
        }
        if self.seen_literals.contains(&lit.key()) {
            return Ok(false);
        }
        self.add_seed(Sequence::literal(lit))?;
        Ok(true)
    }

    /// Drop generated components, keep seeds.
    pub fn clear(&mut self) -> Result<(), EngineError> {
        self.components.clear();
        self.buckets.clear();
        self.memo.clear();
        self.resets += 1;
        let seeds = std::mem::take(&mut self.seeds);
        for seed in &seeds {
            self.index(seed)?;
        }
        self.seeds = seeds;
        Ok(())
    }

    /// Number of generated components since the last reset.
    pub fn size(&self) -> usize {
        self.components.len()
    }

    pub fn seed_count(&self) -> usize {
        self.seeds.len()
    }

    pub fn resets(&self) -> u64 {
        self.resets
    }

    pub fn components(&self) -> &[Sequence] {
        &self.components
    }

    pub fn seeds(&self) -> &[Sequence] {
        &self.seeds
    }

    /// Replace the type oracle. Lookups are recomputed.
    pub fn set_oracle(&mut self, oracle: Arc<dyn TypeOracle>) {
        self.oracle = oracle;
        self.memo.clear();
    }

    /// All components usable as a value of type `ty`, without copying them.
    pub fn lookup(&mut self, ty: &TypeDesc, mode: MatchMode) -> SharedList<Sequence> {
        let keys = self.compatible_keys(ty, mode);
        SharedList::concat(
            keys.iter()
                .filter_map(|k| self.buckets.get(k))
                .map(|b| SharedList::from_shared_vec(Arc::clone(&b.members))),
        )
    }

    /// Pick one component usable as `ty`: uniformly, or biased towards
    /// short and rarely used components in favor-shorter mode.
    pub fn select(
        &mut self,
        ty: &TypeDesc,
        mode: MatchMode,
        rng: &mut RandomSource,
    ) -> Result<Option<Sequence>, EngineError> {
        if !self.favor_shorter {
            let candidates = self.lookup(ty, mode);
            return Ok(rng.choose_shared(&candidates).map(|(_, seq)| seq.clone()));
        }

        let keys = self.compatible_keys(ty, mode);
        let mut totals: WeightedList<usize> = WeightedList::new();
        for (i, key) in keys.iter().enumerate() {
            if let Some(bucket) = self.buckets.get(key) {
                if !bucket.weights.is_empty() {
                    totals.add(i, bucket.weights.total_weight())?;
                }
            }
        }
        let Some(&k) = totals.random_element(rng) else {
            return Ok(None);
        };
        let Some(bucket) = self.buckets.get_mut(&keys[k]) else {
            return Ok(None);
        };
        let Some(&idx) = bucket.weights.random_element(rng) else {
            return Ok(None);
        };
        let seq = bucket.members[idx].clone();
        bucket.selections[idx] += 1;
        bucket
            .weights
            .update(&idx, selection_weight(&seq, bucket.selections[idx]))?;
        Ok(Some(seq))
    }

    fn compatible_keys(&mut self, ty: &TypeDesc, mode: MatchMode) -> Vec<TypeDesc> {
        let memo_key = (ty.clone(), mode);
        if let Some(keys) = self.memo.get(&memo_key) {
            return keys.clone();
        }
        let keys: Vec<TypeDesc> = self
            .buckets
            .keys()
            .filter(|k| match mode {
                MatchMode::Exact => *k == ty,
                MatchMode::Assignable => self.oracle.is_assignable(ty, k),
            })
            .cloned()
            .collect();
        self.memo.insert(memo_key, keys.clone());
        keys
    }

    fn index(&mut self, seq: &Sequence) -> Result<(), EngineError> {
        let types = match seq.as_literal() {
            Some(lit) => BTreeSet::from([lit.type_desc()]),
            None => seq.produced_types(),
        };
        for ty in types {
            if !self.buckets.contains_key(&ty) {
                self.memo.clear();
            }
            self.buckets
                .entry(ty)
                .or_insert_with(Bucket::new)
                .push(seq.clone())?;
        }
        Ok(())
    }
}
