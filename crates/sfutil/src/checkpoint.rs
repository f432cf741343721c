use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use crate::error::CheckpointError;

#[derive(Debug, Clone)]
enum Op<K, V> {
    Add(K, V),
    Remove(K, V),
}

/// A multimap that can roll back to earlier states.
///
/// Every successful `add`/`remove` is logged. `mark()` records the current
/// log length; `undo_to_last_mark()` replays the inverse of every logged
/// operation since that mark, newest first, and pops the mark. `commit()`
/// pops the mark and keeps the effects. With no marks outstanding the log is
/// not kept.
#[derive(Debug, Clone)]
pub struct CheckpointMultiMap<K, V> {
    map: BTreeMap<K, BTreeSet<V>>,
    log: Vec<Op<K, V>>,
    marks: Vec<usize>,
}

impl<K, V> Default for CheckpointMultiMap<K, V> {
    fn default() -> Self {
        CheckpointMultiMap {
            map: BTreeMap::new(),
            log: Vec::new(),
            marks: Vec::new(),
        }
    }
}

impl<K, V> CheckpointMultiMap<K, V>
where
    K: Ord + Clone + Debug,
    V: Ord + Clone + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `value` with `key`. Fails if the pair is already present.
    pub fn add(&mut self, key: K, value: V) -> Result<(), CheckpointError> {
        self.raw_add(key.clone(), value.clone())?;
        if !self.marks.is_empty() {
            self.log.push(Op::Add(key, value));
        }
        Ok(())
    }

    /// Remove the pair. Fails if it is absent.
    pub fn remove(&mut self, key: &K, value: &V) -> Result<(), CheckpointError> {
        self.raw_remove(key, value)?;
        if !self.marks.is_empty() {
            self.log.push(Op::Remove(key.clone(), value.clone()));
        }
        Ok(())
    }

    pub fn mark(&mut self) {
        self.marks.push(self.log.len());
    }

    /// Restore the state at the last mark and pop it.
    pub fn undo_to_last_mark(&mut self) -> Result<(), CheckpointError> {
        let mark = self.marks.pop().ok_or(CheckpointError::NoMark)?;
        while self.log.len() > mark {
            let Some(op) = self.log.pop() else { break };
            match op {
                Op::Add(k, v) => self.raw_remove(&k, &v)?,
                Op::Remove(k, v) => self.raw_add(k, v)?,
            }
        }
        Ok(())
    }

    /// Pop the last mark, keeping everything done since.
    pub fn commit(&mut self) -> Result<(), CheckpointError> {
        self.marks.pop().ok_or(CheckpointError::NoMark)?;
        if self.marks.is_empty() {
            self.log.clear();
        }
        Ok(())
    }

    pub fn contains(&self, key: &K, value: &V) -> bool {
        self.map.get(key).is_some_and(|set| set.contains(value))
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Values associated with `key`, in order.
    pub fn values(&self, key: &K) -> impl Iterator<Item = &V> {
        self.map.get(key).into_iter().flat_map(|set| set.iter())
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.map.keys()
    }

    /// All pairs, ordered by key then value.
    pub fn entries(&self) -> impl Iterator<Item = (&K, &V)> {
        self.map
            .iter()
            .flat_map(|(k, set)| set.iter().map(move |v| (k, v)))
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.map.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn num_marks(&self) -> usize {
        self.marks.len()
    }

    fn raw_add(&mut self, key: K, value: V) -> Result<(), CheckpointError> {
        let set = self.map.entry(key.clone()).or_default();
        if set.contains(&value) {
            return Err(CheckpointError::DuplicateEntry(format!("{key:?} -> {value:?}")));
        }
        set.insert(value);
        Ok(())
    }

    fn raw_remove(&mut self, key: &K, value: &V) -> Result<(), CheckpointError> {
        let removed = match self.map.get_mut(key) {
            Some(set) => {
                let removed = set.remove(value);
                if set.is_empty() {
                    self.map.remove(key);
                }
                removed
            }
            None => false,
        };
        if !removed {
            return Err(CheckpointError::MissingEntry(format!("{key:?} -> {value:?}")));
        }
        Ok(())
    }
}

/// A set with the same mark/undo/commit discipline as [`CheckpointMultiMap`].
#[derive(Debug, Clone)]
pub struct CheckpointSet<T> {
    inner: CheckpointMultiMap<T, ()>,
}

impl<T> Default for CheckpointSet<T> {
    fn default() -> Self {
        CheckpointSet {
            inner: CheckpointMultiMap::default(),
        }
    }
}

impl<T: Ord + Clone + Debug> CheckpointSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: T) -> Result<(), CheckpointError> {
        self.inner.add(item, ())
    }

    pub fn remove(&mut self, item: &T) -> Result<(), CheckpointError> {
        self.inner.remove(item, &())
    }

    pub fn contains(&self, item: &T) -> bool {
        self.inner.contains_key(item)
    }

    pub fn mark(&mut self) {
        self.inner.mark();
    }

    pub fn undo_to_last_mark(&mut self) -> Result<(), CheckpointError> {
        self.inner.undo_to_last_mark()
    }

    pub fn commit(&mut self) -> Result<(), CheckpointError> {
        self.inner.commit()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.inner.keys()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn num_marks(&self) -> usize {
        self.inner.num_marks()
    }
}
