//! Keyed bucket indexes accelerating join matching.

use std::collections::HashMap;

use scorenet_core::{IndexKey, Result, ScorenetError};

use crate::tuple::TupleId;

const NO_CANDIDATES: &[TupleId] = &[];

/// One side's index of a join node.
///
/// `Hash` buckets tuples by their extracted [`IndexKey`] for O(1)-ish
/// candidate lookup. `Scan` keeps a flat list and returns every tuple as a
/// candidate; the join then re-checks key equality itself, which keeps the
/// two variants behaviorally indistinguishable.
#[derive(Debug)]
pub enum JoinIndex {
    Hash(HashMap<IndexKey, Vec<TupleId>>),
    Scan(Vec<TupleId>),
}

impl JoinIndex {
    pub fn hashed() -> Self {
        JoinIndex::Hash(HashMap::new())
    }

    pub fn scanning() -> Self {
        JoinIndex::Scan(Vec::new())
    }

    /// Indexes `tuple` under `key`.
    pub fn insert(&mut self, key: &IndexKey, tuple: TupleId) {
        match self {
            JoinIndex::Hash(buckets) => buckets.entry(key.clone()).or_default().push(tuple),
            JoinIndex::Scan(all) => all.push(tuple),
        }
    }

    /// Removes `tuple` from the bucket it was indexed under.
    ///
    /// The key must be the one captured at indexing time; a missing entry is
    /// an internal invariant breach, not a caller error.
    pub fn remove(&mut self, key: &IndexKey, tuple: TupleId) -> Result<()> {
        let list = match self {
            JoinIndex::Hash(buckets) => buckets.get_mut(key).ok_or_else(|| {
                ScorenetError::Internal(format!("no index bucket for key {key:?}"))
            })?,
            JoinIndex::Scan(all) => all,
        };
        let pos = list.iter().position(|t| *t == tuple).ok_or_else(|| {
            ScorenetError::Internal(format!("tuple {tuple:?} not indexed under {key:?}"))
        })?;
        list.swap_remove(pos);
        if let JoinIndex::Hash(buckets) = self {
            if buckets.get(key).is_some_and(Vec::is_empty) {
                buckets.remove(key);
            }
        }
        Ok(())
    }

    /// Tuples that may match `key`; exact for `Hash`, everything for `Scan`.
    pub fn candidates(&self, key: &IndexKey) -> &[TupleId] {
        match self {
            JoinIndex::Hash(buckets) => buckets.get(key).map_or(NO_CANDIDATES, Vec::as_slice),
            JoinIndex::Scan(all) => all,
        }
    }

    /// Number of indexed tuples on this side.
    pub fn len(&self) -> usize {
        match self {
            JoinIndex::Hash(buckets) => buckets.values().map(Vec::len).sum(),
            JoinIndex::Scan(all) => all.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::TuplePool;
    use scorenet_core::IndexKey;
    use smallvec::smallvec;
    use std::rc::Rc;

    fn key(v: i64) -> IndexKey {
        IndexKey::single(Rc::new(v))
    }

    #[test]
    fn hash_index_buckets_by_key() {
        let mut pool = TuplePool::new();
        let a = pool.create(smallvec![], 0);
        let b = pool.create(smallvec![], 0);
        let mut index = JoinIndex::hashed();
        index.insert(&key(1), a);
        index.insert(&key(2), b);
        assert_eq!(index.candidates(&key(1)), &[a]);
        assert_eq!(index.candidates(&key(2)), &[b]);
        assert!(index.candidates(&key(3)).is_empty());
    }

    #[test]
    fn remove_drops_empty_bucket() {
        let mut pool = TuplePool::new();
        let a = pool.create(smallvec![], 0);
        let mut index = JoinIndex::hashed();
        index.insert(&key(1), a);
        index.remove(&key(1), a).unwrap();
        assert!(index.is_empty());
        assert!(index.remove(&key(1), a).is_err());
    }

    #[test]
    fn scan_index_returns_everything() {
        let mut pool = TuplePool::new();
        let a = pool.create(smallvec![], 0);
        let b = pool.create(smallvec![], 0);
        let mut index = JoinIndex::scanning();
        index.insert(&key(1), a);
        index.insert(&key(2), b);
        assert_eq!(index.candidates(&key(1)), &[a, b]);
    }
}
