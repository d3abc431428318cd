//! Composite keys for join indexing and grouping.
//!
//! A key is extracted from a tuple once, and its hash is captured at that
//! moment. As long as the key sits in an index or group map its hash and
//! equality must not change; [`IndexKey::rehash`] lets assertion mode check
//! that the captured hash still matches the underlying values.

use std::any::Any;
use std::fmt::{self, Debug};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::rc::Rc;

use smallvec::SmallVec;

use crate::fact::Fact;

/// One component of a composite [`IndexKey`].
///
/// Implemented for free by every `Hash + Eq + Clone + Debug + 'static` type
/// via the blanket impl, so key extractors can return plain values
/// (`i64`, `String`, domain ids) without ceremony.
pub trait KeyPart: Debug {
    /// Hash of the part's current value.
    fn part_hash(&self) -> u64;

    /// Equality against another part of possibly different concrete type.
    fn part_eq(&self, other: &dyn KeyPart) -> bool;

    /// Downcasting access for `part_eq` implementations.
    fn part_any(&self) -> &dyn Any;

    /// The part as a standalone fact (used for group output tuples).
    fn to_fact(&self) -> Rc<dyn Fact>;
}

impl<T> KeyPart for T
where
    T: Hash + Eq + Clone + Debug + 'static,
{
    fn part_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    fn part_eq(&self, other: &dyn KeyPart) -> bool {
        other.part_any().downcast_ref::<T>() == Some(self)
    }

    fn part_any(&self) -> &dyn Any {
        self
    }

    fn to_fact(&self) -> Rc<dyn Fact> {
        Rc::new(self.clone())
    }
}

/// An extracted, hash-stable composite key.
///
/// The hash is computed once at construction; `Hash` then writes only the
/// captured value, so lookups never re-run user hashing code on the hot
/// path. Equality still compares the parts themselves.
#[derive(Clone)]
pub struct IndexKey {
    parts: SmallVec<[Rc<dyn KeyPart>; 2]>,
    hash: u64,
}

impl IndexKey {
    /// Builds a key from its parts, capturing the combined hash now.
    pub fn new(parts: SmallVec<[Rc<dyn KeyPart>; 2]>) -> Self {
        let hash = combine(&parts);
        IndexKey { parts, hash }
    }

    /// The empty key: every tuple maps to it (singleton grouping,
    /// unindexed cross joins).
    pub fn unit() -> Self {
        IndexKey::new(SmallVec::new())
    }

    /// Key over a single part.
    pub fn single(part: Rc<dyn KeyPart>) -> Self {
        let mut parts = SmallVec::new();
        parts.push(part);
        IndexKey::new(parts)
    }

    /// The hash captured when the key was extracted.
    pub fn captured_hash(&self) -> u64 {
        self.hash
    }

    /// Recomputes the hash from the parts' current values.
    pub fn rehash(&self) -> u64 {
        combine(&self.parts)
    }

    /// True if a part's hash changed since the key was extracted.
    pub fn has_drifted(&self) -> bool {
        self.rehash() != self.hash
    }

    /// The parts rendered as standalone facts, in extraction order.
    pub fn part_facts(&self) -> impl Iterator<Item = Rc<dyn Fact>> + '_ {
        self.parts.iter().map(|p| p.to_fact())
    }
}

fn combine(parts: &[Rc<dyn KeyPart>]) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write_usize(parts.len());
    for part in parts {
        hasher.write_u64(part.part_hash());
    }
    hasher.finish()
}

impl Hash for IndexKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.parts.len() == other.parts.len()
            && self
                .parts
                .iter()
                .zip(other.parts.iter())
                .all(|(a, b)| a.part_eq(b.as_ref()))
    }
}

impl Eq for IndexKey {}

impl Debug for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.parts.iter()).finish()
    }
}
