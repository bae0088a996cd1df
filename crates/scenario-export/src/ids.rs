//! Canonical string ids → the target's signed 32-bit id space.
//!
//! Base-10 integers inside `i32` range are kept verbatim. Anything else,
//! including integers that overflow `i32`, is hashed with xxh64 (seed 0) and
//! reduced modulo `2^31 - 1`, which is stable across processes and platforms.
//! Collisions between hashed ids are possible and are not detected.

use std::collections::HashMap;

use xxhash_rust::xxh64::xxh64;

use crate::diagnostics::{Diagnostic, IdKind, Reporter};

pub const HASH_MODULUS: u64 = (1 << 31) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolvedId {
    Numeric(i32),
    Hashed(i32),
}

impl ResolvedId {
    pub fn value(self) -> i32 {
        match self {
            ResolvedId::Numeric(v) | ResolvedId::Hashed(v) => v,
        }
    }

    pub fn is_hashed(self) -> bool {
        matches!(self, ResolvedId::Hashed(_))
    }
}

/// Pure two-branch resolution; no diagnostics.
pub fn resolve(id: &str) -> ResolvedId {
    match id.trim().parse::<i32>() {
        Ok(n) => ResolvedId::Numeric(n),
        Err(_) => ResolvedId::Hashed(stable_hash(id)),
    }
}

pub fn stable_hash(id: &str) -> i32 {
    // Always below 2^31 - 1, so the cast is lossless.
    (xxh64(id.as_bytes(), 0) % HASH_MODULUS) as i32
}

/// Resolve and report a diagnostic when the hashing branch was taken.
pub fn resolve_reported(kind: IdKind, id: &str, reporter: &Reporter<'_>) -> i32 {
    let resolved = resolve(id);
    if let ResolvedId::Hashed(value) = resolved {
        reporter.report(Diagnostic::HashedId {
            kind,
            raw: id.to_string(),
            resolved: value,
        });
    }
    resolved.value()
}

/// Position of every id in `ordered`, built in a single pass. The first
/// occurrence wins if an id repeats.
pub fn build_index<'a, I>(ordered: I) -> HashMap<&'a str, usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut index = HashMap::new();
    for (pos, id) in ordered.into_iter().enumerate() {
        index.entry(id).or_insert(pos);
    }
    index
}
