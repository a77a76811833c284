//! Opaque identifiers for entities and components.
//!
//! An [`Identifier`] is a string token. Callers may pick their own (`"e1"`) or
//! draw fresh ones from an [`IdGenerator`]. The default generator,
//! [`RandomIdGenerator`], formats 128 random bits as a version-4 style UUID.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifier
// ---------------------------------------------------------------------------

/// Identifier of an entity or a component.
///
/// Identifiers are compared by value. The registry guarantees that no two live
/// entities (or two live components) share one. Lookups throughout the crate
/// take `&str`, which an `&Identifier` coerces to.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Wrap an existing token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(token: &str) -> Self {
        Self(token.to_owned())
    }
}

impl From<String> for Identifier {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&Identifier> for Identifier {
    fn from(id: &Identifier) -> Self {
        id.clone()
    }
}

impl PartialEq<str> for Identifier {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Identifier {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Deref for Identifier {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// IdGenerator
// ---------------------------------------------------------------------------

/// Source of fresh identifiers.
///
/// Generators are allowed to collide with live identifiers; the manager checks
/// and retries up to
/// [`ManagerConfig::max_id_attempts`](crate::manager::ManagerConfig::max_id_attempts)
/// times.
pub trait IdGenerator {
    /// Produce the next candidate identifier.
    fn next_id(&mut self) -> Identifier;
}

impl<F> IdGenerator for F
where
    F: FnMut() -> Identifier,
{
    fn next_id(&mut self) -> Identifier {
        self()
    }
}

// ---------------------------------------------------------------------------
// RandomIdGenerator
// ---------------------------------------------------------------------------

/// UUID-like identifiers drawn from a PCG RNG.
///
/// Seeded generators are fully deterministic, which keeps test runs and
/// replays reproducible.
#[derive(Debug, Clone)]
pub struct RandomIdGenerator {
    rng: Pcg64,
}

impl RandomIdGenerator {
    /// A generator seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: Pcg64::from_entropy(),
        }
    }

    /// A deterministic generator.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Pcg64::seed_from_u64(seed),
        }
    }
}

impl Default for RandomIdGenerator {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl IdGenerator for RandomIdGenerator {
    fn next_id(&mut self) -> Identifier {
        let bits: u128 = self.rng.gen();
        // Version nibble (4) and RFC 4122 variant bits (10).
        let bits = (bits & !(0xF << 76)) | (0x4 << 76);
        let bits = (bits & !(0x3 << 62)) | (0x2 << 62);
        Identifier(format!(
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (bits >> 96) as u32,
            (bits >> 80) as u16,
            (bits >> 64) as u16,
            (bits >> 48) as u16,
            bits & 0xFFFF_FFFF_FFFF,
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn random_ids_have_uuid_shape() {
        let mut generator = RandomIdGenerator::seeded(7);
        let id = generator.next_id();
        let groups: Vec<&str> = id.as_str().split('-').collect();
        let lengths: Vec<usize> = groups.iter().map(|g| g.len()).collect();
        assert_eq!(lengths, vec![8, 4, 4, 4, 12]);
        assert!(groups[2].starts_with('4'), "version nibble in {id}");
        assert!(
            matches!(groups[3].chars().next(), Some('8' | '9' | 'a' | 'b')),
            "variant bits in {id}"
        );
    }

    #[test]
    fn seeded_generators_repeat() {
        let mut a = RandomIdGenerator::seeded(42);
        let mut b = RandomIdGenerator::seeded(42);
        for _ in 0..10 {
            assert_eq!(a.next_id(), b.next_id());
        }
    }

    #[test]
    fn random_ids_do_not_collide() {
        let mut generator = RandomIdGenerator::seeded(1);
        let ids: HashSet<Identifier> = (0..1_000).map(|_| generator.next_id()).collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn closures_are_generators() {
        let mut n = 0;
        let mut generator = move || {
            n += 1;
            Identifier::new(format!("c{n}"))
        };
        assert_eq!(generator.next_id(), Identifier::from("c1"));
        assert_eq!(generator.next_id().as_str(), "c2");
    }
}
