//! Content fingerprints for selected values.
//!
//! Backends may hand back freshly built values on every read even when
//! nothing changed, so identity says nothing about meaning. A [`Fingerprint`]
//! is a 256-bit blake3 digest of everything a value feeds into
//! [`std::hash::Hash`]. Std containers, `Box` and `Rc` hash their contents,
//! so the fingerprint is structural: equal values give equal fingerprints no
//! matter where they live.
//!
//! # Limitations
//!
//! - Types without a `Hash` impl (`f64`, `HashMap`) need a wrapper or a
//!   different representation (`f64::to_bits`, `BTreeMap`).
//! - A value whose `Hash` walks an `Rc` cycle never terminates. Selectors
//!   should return plain data.
//! - `usize`/`isize` hash in native byte order, so fingerprints are only
//!   comparable within one build target. They are never sent over the wire.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Opaque content token for a selected value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint of `value`. Shorthand for [`fingerprint`].
    pub fn of<T: Hash + ?Sized>(value: &T) -> Self {
        fingerprint(value)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "Fingerprint({})", &hex[..12])
    }
}

/// Compute the content fingerprint of `value`. Never mutates its input.
pub fn fingerprint<T: Hash + ?Sized>(value: &T) -> Fingerprint {
    let mut hasher = DigestHasher::default();
    value.hash(&mut hasher);
    Fingerprint(*hasher.digest.finalize().as_bytes())
}

/// Adapts blake3 to `std::hash::Hasher` so any `Hash` type can be digested.
#[derive(Default)]
struct DigestHasher {
    digest: blake3::Hasher,
}

impl Hasher for DigestHasher {
    fn write(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }

    fn finish(&self) -> u64 {
        let hash = self.digest.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    #[derive(Hash)]
    struct Board {
        title: String,
        cells: Vec<Option<u8>>,
        owners: BTreeMap<String, u32>,
    }

    fn board(title: &str) -> Board {
        let mut owners = BTreeMap::new();
        owners.insert("alice".to_string(), 3);
        owners.insert("bob".to_string(), 1);
        Board {
            title: title.to_string(),
            cells: vec![Some(1), None, Some(2)],
            owners,
        }
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(fingerprint(&board("x")), fingerprint(&board("x")));
        assert_ne!(fingerprint(&board("x")), fingerprint(&board("y")));
    }

    #[test]
    fn test_identity_does_not_matter() {
        let a = Rc::new(vec![1, 2, 3]);
        let b = Rc::new(vec![1, 2, 3]);
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a), fingerprint(&vec![1, 2, 3]));
    }

    #[test]
    fn test_nesting_is_not_ambiguous() {
        let split = vec!["ab".to_string(), "c".to_string()];
        let joined = vec!["a".to_string(), "bc".to_string()];
        assert_ne!(fingerprint(&split), fingerprint(&joined));

        assert_ne!(fingerprint(&Some(0u32)), fingerprint(&None::<u32>));
    }

    #[test]
    fn test_unsized_input() {
        let owned = String::from("hello");
        assert_eq!(fingerprint("hello"), fingerprint(owned.as_str()));
        assert_eq!(fingerprint(&[1u8, 2][..]), fingerprint(&[1u8, 2][..]));
    }

    #[test]
    fn test_hex_and_debug() {
        let fp = Fingerprint::of(&42u64);
        assert_eq!(fp.to_hex().len(), 64);
        assert_eq!(fp.as_bytes().len(), 32);
        assert!(format!("{:?}", fp).starts_with("Fingerprint("));
    }

    proptest! {
        #[test]
        fn prop_fingerprint_is_idempotent(values in proptest::collection::vec(any::<i64>(), 0..64), label in ".*") {
            let value = (values, label);
            prop_assert_eq!(fingerprint(&value), fingerprint(&value));
        }

        #[test]
        fn prop_clones_share_fingerprint(values in proptest::collection::btree_map(any::<u16>(), any::<bool>(), 0..32)) {
            let copy = values.clone();
            prop_assert_eq!(fingerprint(&values), fingerprint(&copy));
        }

        #[test]
        fn prop_distinct_integers_differ(a in any::<u64>(), b in any::<u64>()) {
            prop_assume!(a != b);
            prop_assert_ne!(fingerprint(&a), fingerprint(&b));
        }
    }
}
