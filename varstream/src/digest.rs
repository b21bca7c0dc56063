//! Deterministic 128-bit schema digests.
//!
//! Hash-mode metadata carries a digest of the property/field names (and, for
//! enums, the key/value bindings) instead of the full tables. The role only
//! needs collision resistance between honest schemas, so a truncated BLAKE3
//! digest stands in for a cryptographic one; both ends of a connection must
//! agree on the function.

use blake3::Hasher;

use crate::registry::EnumKey;

/// Size of a schema digest on the wire.
pub const DIGEST_LEN: usize = 16;

/// A 128-bit schema digest.
pub type Digest = [u8; DIGEST_LEN];

fn finish(hasher: &Hasher) -> Digest {
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&hasher.finalize().as_bytes()[..DIGEST_LEN]);
    digest
}

/// Digest over NUL-terminated names, in order.
#[must_use]
pub fn name_digest<'a>(names: impl IntoIterator<Item = &'a str>) -> Digest {
    let mut hasher = Hasher::new();
    for name in names {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
    }
    finish(&hasher)
}

/// Digest over enum keys: NUL-terminated name, then the value as a
/// little-endian 32-bit integer.
#[must_use]
pub fn enum_digest(keys: &[EnumKey]) -> Digest {
    let mut hasher = Hasher::new();
    for key in keys {
        hasher.update(key.name.as_bytes());
        hasher.update(&[0]);
        hasher.update(&key.value.to_le_bytes());
    }
    finish(&hasher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_digest_is_stable() {
        let a = name_digest(["x", "y"]);
        let b = name_digest(["x", "y"]);
        assert_eq!(a, b);
    }

    #[test]
    fn name_digest_is_order_sensitive() {
        assert_ne!(name_digest(["x", "y"]), name_digest(["y", "x"]));
    }

    #[test]
    fn name_digest_terminators_prevent_joins() {
        // "ab" + "c" must not collide with "a" + "bc".
        assert_ne!(name_digest(["ab", "c"]), name_digest(["a", "bc"]));
    }

    #[test]
    fn empty_digest_differs_from_any_name() {
        assert_ne!(name_digest([]), name_digest([""]));
    }

    #[test]
    fn enum_digest_covers_values() {
        let a = enum_digest(&[EnumKey::new("On", 1)]);
        let b = enum_digest(&[EnumKey::new("On", 2)]);
        assert_ne!(a, b);
    }

    #[test]
    fn enum_digest_covers_names() {
        let a = enum_digest(&[EnumKey::new("On", 1)]);
        let b = enum_digest(&[EnumKey::new("Off", 1)]);
        assert_ne!(a, b);
    }
}
