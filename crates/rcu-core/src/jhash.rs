//! Jenkins "one-at-a-time" hash.
//!
//! The production `rcu-core` hash table treats this as a black box: any
//! function with the signature `fn(&[u8], u32) -> u32` works as a bucket
//! selector. This implementation is provided so the crate is runnable
//! standalone and so tests have a deterministic, well-distributed default.

/// Hash `bytes` seeded with `seed`, Jenkins one-at-a-time style.
#[must_use]
pub fn jhash(bytes: &[u8], seed: u32) -> u32 {
    let mut hash = seed;
    for &b in bytes {
        hash = hash.wrapping_add(u32::from(b));
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
    }
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash = hash.wrapping_add(hash << 15);
    hash
}

/// Hash a machine word the way `ht_jhash` does: by the address of the word
/// itself rather than by dereferencing it, since `rcu-core` keys are
/// word-sized handles compared by identity, never by content.
#[must_use]
pub fn jhash_word(key: usize, seed: u32) -> u32 {
    jhash(&key.to_ne_bytes(), seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(jhash_word(42, 0), jhash_word(42, 0));
    }

    #[test]
    fn seed_changes_output() {
        assert_ne!(jhash_word(42, 0), jhash_word(42, 1));
    }

    #[test]
    fn distinct_keys_usually_differ() {
        assert_ne!(jhash_word(1, 0), jhash_word(2, 0));
    }
}
