//! Bob Jenkins' [`lookup3`][0] hash functions.
//!
//! Index headers, entry payloads, and tail pages all carry lookup3 digests;
//! byte-for-byte fidelity to the reference implementation is required for
//! every verification step during storage open. These functions are not
//! suitable for cryptographic purposes.
//!
//! [0]: https://www.burtleburtle.net/bob/c/lookup3.c

#[inline]
fn word(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Mix 3 `u32` state words reversibly.
fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(4);
    *c = c.wrapping_add(*b);

    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(6);
    *a = a.wrapping_add(*c);

    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(8);
    *b = b.wrapping_add(*a);

    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(16);
    *c = c.wrapping_add(*b);

    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(19);
    *a = a.wrapping_add(*c);

    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(4);
    *b = b.wrapping_add(*a);
}

/// Final avalanche of the 3 state words.
fn final_mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(14));

    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(11));

    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(25));

    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(16));

    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(4));

    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(14));

    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(24));
}

/// Hash a variable-length key into a single `u32`.
pub fn hashlittle(data: &[u8], initval: u32) -> u32 {
    let mut pc = initval;
    let mut pb = 0;
    hashlittle2(data, &mut pc, &mut pb);
    pc
}

/// Produce two 32-bit hash values, reading `data` as little-endian `u32`
/// triples.
///
/// `pc` and `pb` seed the state on entry and receive the primary and
/// secondary hash on exit, so repeated calls chain: feeding records through
/// one at a time yields an order-sensitive accumulated digest. Index entry
/// payloads are verified exactly that way.
pub fn hashlittle2(data: &[u8], pc: &mut u32, pb: &mut u32) {
    let mut a = 0xdead_beef_u32
        .wrapping_add(data.len() as u32)
        .wrapping_add(*pc);
    let mut b = a;
    let mut c = a.wrapping_add(*pb);

    if data.is_empty() {
        *pc = c;
        *pb = b;
        return;
    }

    let mut rest = data;
    while rest.len() > 12 {
        a = a.wrapping_add(word(rest, 0));
        b = b.wrapping_add(word(rest, 4));
        c = c.wrapping_add(word(rest, 8));
        mix(&mut a, &mut b, &mut c);
        rest = &rest[12..];
    }

    // Trailing 1..=12 bytes. The reference implementation reads past the key
    // with the missing high bytes treated as zero; copying into a zeroed
    // block gives the same result without the unaligned reads.
    let mut tail = [0u8; 12];
    tail[..rest.len()].copy_from_slice(rest);
    a = a.wrapping_add(word(&tail, 0));
    if rest.len() > 4 {
        b = b.wrapping_add(word(&tail, 4));
    }
    if rest.len() > 8 {
        c = c.wrapping_add(word(&tail, 8));
    }
    final_mix(&mut a, &mut b, &mut c);

    *pc = c;
    *pb = b;
}

/// Hash a file path the way root files do: uppercase, forward slashes
/// folded to backslashes, then both lookup3 words packed into a `u64` with
/// the primary hash in the high half.
pub fn hash_path(path: &str) -> u64 {
    let normalized = path.to_ascii_uppercase().replace('/', "\\");
    let mut pc = 0;
    let mut pb = 0;
    hashlittle2(normalized.as_bytes(), &mut pc, &mut pb);

    (u64::from(pc) << 32) | u64::from(pb)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference values from the self-test driver in lookup3.c.
    #[test]
    fn reference_vectors() {
        assert_eq!(hashlittle(b"", 0), 0xdeadbeef);
        assert_eq!(hashlittle(b"", 0xdeadbeef), 0xbd5b7dde);
        assert_eq!(hashlittle(b"Four score and seven years ago", 0), 0x17770551);
        assert_eq!(hashlittle(b"Four score and seven years ago", 1), 0xcd628161);
    }

    #[test]
    fn two_value_variant_matches_single() {
        let data = b"Four score and seven years ago";
        let mut pc = 0;
        let mut pb = 0;
        hashlittle2(data, &mut pc, &mut pb);
        assert_eq!(pc, hashlittle(data, 0));
    }

    #[test]
    fn chained_records_are_order_sensitive() {
        let first = [0x11u8; 18];
        let second = [0x22u8; 18];

        let mut hi = 0;
        let mut lo = 0;
        hashlittle2(&first, &mut hi, &mut lo);
        hashlittle2(&second, &mut hi, &mut lo);

        let mut hi_swapped = 0;
        let mut lo_swapped = 0;
        hashlittle2(&second, &mut hi_swapped, &mut lo_swapped);
        hashlittle2(&first, &mut hi_swapped, &mut lo_swapped);

        assert_ne!((hi, lo), (hi_swapped, lo_swapped));
    }

    #[test]
    fn path_hash_normalizes_case_and_slashes() {
        assert_eq!(
            hash_path("Interface/Icons/Foo.blp"),
            hash_path("interface\\icons\\FOO.BLP")
        );
        assert_ne!(hash_path("a"), hash_path("b"));
    }
}
