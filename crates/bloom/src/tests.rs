use super::*;

// -------------------- Membership --------------------

#[test]
fn inserted_keys_are_reported_present() {
    let mut bf = BloomFilter::new(100, 0.01);
    bf.insert(b"apple");
    bf.insert(b"banana");
    bf.insert(b"cherry");

    assert!(bf.may_contain(b"apple"));
    assert!(bf.may_contain(b"banana"));
    assert!(bf.may_contain(b"cherry"));
}

#[test]
fn empty_filter_contains_nothing() {
    let bf = BloomFilter::new(100, 0.01);
    assert!(!bf.may_contain(b"anything"));
    assert!(!bf.may_contain(b""));
}

#[test]
fn no_false_negatives_over_many_keys() {
    let n = 10_000usize;
    let mut bf = BloomFilter::new(n, 0.01);
    for i in 0..n {
        bf.insert(format!("key-{}", i).as_bytes());
    }
    for i in 0..n {
        assert!(
            bf.may_contain(format!("key-{}", i).as_bytes()),
            "false negative for key-{}",
            i
        );
    }
}

#[test]
fn false_positive_rate_is_reasonable() {
    let n = 10_000usize;
    let mut bf = BloomFilter::new(n, 0.01);
    for i in 0..n {
        bf.insert(format!("member-{}", i).as_bytes());
    }

    let mut false_positives = 0usize;
    let probes = 10_000usize;
    for i in 0..probes {
        if bf.may_contain(format!("stranger-{}", i).as_bytes()) {
            false_positives += 1;
        }
    }

    // Target rate is 1%; allow generous slack for hash quality.
    let rate = false_positives as f64 / probes as f64;
    assert!(rate < 0.05, "false positive rate too high: {}", rate);
}

#[test]
fn insert_by_hash_pair_matches_insert_by_key() {
    let mut by_key = BloomFilter::new(64, 0.01);
    let mut by_hash = BloomFilter::new(64, 0.01);

    for key in [b"a".as_slice(), b"bb", b"ccc"] {
        by_key.insert(key);
        by_hash.insert_hash(hash_pair(key));
    }

    assert_eq!(by_key.to_bytes(), by_hash.to_bytes());
}

// -------------------- Sizing --------------------

#[test]
fn bit_count_is_byte_aligned() {
    for capacity in [1usize, 7, 100, 5000] {
        let bf = BloomFilter::new(capacity, 0.01);
        assert_eq!(bf.bit_count() % 8, 0);
        assert!(bf.bit_count() > 0);
    }
}

#[test]
fn hash_count_is_clamped() {
    // Very tight fp rate would push k above the cap.
    let tight = BloomFilter::new(10, 1e-9);
    assert!(tight.hash_count() <= 10);

    // Very loose fp rate pushes k toward 0; it must stay at least 1.
    let loose = BloomFilter::new(1000, 0.99);
    assert!(loose.hash_count() >= 1);
}

#[test]
fn zero_capacity_produces_a_usable_filter() {
    let mut bf = BloomFilter::new(0, 0.01);
    assert!(bf.bit_count() >= 8);
    bf.insert(b"k");
    assert!(bf.may_contain(b"k"));
}

// -------------------- Serialization --------------------

#[test]
fn serialize_roundtrip_preserves_membership() {
    let mut bf = BloomFilter::new(500, 0.01);
    for i in 0..500 {
        bf.insert(format!("k{}", i).as_bytes());
    }

    let bytes = bf.to_bytes();
    let restored = BloomFilter::from_bytes(&bytes).expect("deserialize");

    assert_eq!(restored.bit_count(), bf.bit_count());
    assert_eq!(restored.hash_count(), bf.hash_count());
    for i in 0..500 {
        assert!(restored.may_contain(format!("k{}", i).as_bytes()));
    }
}

#[test]
fn serialized_layout_is_bit_count_hash_count_bits() {
    let mut bf = BloomFilter::new(10, 0.1);
    bf.insert(b"x");
    let bytes = bf.to_bytes();

    let bit_count = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let hash_count = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    assert_eq!(bit_count, bf.bit_count());
    assert_eq!(hash_count, bf.hash_count());
    assert_eq!(bytes.len(), 8 + (bit_count as usize + 7) / 8);
}

#[test]
fn from_bytes_rejects_short_input() {
    assert!(BloomFilter::from_bytes(&[]).is_none());
    assert!(BloomFilter::from_bytes(&[1, 2, 3]).is_none());

    // Header claims more bits than the slice carries.
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&1024u32.to_le_bytes());
    bytes.extend_from_slice(&4u32.to_le_bytes());
    bytes.extend_from_slice(&[0u8; 4]);
    assert!(BloomFilter::from_bytes(&bytes).is_none());
}

#[test]
fn from_bytes_rejects_degenerate_parameters() {
    let mut zero_bits = Vec::new();
    zero_bits.extend_from_slice(&0u32.to_le_bytes());
    zero_bits.extend_from_slice(&4u32.to_le_bytes());
    assert!(BloomFilter::from_bytes(&zero_bits).is_none());

    let mut zero_hashes = Vec::new();
    zero_hashes.extend_from_slice(&64u32.to_le_bytes());
    zero_hashes.extend_from_slice(&0u32.to_le_bytes());
    zero_hashes.extend_from_slice(&[0u8; 8]);
    assert!(BloomFilter::from_bytes(&zero_hashes).is_none());
}

// -------------------- Hashing --------------------

#[test]
fn hash_pair_is_deterministic_and_spread() {
    let (a1, a2) = hash_pair(b"key");
    let (b1, b2) = hash_pair(b"key");
    assert_eq!((a1, a2), (b1, b2));

    let (c1, c2) = hash_pair(b"other");
    assert!(a1 != c1 || a2 != c2);
}
