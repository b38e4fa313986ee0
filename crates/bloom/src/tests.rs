use super::*;
use std::io::Cursor;

// -------------------- Construction --------------------

#[test]
fn new_creates_valid_filter() {
    let bf = BloomFilter::new(100, 0.01);
    assert!(bf.num_bits() > 0);
    assert!(bf.num_probes() > 0);
    assert!(!bf.bits.is_empty());
}

#[test]
fn bits_per_key_sizing() {
    let bf = BloomFilter::with_bits_per_key(1000, 10.0);
    assert!(bf.num_bits() >= 10_000);
    // k = round(10 * ln 2) = 7
    assert_eq!(bf.num_probes(), 7);
}

#[test]
#[should_panic(expected = "expected_items must be > 0")]
fn new_panics_on_zero_items() {
    BloomFilter::new(0, 0.01);
}

#[test]
#[should_panic(expected = "false_positive_rate must be in (0, 1)")]
fn new_panics_on_one_fpr() {
    BloomFilter::new(100, 1.0);
}

#[test]
#[should_panic(expected = "bits_per_key must be > 0")]
fn panics_on_zero_bits_per_key() {
    BloomFilter::with_bits_per_key(100, 0.0);
}

// -------------------- Add / Contains --------------------

#[test]
fn added_key_is_found() {
    let mut bf = BloomFilter::new(100, 0.01);
    bf.add(b"hello");
    assert!(bf.contains(b"hello"));
}

#[test]
fn missing_key_is_not_found() {
    let bf = BloomFilter::new(100, 0.01);
    assert!(!bf.contains(b"hello"));
}

#[test]
fn many_keys_all_found() {
    let mut bf = BloomFilter::new(1000, 0.01);
    for i in 0..1000u64 {
        bf.add(&i.to_le_bytes());
    }
    for i in 0..1000u64 {
        assert!(bf.contains(&i.to_le_bytes()), "key {} should be found", i);
    }
}

#[test]
fn false_positive_rate_is_reasonable() {
    let n = 10_000;
    let fpr = 0.01;
    let mut bf = BloomFilter::new(n, fpr);

    for i in 0..n as u64 {
        bf.add(&i.to_le_bytes());
    }

    // Probe n keys that were never added.
    let mut false_positives = 0;
    let test_count = 10_000;
    for i in (n as u64)..(n as u64 + test_count) {
        if bf.contains(&i.to_le_bytes()) {
            false_positives += 1;
        }
    }

    let actual_fpr = false_positives as f64 / test_count as f64;
    // Allow up to 3x the target FPR (statistical variance).
    assert!(
        actual_fpr < fpr * 3.0,
        "FPR too high: {:.4} (target {:.4})",
        actual_fpr,
        fpr
    );
}

#[test]
fn more_bits_per_key_means_fewer_false_positives() {
    let n = 5_000;
    let count_fp = |bpk: f64| {
        let mut bf = BloomFilter::with_bits_per_key(n, bpk);
        for i in 0..n as u64 {
            bf.add(&i.to_le_bytes());
        }
        (n as u64..2 * n as u64)
            .filter(|i| bf.contains(&i.to_le_bytes()))
            .count()
    };

    let loose = count_fp(4.0);
    let tight = count_fp(14.0);
    assert!(
        tight < loose,
        "14 bpk should beat 4 bpk ({} vs {})",
        tight,
        loose
    );
}

#[test]
fn empty_key() {
    let mut bf = BloomFilter::new(10, 0.01);
    bf.add(b"");
    assert!(bf.contains(b""));
}

#[test]
fn binary_key() {
    let mut bf = BloomFilter::new(10, 0.01);
    let key = vec![0u8, 1, 2, 255, 254, 253];
    bf.add(&key);
    assert!(bf.contains(&key));
}

// -------------------- Serialization --------------------

#[test]
fn roundtrip_serialize_deserialize() {
    let mut bf = BloomFilter::new(500, 0.01);
    for i in 0..500u64 {
        bf.add(&i.to_le_bytes());
    }

    let mut buf = Vec::new();
    bf.write_to(&mut buf).unwrap();
    assert_eq!(buf.len(), bf.serialized_size());

    let mut cursor = Cursor::new(&buf);
    let bf2 = BloomFilter::read_from(&mut cursor).unwrap();

    assert_eq!(bf2.num_bits(), bf.num_bits());
    assert_eq!(bf2.num_probes(), bf.num_probes());
    assert_eq!(bf2.bits, bf.bits);

    for i in 0..500u64 {
        assert!(
            bf2.contains(&i.to_le_bytes()),
            "key {} missing after roundtrip",
            i
        );
    }
}

#[test]
fn deserialize_rejects_oversized_filter() {
    // Craft a header with bits_len = 256 MiB (exceeds the 128 MiB cap).
    let mut buf = Vec::new();
    buf.extend_from_slice(&64u64.to_le_bytes());
    buf.extend_from_slice(&3u32.to_le_bytes());
    buf.extend_from_slice(&(256 * 1024 * 1024u32).to_le_bytes());

    let mut cursor = Cursor::new(&buf);
    assert!(BloomFilter::read_from(&mut cursor).is_err());
}

// -------------------- Edge cases --------------------

#[test]
fn single_item_filter() {
    let mut bf = BloomFilter::new(1, 0.01);
    bf.add(b"only");
    assert!(bf.contains(b"only"));
}

#[test]
fn tiny_bits_per_key_still_works() {
    let mut bf = BloomFilter::with_bits_per_key(100, 0.5);
    bf.add(b"test");
    assert!(bf.contains(b"test"));
    assert_eq!(bf.num_probes(), 1);
}
