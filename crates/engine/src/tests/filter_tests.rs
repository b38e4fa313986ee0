use crate::filter::{FilterContext, FilterPolicy};
use crate::BloomFilterPolicy;

#[test]
fn create_filter_matches_all_added_keys() {
    let policy = BloomFilterPolicy::new(10.0);
    let keys: Vec<Vec<u8>> = (0..500u32).map(|i| format!("key{i}").into_bytes()).collect();
    let refs: Vec<&[u8]> = keys.iter().map(|k| k.as_slice()).collect();

    let filter = policy.create_filter(&refs);
    for key in &keys {
        assert!(policy.key_may_match(key, &filter), "no false negatives");
    }
}

#[test]
fn absent_keys_mostly_miss() {
    let policy = BloomFilterPolicy::new(10.0);
    let keys: Vec<Vec<u8>> = (0..2000u32).map(|i| format!("in{i}").into_bytes()).collect();
    let refs: Vec<&[u8]> = keys.iter().map(|k| k.as_slice()).collect();
    let filter = policy.create_filter(&refs);

    let false_positives = (0..2000u32)
        .filter(|i| policy.key_may_match(format!("out{i}").as_bytes(), &filter))
        .count();
    // 10 bits/key gives roughly 1% FPR; allow generous slack.
    assert!(
        false_positives < 120,
        "too many false positives: {}",
        false_positives
    );
}

#[test]
fn builder_context_is_accepted_for_any_level() {
    let policy = BloomFilterPolicy::new(8.0);
    for level in [None, Some(0), Some(7), Some(42)] {
        let mut builder = policy.builder_for_context(&FilterContext {
            level_at_creation: level,
        });
        builder.add_key(b"probe");
        let filter = builder.finish();
        assert!(policy.key_may_match(b"probe", &filter));
    }
}

#[test]
fn garbage_filter_block_fails_open() {
    let policy = BloomFilterPolicy::new(8.0);
    assert!(
        policy.key_may_match(b"anything", b"nonsense"),
        "unparseable filter must not rule keys out"
    );
}

#[test]
fn policy_reports_its_name() {
    assert_eq!(BloomFilterPolicy::new(4.0).name(), "BloomFilterPolicy");
}
