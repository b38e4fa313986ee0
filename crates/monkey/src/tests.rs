use super::*;
use engine::FilterPolicy as _;

const LN2_SQ: f64 = std::f64::consts::LN_2 * std::f64::consts::LN_2;

// -------------------- Allocation --------------------

#[test]
fn shallow_levels_get_tighter_filters() {
    // h=5, T=10, L=4: rates must strictly increase with depth, every rate
    // in (0, 1), every budget positive.
    let policy = MonkeyFilterPolicy::new(5.0, 10.0, 4, 1);

    for level in 1..=4 {
        let fpr = policy.optimal_false_positive_rate(level);
        assert!(fpr > 0.0 && fpr < 1.0, "fpr({}) = {}", level, fpr);
        assert!(policy.bits_per_element(level) > 0.0);
    }
    for level in 1..4 {
        assert!(
            policy.optimal_false_positive_rate(level)
                < policy.optimal_false_positive_rate(level + 1),
            "fpr must grow with depth"
        );
    }
    for level in 1..4 {
        assert!(
            policy.bits_per_element(level) > policy.bits_per_element(level + 1),
            "bits must shrink with depth"
        );
    }
}

#[test]
fn fpr_sum_is_bounded_by_uniform_allocation() {
    // sum_l fpr_opt(l) <= L * e^(-h (ln2)^2) for a spread of shapes.
    for (h, t, l) in [(5.0, 10.0, 4), (8.0, 4.0, 6), (10.0, 2.0, 8), (3.0, 6.0, 3)] {
        let policy = MonkeyFilterPolicy::new(h, t, l, 1);
        let sum: f64 = (1..=l).map(|lv| policy.optimal_false_positive_rate(lv)).sum();
        let uniform = l as f64 * (-h * LN2_SQ).exp();
        assert!(
            sum <= uniform + 1e-12,
            "h={} T={} L={}: sum {} exceeds uniform bound {}",
            h,
            t,
            l,
            sum,
            uniform
        );
    }
}

#[test]
fn bpe_matches_the_rate_it_was_derived_from() {
    let policy = MonkeyFilterPolicy::new(7.0, 4.0, 5, 2);
    for level in 1..=5 {
        let fpr = policy.optimal_false_positive_rate(level);
        let bpe = policy.bits_per_element(level);
        assert!((bpe - (-fpr.ln() / LN2_SQ)).abs() < 1e-9);
    }
}

#[test]
fn degenerate_shape_clamps_instead_of_propagating() {
    // T=2, L=1, tiny budget: the raw formula exceeds 1. The policy must
    // clamp into (0, 1) and keep bpe positive.
    let policy = MonkeyFilterPolicy::new(0.5, 2.0, 1, 1);
    let fpr = policy.optimal_false_positive_rate(1);
    assert!(fpr > 0.0 && fpr < 1.0, "clamped fpr: {}", fpr);
    assert!(policy.bits_per_element(1) > 0.0);
}

// -------------------- Policy surface --------------------

#[test]
fn name_is_monkey() {
    let policy = MonkeyFilterPolicy::new(5.0, 4.0, 3, 1);
    assert_eq!(policy.name(), "Monkey");
}

#[test]
fn builders_track_the_level_hint() {
    let policy = MonkeyFilterPolicy::new(5.0, 4.0, 3, 1);

    // A shallow-level filter spends more bits than a deep-level filter
    // over the same keys.
    let filter_for = |physical: usize| {
        let mut builder = policy.builder_for_context(&FilterContext {
            level_at_creation: Some(physical),
        });
        for i in 0..1000u32 {
            builder.add_key(format!("key{i}").as_bytes());
        }
        builder.finish()
    };

    // Physical 0 -> fluid 1 (tightest); physical 6 -> fluid 3 (loosest).
    let shallow = filter_for(0);
    let deep = filter_for(6);
    assert!(
        shallow.len() > deep.len(),
        "shallow filter ({} B) should outweigh deep filter ({} B)",
        shallow.len(),
        deep.len()
    );
}

#[test]
fn out_of_range_hint_falls_back_to_default() {
    let policy = MonkeyFilterPolicy::new(5.0, 4.0, 2, 1);

    let build = |ctx: FilterContext| {
        let mut builder = policy.builder_for_context(&ctx);
        for i in 0..500u32 {
            builder.add_key(format!("key{i}").as_bytes());
        }
        builder.finish()
    };

    // Physical 40 maps past fluid level 2; expect the default budget,
    // byte-identical in size to the no-hint path.
    let unhinted = build(FilterContext {
        level_at_creation: None,
    });
    let out_of_range = build(FilterContext {
        level_at_creation: Some(40),
    });
    assert_eq!(unhinted.len(), out_of_range.len());
}

#[test]
fn filters_built_per_level_still_match_their_keys() {
    let policy = MonkeyFilterPolicy::new(5.0, 4.0, 3, 1);
    for physical in [0usize, 1, 2, 4, 6] {
        let mut builder = policy.builder_for_context(&FilterContext {
            level_at_creation: Some(physical),
        });
        builder.add_key(b"present");
        let filter = builder.finish();
        assert!(
            policy.key_may_match(b"present", &filter),
            "physical level {}",
            physical
        );
    }
}

// -------------------- Mapping --------------------

#[test]
fn physical_to_fluid_mapping_follows_the_slot_rule() {
    let policy = MonkeyFilterPolicy::new(5.0, 4.0, 8, 1);
    // K=1: fluid 1 owns physical 0..=3, fluid 2 owns 4..=5, fluid 3 owns
    // 6..=7.
    assert_eq!(policy.fluid_level_of(0), 1);
    assert_eq!(policy.fluid_level_of(1), 1);
    assert_eq!(policy.fluid_level_of(2), 1);
    assert_eq!(policy.fluid_level_of(3), 1);
    assert_eq!(policy.fluid_level_of(4), 2);
    assert_eq!(policy.fluid_level_of(5), 2);
    assert_eq!(policy.fluid_level_of(6), 3);

    let wide = MonkeyFilterPolicy::new(5.0, 4.0, 8, 3);
    // K=3: ceil((p-1)/4).
    assert_eq!(wide.fluid_level_of(2), 1);
    assert_eq!(wide.fluid_level_of(5), 1);
    assert_eq!(wide.fluid_level_of(6), 2);
    assert_eq!(wide.fluid_level_of(9), 2);
    assert_eq!(wide.fluid_level_of(10), 3);
}
