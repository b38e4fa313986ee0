use crate::model::*;
use engine::RunFileMetaData;

fn file(name: &str, size: u64, being_compacted: bool) -> RunFileMetaData {
    RunFileMetaData {
        name: name.to_string(),
        size_bytes: size,
        num_entries: 10,
        smallest_key: b"a".to_vec(),
        largest_key: b"z".to_vec(),
        being_compacted,
    }
}

// -------------------- Physical ↔ fluid mapping --------------------

#[test]
fn physical_levels_zero_and_one_map_to_fluid_zero() {
    for k in 1..=5 {
        assert_eq!(fluid_level_for_engine_level(0, k), 0);
        assert_eq!(fluid_level_for_engine_level(1, k), 0);
    }
}

#[test]
fn mapping_matches_the_ceil_formula() {
    // For physical p >= 2 the 1-indexed fluid level is
    // ceil((p - 1) / (K + 1)); our 0-based result is one less.
    for k in 1..=4usize {
        for p in 2..=40usize {
            let expected_1indexed = (p - 1).div_ceil(k + 1);
            assert_eq!(
                fluid_level_for_engine_level(p, k),
                expected_1indexed - 1,
                "p={} k={}",
                p,
                k
            );
        }
    }
}

#[test]
fn slot_placement_round_trips_through_the_mapping() {
    for k in 1..=4usize {
        for fluid in 1..=6usize {
            for slot in 0..=k {
                let engine_level = engine_level_for_run(fluid, k, slot);
                assert_eq!(
                    fluid_level_for_engine_level(engine_level, k),
                    fluid,
                    "fluid={} k={} slot={}",
                    fluid,
                    k,
                    slot
                );
            }
        }
    }
}

#[test]
fn each_fluid_level_owns_k_plus_one_distinct_slots() {
    let k = 3;
    let slots: Vec<usize> = (0..=k).map(|s| engine_level_for_run(2, k, s)).collect();
    assert_eq!(slots.len(), k + 1);
    assert!(slots.windows(2).all(|w| w[1] == w[0] + 1), "contiguous slots");
}

#[test]
#[should_panic(expected = "fluid level 0 has no forced slots")]
fn fluid_level_zero_has_no_slots() {
    engine_level_for_run(0, 1, 0);
}

#[test]
#[should_panic(expected = "exceeds width")]
fn slot_beyond_width_panics() {
    engine_level_for_run(1, 1, 2);
}

// -------------------- Runs --------------------

#[test]
fn run_tracks_files_and_names() {
    let mut run = FluidRun::new(4);
    assert!(run.is_empty());
    assert!(run.add_file(file("000001.run", 100, false)));
    assert!(run.add_file(file("000002.run", 50, false)));
    assert!(
        !run.add_file(file("000001.run", 100, false)),
        "duplicate names are rejected"
    );

    assert_eq!(run.engine_level(), 4);
    assert_eq!(run.files().len(), 2);
    assert_eq!(run.size_bytes(), 150);
    assert!(run.contains("000002.run"));
    assert!(!run.contains("000003.run"));
    assert!(!run.being_compacted());
}

#[test]
fn run_with_any_latched_file_counts_as_compacting() {
    let mut run = FluidRun::new(2);
    run.add_file(file("000001.run", 10, false));
    run.add_file(file("000002.run", 10, true));
    assert!(run.being_compacted());
}

// -------------------- Levels --------------------

#[test]
fn level_counts_only_nonempty_runs() {
    let mut level = FluidLevel::new();
    level.add_run(FluidRun::new(0)); // empty padding slot
    let mut run = FluidRun::new(0);
    run.add_file(file("000001.run", 64, false));
    level.add_run(run);

    assert_eq!(level.runs().len(), 2);
    assert_eq!(level.size(), 1);
    assert_eq!(level.size_in_bytes(), 64);
    assert!(level.contains("000001.run"));
    assert!(!level.contains("000009.run"));
}

#[test]
fn live_runs_exclude_compacting_and_empty() {
    let mut level = FluidLevel::new();
    level.add_run(FluidRun::new(0)); // empty

    let mut live = FluidRun::new(4);
    live.add_file(file("000001.run", 10, false));
    level.add_run(live);

    let mut latched = FluidRun::new(5);
    latched.add_file(file("000002.run", 10, true));
    level.add_run(latched);

    assert_eq!(level.size(), 2, "latched runs still occupy the level");
    assert_eq!(level.num_live_runs(), 1, "but only unlatched ones are live");
}
