//! Downsampling invariants across seeds and input shapes

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rtt_harvester::downsample::{downsample, percentile_skeleton};
use rtt_harvester::TARGET_SAMPLE_COUNT;

/// Skewed RTT-like batch: a dense body around 20ms with a long tail
fn rtt_batch(seed: u64, len: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| {
            let base: f64 = rng.gen_range(18.0..24.0);
            if rng.gen_bool(0.05) {
                base + rng.gen_range(50.0..400.0)
            } else {
                base
            }
        })
        .collect()
}

fn multiset_contains(haystack: &[f64], needles: &[f64]) -> bool {
    let mut pool: Vec<f64> = haystack.to_vec();
    pool.sort_by(f64::total_cmp);
    needles.iter().all(|needle| {
        match pool.iter().position(|v| v == needle) {
            Some(i) => {
                pool.remove(i);
                true
            }
            None => false,
        }
    })
}

#[test]
fn test_output_is_bounded_sorted_subset_for_many_seeds() {
    for seed in 0..20 {
        let input = rtt_batch(seed, 2_000);
        let output = downsample(input.clone(), TARGET_SAMPLE_COUNT, &mut StdRng::seed_from_u64(seed));

        assert_eq!(output.len(), TARGET_SAMPLE_COUNT, "seed {seed}");
        assert!(output.windows(2).all(|w| w[0] <= w[1]), "seed {seed}");
        assert!(multiset_contains(&input, &output), "seed {seed}");
    }
}

#[test]
fn test_tails_survive_every_draw() {
    let input = rtt_batch(42, 5_000);
    let min = input.iter().copied().fold(f64::INFINITY, f64::min);
    let max = input.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut sorted = input.clone();
    sorted.sort_by(f64::total_cmp);
    let skeleton = percentile_skeleton(&sorted);

    for seed in 0..10 {
        let output = downsample(input.clone(), TARGET_SAMPLE_COUNT, &mut StdRng::seed_from_u64(seed));
        assert_eq!(output.first(), Some(&min));
        assert_eq!(output.last(), Some(&max));
        for value in &skeleton {
            assert!(output.contains(value));
        }
    }
}

#[test]
fn test_same_seed_same_selection() {
    let input = rtt_batch(7, 1_500);
    let a = downsample(input.clone(), 100, &mut StdRng::seed_from_u64(99));
    let b = downsample(input, 100, &mut StdRng::seed_from_u64(99));
    assert_eq!(a, b);
}

#[test]
fn test_small_batches_are_kept_whole() {
    let input = rtt_batch(3, 120);
    let output = downsample(input.clone(), TARGET_SAMPLE_COUNT, &mut StdRng::seed_from_u64(0));

    let mut expected = input;
    expected.sort_by(f64::total_cmp);
    assert_eq!(output, expected);
}
