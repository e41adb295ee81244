//! Representative downsampling of RTT samples
//!
//! A measurement result batch can hold thousands of RTTs for one
//! (destination, source) pair. [`downsample`] keeps at most `target` of them
//! while preserving both the tails and the centre of the distribution:
//!
//! 1. Sort ascending; batches at or below `target` are returned unchanged.
//! 2. Take the nearest-rank 0th, 10th, ..., 100th percentiles as a skeleton.
//! 3. Fill the remaining slots with a uniform draw without replacement from
//!    the rest of the pool.
//!
//! The skeleton always contains the minimum and maximum, so the tails survive
//! even when the random draw misses them.

use rand::seq::index;
use rand::Rng;

/// Number of percentile points in the skeleton (0, 10, ..., 100)
pub const PERCENTILE_STEPS: usize = 11;

/// Select a bounded representative subset of `samples`
///
/// # Arguments
/// * `samples` - RTT values in arrival order; non-finite values are dropped
/// * `target` - Maximum number of values to keep
/// * `rng` - Random source for the uniform draw
///
/// # Returns
/// At most `target` values, sorted ascending. Every returned value occurs in
/// the input at least as many times as it is returned. A `target` smaller
/// than the skeleton keeps evenly spaced skeleton values, the minimum and
/// (from a `target` of two) the maximum included.
pub fn downsample<I, R>(samples: I, target: usize, rng: &mut R) -> Vec<f64>
where
    I: IntoIterator<Item = f64>,
    R: Rng + ?Sized,
{
    let mut sorted: Vec<f64> = samples.into_iter().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);

    if sorted.len() <= target {
        return sorted;
    }

    let mut skeleton = skeleton_ranks(&sorted);
    if skeleton.len() > target {
        skeleton = thin_ranks(&skeleton, target);
    }

    // Skeleton picks one occurrence of each distinct percentile value; the
    // rest of the sorted vector is the pool for the random draw.
    let mut picked = Vec::with_capacity(target);
    let mut pool = Vec::with_capacity(sorted.len() - skeleton.len());
    let mut ranks = skeleton.iter().peekable();
    for (i, value) in sorted.iter().copied().enumerate() {
        if ranks.peek() == Some(&&i) {
            ranks.next();
            picked.push(value);
        } else {
            pool.push(value);
        }
    }

    let wanted = target.saturating_sub(picked.len()).min(pool.len());
    picked.extend(index::sample(rng, pool.len(), wanted).into_iter().map(|i| pool[i]));

    picked.sort_by(f64::total_cmp);
    picked.truncate(target);
    picked
}

/// Nearest-rank indices of the 0..=100 step 10 percentiles of a sorted slice
///
/// Rank of percentile `p` in `n` sorted values is `round(p / 100 * (n - 1))`.
/// Ranks are unique and ascending.
fn percentile_ranks(n: usize) -> Vec<usize> {
    let mut ranks: Vec<usize> = (0..PERCENTILE_STEPS)
        .map(|step| {
            let fraction = step as f64 / (PERCENTILE_STEPS - 1) as f64;
            (fraction * (n - 1) as f64).round() as usize
        })
        .collect();
    ranks.dedup();
    ranks
}

/// Evenly spaced subset of `ranks`, first and last kept when `target >= 2`
fn thin_ranks(ranks: &[usize], target: usize) -> Vec<usize> {
    if target <= 1 {
        return ranks.iter().copied().take(target).collect();
    }
    let step = (ranks.len() - 1) as f64 / (target - 1) as f64;
    (0..target)
        .map(|i| ranks[(i as f64 * step).round() as usize])
        .collect()
}

/// Percentile ranks of a sorted slice, keeping the first rank of each value
fn skeleton_ranks(sorted: &[f64]) -> Vec<usize> {
    if sorted.is_empty() {
        return Vec::new();
    }
    let mut ranks: Vec<usize> = Vec::with_capacity(PERCENTILE_STEPS);
    for rank in percentile_ranks(sorted.len()) {
        if ranks.last().map_or(true, |&last| sorted[last] != sorted[rank]) {
            ranks.push(rank);
        }
    }
    ranks
}

/// Skeleton values of a sorted slice with equal values collapsed
///
/// Exposed for diagnostics and tests: heavily tied data yields fewer than
/// [`PERCENTILE_STEPS`] distinct values.
pub fn percentile_skeleton(sorted: &[f64]) -> Vec<f64> {
    skeleton_ranks(sorted)
        .into_iter()
        .map(|rank| sorted[rank])
        .collect()
}
