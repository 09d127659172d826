use rand::Rng;

use crate::database::ability::AbilityCandidate;

/// Picks one channel from the candidate rows of a (group, model) pair.
///
/// Only the maximum-priority band survives. Within the band the pick is
/// weighted random with probability weight_i / sum(weights); an all-zero band
/// is picked uniformly. Candidates are scanned in channel-id order so the
/// same RNG sequence always lands on the same channel.
pub fn pick_channel<R: Rng + ?Sized>(
    candidates: &[AbilityCandidate],
    rng: &mut R,
) -> Option<i64> {
    if candidates.is_empty() {
        return None;
    }

    let top_priority = candidates.iter().map(|c| c.priority).max()?;
    let mut band: Vec<&AbilityCandidate> = candidates
        .iter()
        .filter(|c| c.priority == top_priority)
        .collect();
    band.sort_by_key(|c| c.channel_id);
    band.dedup_by_key(|c| c.channel_id);

    let total_weight: i64 = band.iter().map(|c| c.weight.max(0)).sum();
    if total_weight == 0 {
        let index = rng.random_range(0..band.len());
        return Some(band[index].channel_id);
    }

    let mut roll = rng.random_range(0..total_weight);
    for candidate in &band {
        let weight = candidate.weight.max(0);
        if roll < weight {
            return Some(candidate.channel_id);
        }
        roll -= weight;
    }
    // Unreachable while weights sum correctly; cover it anyway.
    band.last().map(|c| c.channel_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn candidate(channel_id: i64, priority: i64, weight: i64) -> AbilityCandidate {
        AbilityCandidate {
            channel_id,
            priority,
            weight,
        }
    }

    #[test]
    fn empty_set_picks_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pick_channel(&[], &mut rng), None);
    }

    #[test]
    fn only_the_top_priority_band_is_eligible() {
        let mut rng = StdRng::seed_from_u64(1);
        let candidates = vec![candidate(1, 10, 0), candidate(2, 5, 100)];
        for _ in 0..100 {
            assert_eq!(pick_channel(&candidates, &mut rng), Some(1));
        }
    }

    #[test]
    fn weighted_pick_converges_to_weight_proportions() {
        // Two channels, same priority, weights 3 and 1. Over 10,000 picks the
        // 3-weight channel should land in [7300, 7700] (99.7% band).
        let mut rng = StdRng::seed_from_u64(42);
        let candidates = vec![candidate(1, 5, 3), candidate(2, 5, 1)];
        let mut count_a = 0;
        for _ in 0..10_000 {
            if pick_channel(&candidates, &mut rng) == Some(1) {
                count_a += 1;
            }
        }
        assert!(
            (7300..=7700).contains(&count_a),
            "weight-3 channel picked {} times",
            count_a
        );
    }

    #[test]
    fn all_zero_weights_pick_uniformly() {
        let mut rng = StdRng::seed_from_u64(7);
        let candidates = vec![
            candidate(1, 5, 0),
            candidate(2, 5, 0),
            candidate(3, 5, 0),
        ];
        let mut counts = [0usize; 3];
        for _ in 0..9_000 {
            let picked = pick_channel(&candidates, &mut rng).unwrap();
            counts[(picked - 1) as usize] += 1;
        }
        for count in counts {
            // Uniform expectation 3000 each; allow a wide band.
            assert!((2700..=3300).contains(&count), "uneven pick: {:?}", counts);
        }
    }

    #[test]
    fn identical_rng_sequences_pick_identically() {
        let candidates = vec![candidate(9, 5, 2), candidate(4, 5, 2), candidate(6, 5, 2)];
        let picks_a: Vec<_> = {
            let mut rng = StdRng::seed_from_u64(99);
            (0..50).map(|_| pick_channel(&candidates, &mut rng)).collect()
        };
        let picks_b: Vec<_> = {
            let mut rng = StdRng::seed_from_u64(99);
            (0..50).map(|_| pick_channel(&candidates, &mut rng)).collect()
        };
        assert_eq!(picks_a, picks_b);
    }

    #[test]
    fn negative_weights_count_as_zero() {
        let mut rng = StdRng::seed_from_u64(3);
        let candidates = vec![candidate(1, 5, -10), candidate(2, 5, 1)];
        for _ in 0..100 {
            assert_eq!(pick_channel(&candidates, &mut rng), Some(2));
        }
    }
}
