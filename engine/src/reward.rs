//! Tiered-random reward model.
//!
//! Rewards are a function of ring distance between the player's rune and the
//! drawn rune, with deliberate variance inside each tier: the payout
//! fraction is a uniform per-mille draw, inclusive of both bounds, scaled by
//! the configured base reward. Exact matches always outpay every other tier
//! (the d=0 range [950, 1000] does not overlap the next-best [700, 900]).

use glyphmine_types::Symbol;
use rand::Rng;

/// Per-mille scale for reward fractions.
pub const REWARD_SCALE: u64 = 1_000;

/// Inclusive per-mille reward bounds for a distance tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RewardRange {
    pub min: u64,
    pub max: u64,
}

/// Map a ring distance to its payout tier.
pub fn reward_range(distance: u32) -> RewardRange {
    match distance {
        0 => RewardRange { min: 950, max: 1_000 },
        1..=3 => RewardRange { min: 700, max: 900 },
        4..=7 => RewardRange { min: 400, max: 600 },
        _ => RewardRange { min: 150, max: 300 },
    }
}

/// Compute the reward for one participant.
///
/// `floor(base_reward * draw / 1000)` where `draw` is uniform over the
/// tier's inclusive per-mille range.
pub fn compute_reward<R: Rng + ?Sized>(
    rng: &mut R,
    base_reward: u64,
    player: Symbol,
    system: Symbol,
) -> u64 {
    let range = reward_range(player.distance(system));
    let draw = rng.gen_range(range.min..=range.max);
    base_reward.saturating_mul(draw) / REWARD_SCALE
}

/// Draw the system's rune for a round.
pub fn draw_system_choice<R: Rng + ?Sized>(rng: &mut R) -> Symbol {
    Symbol::random(rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyphmine_types::SYMBOL_COUNT;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(reward_range(0), RewardRange { min: 950, max: 1_000 });
        assert_eq!(reward_range(1), RewardRange { min: 700, max: 900 });
        assert_eq!(reward_range(3), RewardRange { min: 700, max: 900 });
        assert_eq!(reward_range(4), RewardRange { min: 400, max: 600 });
        assert_eq!(reward_range(7), RewardRange { min: 400, max: 600 });
        assert_eq!(reward_range(8), RewardRange { min: 150, max: 300 });
        assert_eq!(reward_range(11), RewardRange { min: 150, max: 300 });
    }

    #[test]
    fn test_exact_match_always_beats_other_tiers() {
        // Non-overlapping ranges: the worst exact-match payout still exceeds
        // the best payout of any other tier.
        let exact = reward_range(0);
        for distance in 1..=(SYMBOL_COUNT / 2) as u32 {
            let other = reward_range(distance);
            assert!(exact.min > other.max, "distance {distance}");
        }
    }

    #[test]
    fn test_reward_within_tier_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let base = 1_000_000;
        for _ in 0..2_000 {
            let player = Symbol::random(&mut rng);
            let system = Symbol::random(&mut rng);
            let range = reward_range(player.distance(system));
            let reward = compute_reward(&mut rng, base, player, system);
            assert!(reward >= base * range.min / REWARD_SCALE);
            assert!(reward <= base * range.max / REWARD_SCALE);
        }
    }

    #[test]
    fn test_max_distance_scenario() {
        // 22-rune alphabet, base reward 1,000,000: index 0 vs index 11 is
        // the maximum distance (11), so every trial must land inside the
        // inclusive [150_000, 300_000] band.
        let player = Symbol::from_index(0).unwrap();
        let system = Symbol::from_index(11).unwrap();
        assert_eq!(player.distance(system), 11);

        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..5_000 {
            let reward = compute_reward(&mut rng, 1_000_000, player, system);
            assert!((150_000..=300_000).contains(&reward), "reward {reward}");
        }
    }

    #[test]
    fn test_reward_floors_fraction() {
        // With a base that does not divide evenly the fraction is floored.
        let player = Symbol::from_index(0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let reward = compute_reward(&mut rng, 999, player, player);
        assert!(reward <= 999);
        assert!(reward >= 999 * 950 / REWARD_SCALE);
    }
}
