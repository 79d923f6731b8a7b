//! Fixed scoring tables.
//!
//! Difficulty is a stable function of the target's identifier so the same
//! target is always worth the same number of points.

use crate::enums::Difficulty;
use crate::ids::UserId;

/// Method label written on every capture record.
pub const CAPTURE_METHOD: &str = "network_infiltration";

/// Points granted to an agent when a reward is assigned.
pub const REWARD_BONUS_POINTS: i64 = 20;

/// Points granted to an author when their report is approved.
pub const APPROVAL_BONUS_POINTS: i64 = 5;

/// Largest value an administrator may set on a statistic counter. Leaves
/// room for any realistic number of later awards before `i64` overflows.
pub const MAX_STATISTIC_VALUE: i64 = 1_000_000_000_000;

impl Difficulty {
    /// Difficulty bucket for capturing `target`: `id mod 3` indexes
    /// easy, medium, hard.
    pub const fn for_target(target: UserId) -> Self {
        match target.into_inner() % 3 {
            0 => Self::Easy,
            1 => Self::Medium,
            _ => Self::Hard,
        }
    }

    /// Points awarded for a capture of this difficulty.
    pub const fn points(self) -> i64 {
        match self {
            Self::Easy => 100,
            Self::Medium => 250,
            Self::Hard => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_cycles_with_target_id() {
        assert_eq!(Difficulty::for_target(UserId::new(3)), Difficulty::Easy);
        assert_eq!(Difficulty::for_target(UserId::new(4)), Difficulty::Medium);
        assert_eq!(Difficulty::for_target(UserId::new(5)), Difficulty::Hard);
        assert_eq!(Difficulty::for_target(UserId::new(6)), Difficulty::Easy);
    }

    #[test]
    fn difficulty_is_stable_for_the_same_target() {
        for raw in 1..50_u64 {
            let id = UserId::new(raw);
            assert_eq!(Difficulty::for_target(id), Difficulty::for_target(id));
        }
    }

    #[test]
    fn points_table() {
        assert_eq!(Difficulty::Easy.points(), 100);
        assert_eq!(Difficulty::Medium.points(), 250);
        assert_eq!(Difficulty::Hard.points(), 500);
    }
}
