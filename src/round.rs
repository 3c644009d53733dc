use rand::{Rng, distributions::Uniform};

use crate::model::Outcome;

pub const DIE_FACES: i32 = 6;
pub const WIN_POINTS: i64 = 10;
pub const LOSE_POINTS: i64 = -5;

/// Rolls and score of a single round, before anything is persisted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Roll {
    pub user_roll: u8,
    pub bot_roll: u8,
    pub outcome: Outcome,
    pub points_change: i64,
}

/// Source of the two dice for a round. Injected so tests can pin the rolls.
pub trait DiceSource: Send + Sync {
    /// Return `(user_roll, bot_roll)`, each in `1..=6`.
    fn roll_pair(&self) -> (u8, u8);
}

/// Default dice backed by the thread-local RNG
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadRngDice;

impl DiceSource for ThreadRngDice {
    fn roll_pair(&self) -> (u8, u8) {
        (roll_die(), roll_die())
    }
}

/// Return a random integer in the inclusive range [min, max].
pub fn rand_in_range(min: i32, max: i32) -> i32 {
    let mut rng = rand::thread_rng();
    let distr = Uniform::new_inclusive(min, max);
    rng.sample(distr)
}

fn roll_die() -> u8 {
    // always within 1..=6
    rand_in_range(1, DIE_FACES) as u8
}

/// Score a pair of rolls.
pub fn resolve(user_roll: u8, bot_roll: u8) -> Roll {
    let (points_change, outcome) = match user_roll.cmp(&bot_roll) {
        std::cmp::Ordering::Greater => (WIN_POINTS, Outcome::Win),
        std::cmp::Ordering::Less => (LOSE_POINTS, Outcome::Lose),
        std::cmp::Ordering::Equal => (0, Outcome::Draw),
    };
    Roll {
        user_roll,
        bot_roll,
        outcome,
        points_change,
    }
}

/// Draw both dice from `dice` and score them.
pub fn roll_round(dice: &dyn DiceSource) -> Roll {
    let (user_roll, bot_roll) = dice.roll_pair();
    resolve(user_roll, bot_roll)
}
