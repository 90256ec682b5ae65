//! Shuffled direction bag with a no-immediate-repeat guarantee.
//!
//! Trials draw their stimulus direction from a bag of the four cardinals.
//! The bag is reshuffled when empty; the guarantee that two consecutive draws
//! never return the same direction holds across the refill boundary too.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::domain::Direction;

#[derive(Debug, Clone)]
pub struct DirectionDeck {
    rng: StdRng,
    /// Remaining directions; draws pop from the back.
    bag: Vec<Direction>,
    last: Option<Direction>,
}

impl DirectionDeck {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Deterministic deck for replayable sessions and tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng,
            bag: Vec::with_capacity(4),
            last: None,
        }
    }

    /// Draw the next direction.
    pub fn draw(&mut self) -> Direction {
        if self.bag.is_empty() {
            self.refill();
        }
        let dir = self.bag.pop().unwrap_or(Direction::Up);
        self.last = Some(dir);
        dir
    }

    fn refill(&mut self) {
        self.bag.extend_from_slice(&Direction::ALL);
        self.bag.shuffle(&mut self.rng);
        // The first draw from the fresh bag comes off the back; if it matches
        // the previous draw, swap it away so the no-repeat guarantee holds
        // across the refill boundary.
        if let Some(last) = self.last {
            if self.bag.last() == Some(&last) {
                let n = self.bag.len();
                self.bag.swap(n - 1, 0);
            }
        }
    }
}

impl Default for DirectionDeck {
    fn default() -> Self {
        Self::new()
    }
}
