//! Card source - supplies random captions and image cards on demand

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::models::{Caption, Card};

/// Supplier of random content.
///
/// A request for `count` values may return fewer when the library is
/// small. Separate requests may repeat values.
pub trait CardSource: Send {
    fn draw_cards(&mut self, count: usize) -> Vec<Card>;

    fn draw_captions(&mut self, count: usize) -> Vec<Caption>;

    fn draw_caption(&mut self) -> Option<Caption> {
        self.draw_captions(1).pop()
    }
}

/// In-memory library sampled uniformly without replacement per request
pub struct Deck {
    cards: Vec<Card>,
    captions: Vec<Caption>,
    rng: StdRng,
}

impl Deck {
    pub fn new(cards: Vec<Card>, captions: Vec<Caption>) -> Self {
        Self {
            cards,
            captions,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic sampling for tests and replays
    pub fn seeded(cards: Vec<Card>, captions: Vec<Caption>, seed: u64) -> Self {
        Self {
            cards,
            captions,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    pub fn caption_count(&self) -> usize {
        self.captions.len()
    }
}

impl CardSource for Deck {
    fn draw_cards(&mut self, count: usize) -> Vec<Card> {
        self.cards
            .choose_multiple(&mut self.rng, count)
            .cloned()
            .collect()
    }

    fn draw_captions(&mut self, count: usize) -> Vec<Caption> {
        self.captions
            .choose_multiple(&mut self.rng, count)
            .cloned()
            .collect()
    }
}
