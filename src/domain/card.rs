//! Flashcard and rating types (§3 Card, Rating).

use serde::{Deserialize, Serialize};

/// A flashcard as fetched from the flashcard store. Read-only for the
/// duration of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Card {
    pub id: u64,
    pub deck_name: String,
    pub question: String,
    pub answer: String,
    pub image_url: Option<String>,
    pub queue_class: QueueClass,
}

/// Which review queue a card currently belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueClass {
    New,
    Learning,
    Review,
}

/// A spaced-repetition grade, 1 (Again) .. 4 (Easy). The numeric value is
/// the wire value the flashcard store expects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Rating {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Rating {
    /// Build a `Rating` from its wire value (1..=4).
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Again),
            2 => Some(Self::Hard),
            3 => Some(Self::Good),
            4 => Some(Self::Easy),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Clamp this rating to at most `max` (used by the hint-caps-rating rule).
    #[must_use]
    pub fn clamp_max(self, max: Self) -> Self {
        if self > max { max } else { self }
    }
}
