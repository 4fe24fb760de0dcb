//! In-memory [`FlashcardStore`] fixture adapter (`FLASHCARD_ADAPTER=local`).
//!
//! Used for demos and the offline development loop where no real flashcard
//! backend is reachable. Ratings submitted through this adapter are applied
//! to its own in-memory queue_class bookkeeping only; nothing persists
//! across process restarts (the recovery store is the durable layer; this
//! adapter is deliberately not it).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::card::{Card, QueueClass, Rating};
use crate::error::{Result, TutorError};
use crate::ports::{DeckSummary, FlashcardStore};

/// A fixed, in-memory deck catalog.
pub struct LocalFlashcardStore {
    decks: Mutex<HashMap<String, Vec<Card>>>,
}

impl LocalFlashcardStore {
    #[must_use]
    pub fn new(decks: HashMap<String, Vec<Card>>) -> Self {
        Self { decks: Mutex::new(decks) }
    }

    /// A small built-in sample deck, for first-run demos with no flashcard
    /// backend configured.
    #[must_use]
    pub fn sample() -> Self {
        let cards = vec![
            Card {
                id: 1,
                deck_name: "Capitals".into(),
                question: "What is the capital of France?".into(),
                answer: "Paris".into(),
                image_url: None,
                queue_class: QueueClass::Review,
            },
            Card {
                id: 2,
                deck_name: "Capitals".into(),
                question: "What is the capital of Japan?".into(),
                answer: "Tokyo".into(),
                image_url: None,
                queue_class: QueueClass::New,
            },
        ];
        let mut decks = HashMap::new();
        decks.insert("Capitals".to_owned(), cards);
        Self::new(decks)
    }
}

#[async_trait]
impl FlashcardStore for LocalFlashcardStore {
    async fn get_decks(&self) -> Result<Vec<DeckSummary>> {
        self.get_decks_with_card_counts().await
    }

    async fn get_decks_with_card_counts(&self) -> Result<Vec<DeckSummary>> {
        let decks = self.decks.lock().map_err(lock_poisoned)?;
        Ok(decks
            .iter()
            .map(|(name, cards)| {
                let new = cards.iter().filter(|c| c.queue_class == QueueClass::New).count() as u32;
                let learn =
                    cards.iter().filter(|c| c.queue_class == QueueClass::Learning).count() as u32;
                let due = cards.iter().filter(|c| c.queue_class == QueueClass::Review).count() as u32;
                DeckSummary { name: name.clone(), new, learn, due, total: cards.len() as u32 }
            })
            .collect())
    }

    async fn get_reviewable_cards(&self, deck: &str) -> Result<Vec<Card>> {
        let decks = self.decks.lock().map_err(lock_poisoned)?;
        Ok(decks.get(deck).cloned().unwrap_or_default())
    }

    async fn submit_review(&self, _card_id: u64, _session_id: &str, _rating: Rating) -> Result<()> {
        // The fixture has no spaced-repetition scheduler to update; the
        // durable record of the rating lives in the recovery store.
        Ok(())
    }

    async fn get_card_image(&self, filename: &str) -> Result<Vec<u8>> {
        Err(TutorError::Store(format!("no image backend configured for {filename}")))
    }
}

fn lock_poisoned<T>(_: std::sync::PoisonError<T>) -> TutorError {
    TutorError::Store("local flashcard store mutex poisoned".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sample_deck_is_reviewable() {
        let store = LocalFlashcardStore::sample();
        let cards = store.get_reviewable_cards("Capitals").await.unwrap();
        assert_eq!(cards.len(), 2);
    }

    #[tokio::test]
    async fn unknown_deck_returns_empty() {
        let store = LocalFlashcardStore::sample();
        let cards = store.get_reviewable_cards("Nonexistent").await.unwrap();
        assert!(cards.is_empty());
    }

    #[tokio::test]
    async fn deck_summary_counts_match_queue_classes() {
        let store = LocalFlashcardStore::sample();
        let summaries = store.get_decks_with_card_counts().await.unwrap();
        let capitals = summaries.iter().find(|d| d.name == "Capitals").unwrap();
        assert_eq!(capitals.new, 1);
        assert_eq!(capitals.due, 1);
        assert_eq!(capitals.total, 2);
    }
}
