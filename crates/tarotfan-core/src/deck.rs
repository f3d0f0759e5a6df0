// ABOUTME: Draws hands of distinct cards from the catalog and binds each card's payload.
// ABOUTME: Instance ids come from a monotonic ULID generator so they never repeat within a session.

use std::sync::Arc;

use rand::SeedableRng;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::{Generator, Ulid};

use crate::catalog::{CardIdentity, Catalog, Payload};

/// Errors that can occur when setting up a dealer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeckError {
    #[error("catalog has {available} cards but a hand needs {hand_size}")]
    CatalogTooSmall { available: usize, hand_size: usize },
}

/// A card dealt into the current hand. The instance id is fresh on every draw
/// so renderers never confuse cards across shuffles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawnCard {
    pub instance_id: Ulid,
    pub catalog_index: usize,
    pub identity: CardIdentity,
    pub payload: Payload,
}

/// Deals hands from a shared, never-mutated catalog.
pub struct Dealer {
    catalog: Arc<Catalog>,
    hand_size: usize,
    rng: ChaCha8Rng,
    ids: Generator,
}

impl Dealer {
    /// Create a dealer. With a seed, the sequence of dealt catalog positions
    /// is reproducible; without one the RNG is seeded from entropy.
    pub fn new(catalog: Arc<Catalog>, hand_size: usize, seed: Option<u64>) -> Result<Self, DeckError> {
        if catalog.len() < hand_size {
            return Err(DeckError::CatalogTooSmall {
                available: catalog.len(),
                hand_size,
            });
        }
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Ok(Self {
            catalog,
            hand_size,
            rng,
            ids: Generator::new(),
        })
    }

    pub fn hand_size(&self) -> usize {
        self.hand_size
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Draw `hand_size` distinct catalog positions without replacement, in
    /// random fan order, each with a fresh instance id and its positional
    /// payload.
    pub fn draw(&mut self) -> Vec<DrawnCard> {
        let positions = index::sample(&mut self.rng, self.catalog.len(), self.hand_size);
        positions
            .into_iter()
            .filter_map(|position| {
                let identity = self.catalog.card(position)?.clone();
                Some(DrawnCard {
                    instance_id: self.next_id(),
                    catalog_index: position,
                    identity,
                    payload: self.catalog.payload_for(position).clone(),
                })
            })
            .collect()
    }

    fn next_id(&mut self) -> Ulid {
        // The generator only fails when the random part overflows within one
        // millisecond; a plain fresh ULID is still unique in practice.
        self.ids.generate().unwrap_or_else(|_| Ulid::new())
    }
}
