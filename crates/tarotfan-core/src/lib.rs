// ABOUTME: Core library for tarotfan: the card fan, its per-card state machines, and the table actor.
// ABOUTME: This crate defines the data model, events, commands, and render descriptions hosts consume.

pub mod actor;
pub mod card;
pub mod catalog;
pub mod command;
pub mod deck;
pub mod event;
pub mod render;
pub mod session;
pub mod testing;
pub mod timing;

pub use actor::{SessionError, TableHandle, spawn};
pub use card::{ActionControl, CardMachine, CardPhase, TapTarget};
pub use catalog::{CardIdentity, Catalog, CatalogError, Glyph, Payload};
pub use command::Command;
pub use deck::{Dealer, DeckError, DrawnCard};
pub use event::{Event, EventPayload};
pub use render::{CardView, Stage, TableView, describe_table};
pub use session::{Session, SessionPhase};
pub use timing::{TableConfig, Timings, TimingsError};
