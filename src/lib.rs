//! # seance
//!
//! a nostr client core
//!
//! this library provides the client side of the nostr protocol: signed
//! content-addressed events, kind-4 encrypted direct messages and a single
//! reconnecting relay connection with ordered outbound/inbound message pumps.

pub mod canonical;
pub mod envelopes;
pub mod event;
pub mod event_template;
pub mod filter;
pub mod keys;
pub mod nip04;
pub mod timestamp;

mod relay;
mod tags;
mod types;

// re-export commonly used types
pub use event::Event;
pub use event_template::EventTemplate;
pub use filter::{Filter, TagQuery};
pub use keys::{PubKey, SecretKey};
pub use relay::{ConnectError, ConnectionState, Occurrence, QueueError, Relay};
pub use tags::{Tag, Tags};
pub use timestamp::Timestamp;
pub use types::*;
