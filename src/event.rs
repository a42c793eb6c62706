use crate::{canonical, Kind, PubKey, Signature, Tags, Timestamp, ID};
use secp256k1::{schnorr, XOnlyPublicKey, SECP256K1};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// represents a signed nostr event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: ID,
    pub pubkey: PubKey,
    pub created_at: Timestamp,
    pub kind: Kind,
    pub tags: Tags,
    pub content: String,
    pub sig: Signature,
}

impl Event {
    /// check that the signature verifies against the stored id and pubkey
    ///
    /// returns false, never an error, for any malformed input. requires no
    /// secret material and may be called concurrently on distinct events.
    pub fn verify_signature(&self) -> bool {
        let pubkey = match XOnlyPublicKey::from_byte_array(self.pubkey.0) {
            Ok(pk) => pk,
            Err(_) => return false,
        };

        let signature = schnorr::Signature::from_byte_array(self.sig.0);

        SECP256K1
            .verify_schnorr(&signature, &self.id.0, &pubkey)
            .is_ok()
    }

    /// compute the content-addressed ID from the current field values
    pub fn compute_id(&self) -> ID {
        let hash = Sha256::digest(self.serialize());
        ID::from_bytes(hash.into())
    }

    /// check if the event ID matches the hash of the serialized fields
    pub fn check_id(&self) -> bool {
        self.compute_id() == self.id
    }

    /// full validity check: the id is the hash of the signed fields and the
    /// signature verifies against that id. mutating any signed field after
    /// signing makes this return false.
    pub fn verify(&self) -> bool {
        self.check_id() && self.verify_signature()
    }

    /// serialize the event for ID computation
    pub fn serialize(&self) -> Vec<u8> {
        canonical::serialize_event(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => write!(f, "{}", json),
            Err(err) => write!(f, "Event({} >> {})", self.id, err),
        }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Event {}

impl std::hash::Hash for Event {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
