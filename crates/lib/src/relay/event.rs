//! Relay wire types.
//!
//! Events are flat, author-signed records. Paths are carried in tags:
//! `d` holds the full path and `f` holds the parent path. An optional
//! `expiration` tag carries the expiry in epoch seconds.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{Keys, RelayError, keys::verify_signature};
use crate::path;

/// Kind used for application data events (parameterized replaceable range).
pub const APP_DATA_KIND: u16 = 30078;

pub const PATH_TAG: &str = "d";
pub const PARENT_TAG: &str = "f";
pub const EXPIRATION_TAG: &str = "expiration";

/// Finds the first value of tag `name`.
fn find_tag<'a>(tags: &'a [Vec<String>], name: &str) -> Option<&'a str> {
    tags.iter()
        .find(|tag| tag.first().is_some_and(|t| t == name))
        .and_then(|tag| tag.get(1))
        .map(String::as_str)
}

/// An event before it has been signed by an author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTemplate {
    pub kind: u16,
    /// Epoch seconds
    pub created_at: u64,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

impl EventTemplate {
    /// Builds the template for a value written at `path`.
    pub fn for_path(kind: u16, path: &str, created_at: u64, content: String) -> Self {
        Self {
            kind,
            created_at,
            tags: vec![
                vec![PATH_TAG.to_string(), path.to_string()],
                vec![PARENT_TAG.to_string(), path::parent(path).to_string()],
            ],
            content,
        }
    }

    /// Adds an `expiration` tag (epoch seconds).
    pub fn expiring_at(mut self, expires_at_secs: u64) -> Self {
        self.tags.push(vec![
            EXPIRATION_TAG.to_string(),
            expires_at_secs.to_string(),
        ]);
        self
    }

    pub fn tag(&self, name: &str) -> Option<&str> {
        find_tag(&self.tags, name)
    }

    /// Signs the template as `keys`, producing a publishable event.
    pub fn sign(self, keys: &Keys) -> Event {
        let pubkey = keys.public_key();
        let id = Event::compute_id(&pubkey, self.created_at, self.kind, &self.tags, &self.content);
        let sig = match hex::decode(&id) {
            Ok(id_bytes) => keys.sign(&id_bytes),
            Err(_) => String::new(),
        };
        Event {
            id,
            pubkey,
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig,
        }
    }
}

/// A signed event as stored and relayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Hex SHA-256 of the canonical serialization
    pub id: String,
    /// Hex author public key
    pub pubkey: String,
    /// Epoch seconds
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    /// Hex signature over the id bytes
    pub sig: String,
}

impl Event {
    /// Computes the id: SHA-256 over `[0, pubkey, created_at, kind, tags, content]`.
    pub fn compute_id(
        pubkey: &str,
        created_at: u64,
        kind: u16,
        tags: &[Vec<String>],
        content: &str,
    ) -> String {
        let canonical = serde_json::json!([0, pubkey, created_at, kind, tags, content]).to_string();
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }

    pub fn tag(&self, name: &str) -> Option<&str> {
        find_tag(&self.tags, name)
    }

    /// The full path carried in the `d` tag.
    pub fn path(&self) -> Option<&str> {
        self.tag(PATH_TAG)
    }

    /// Expiry in epoch seconds, if tagged.
    pub fn expiration(&self) -> Option<u64> {
        self.tag(EXPIRATION_TAG).and_then(|s| s.parse().ok())
    }

    pub fn is_expired(&self, now_secs: u64) -> bool {
        self.expiration().is_some_and(|expires| expires <= now_secs)
    }

    /// Checks that the id matches the content and the signature matches the author.
    pub fn verify(&self) -> Result<(), RelayError> {
        let expected = Self::compute_id(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        );
        if expected != self.id {
            return Err(RelayError::InvalidEvent {
                reason: format!("id {} does not match content", self.id),
            });
        }
        let id_bytes = hex::decode(&self.id).map_err(|e| RelayError::InvalidEvent {
            reason: format!("id is not hex: {e}"),
        })?;
        verify_signature(&self.pubkey, &id_bytes, &self.sig)
    }
}

/// Subscription filter. Empty fields place no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<u16>,
    #[serde(rename = "#d", default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
    #[serde(rename = "#f", default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authors(mut self, authors: impl IntoIterator<Item = String>) -> Self {
        self.authors.extend(authors);
        self
    }

    pub fn kind(mut self, kind: u16) -> Self {
        self.kinds.push(kind);
        self
    }

    /// Restricts to events whose `d` tag equals `path`.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }

    /// Restricts to events whose `f` tag equals `parent`.
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parents.push(parent.into());
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        let tag_matches = |wanted: &[String], name: &str| {
            wanted.is_empty() || event.tag(name).is_some_and(|v| wanted.iter().any(|w| w == v))
        };
        (self.authors.is_empty() || self.authors.contains(&event.pubkey))
            && (self.kinds.is_empty() || self.kinds.contains(&event.kind))
            && tag_matches(&self.paths, PATH_TAG)
            && tag_matches(&self.parents, PARENT_TAG)
    }
}
