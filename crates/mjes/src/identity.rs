//! Content-derived identifiers for members and speeches.
//!
//! Identities are BLAKE2b digests with an 8-byte output, hex encoded. They
//! depend only on the UTF-8 bytes of the identity-defining fields, so the same
//! member or speech hashes identically across runs and across tools that share
//! the input rendering.

use std::fmt::Display;

use blake2::digest::consts::U8;
use blake2::{Blake2b, Digest};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

type Blake2b64 = Blake2b<U8>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityHash(String);

impl IdentityHash {
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Blake2b64::new();
        hasher.update(bytes);
        IdentityHash(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for IdentityHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Birth dates are hashed in their midnight timestamp rendering.
pub fn date_of_birth_key(date_of_birth: NaiveDate) -> String {
    date_of_birth.format("%Y-%m-%d 00:00:00").to_string()
}

pub fn member_identity(name: &str, date_of_birth: NaiveDate) -> IdentityHash {
    let key = format!("{}{}", name, date_of_birth_key(date_of_birth));
    IdentityHash::of(key.as_bytes())
}

pub fn speech_identity(raw_text: &str) -> IdentityHash {
    IdentityHash::of(raw_text.as_bytes())
}
