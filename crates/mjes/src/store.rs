use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::identity::IdentityHash;
use crate::types::{Member, SpeechRecord};
use crate::utils::swap_name_with_surname;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("Store serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("No member with identity {0}")]
    MemberNotFound(IdentityHash),
}

/// Outcome of looking a member up by display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameMatch {
    Unique(Member),
    /// Several members share the name; `first` is the one to fall back on.
    Ambiguous { first: Member, count: usize },
    NotFound,
}

impl NameMatch {
    pub fn into_member(self) -> Option<Member> {
        match self {
            NameMatch::Unique(member) | NameMatch::Ambiguous { first: member, .. } => Some(member),
            NameMatch::NotFound => None,
        }
    }
}

/// Persistence contract the sync controller writes through.
///
/// Upserts are idempotent: `Ok(false)` means a record with that identity was
/// already present and nothing was written.
pub trait Store {
    fn upsert_member(&mut self, identity: &IdentityHash, member: &Member) -> Result<bool, StoreError>;

    fn find_member_by_identity(&self, identity: &IdentityHash) -> Result<Option<Member>, StoreError>;

    /// Looks a member up by exact display name, then, if allowed, with the
    /// first name and surname swapped.
    fn find_member_by_name(&self, name: &str, try_swapped: bool) -> Result<NameMatch, StoreError>;

    /// Most recent stored speech date per member display name.
    fn last_speech_date_per_member(&self) -> Result<HashMap<String, NaiveDate>, StoreError>;

    /// Deduplicates by speech identity within the member's speeches.
    fn upsert_speech(
        &mut self,
        member: &IdentityHash,
        speech: &SpeechRecord,
    ) -> Result<bool, StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMember {
    member: Member,
    #[serde(default)]
    speeches: Vec<SpeechRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Contents {
    members: BTreeMap<IdentityHash, StoredMember>,
}

/// Members with their speeches in a single JSON document.
#[derive(Debug, Default)]
pub struct JsonStore {
    path: Option<PathBuf>,
    contents: Contents,
}

impl JsonStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens the store at `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let contents = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::info!("Starting a new store at {}", path.display());
                Contents::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: Some(path),
            contents,
        })
    }

    pub fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.contents)?;
        fs::write(path, json)?;
        log::debug!("Store written to {}", path.display());
        Ok(())
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.contents.members.values().map(|stored| &stored.member)
    }

    pub fn speeches_of(&self, member: &IdentityHash) -> &[SpeechRecord] {
        self.contents
            .members
            .get(member)
            .map(|stored| stored.speeches.as_slice())
            .unwrap_or_default()
    }

    fn matching(&self, name: &str) -> Vec<&Member> {
        self.members().filter(|m| m.name == name).collect()
    }
}

impl Store for JsonStore {
    fn upsert_member(&mut self, identity: &IdentityHash, member: &Member) -> Result<bool, StoreError> {
        if self.contents.members.contains_key(identity) {
            return Ok(false);
        }
        self.contents.members.insert(
            identity.clone(),
            StoredMember {
                member: member.clone(),
                speeches: Vec::new(),
            },
        );
        Ok(true)
    }

    fn find_member_by_identity(&self, identity: &IdentityHash) -> Result<Option<Member>, StoreError> {
        Ok(self
            .contents
            .members
            .get(identity)
            .map(|stored| stored.member.clone()))
    }

    fn find_member_by_name(&self, name: &str, try_swapped: bool) -> Result<NameMatch, StoreError> {
        let mut found = self.matching(name);
        if found.is_empty() && try_swapped {
            found = self.matching(&swap_name_with_surname(name));
        }

        Ok(match found.as_slice() {
            [] => NameMatch::NotFound,
            [only] => NameMatch::Unique((*only).clone()),
            [first, ..] => NameMatch::Ambiguous {
                first: (*first).clone(),
                count: found.len(),
            },
        })
    }

    fn last_speech_date_per_member(&self) -> Result<HashMap<String, NaiveDate>, StoreError> {
        let mut latest: HashMap<String, NaiveDate> = HashMap::new();
        for stored in self.contents.members.values() {
            let Some(date) = stored.speeches.iter().map(|s| s.date).max() else {
                continue;
            };
            latest
                .entry(stored.member.name.clone())
                .and_modify(|d| *d = (*d).max(date))
                .or_insert(date);
        }
        Ok(latest)
    }

    fn upsert_speech(
        &mut self,
        member: &IdentityHash,
        speech: &SpeechRecord,
    ) -> Result<bool, StoreError> {
        let stored = self
            .contents
            .members
            .get_mut(member)
            .ok_or_else(|| StoreError::MemberNotFound(member.clone()))?;

        if stored.speeches.iter().any(|s| s.identity == speech.identity) {
            return Ok(false);
        }
        stored.speeches.push(speech.clone());
        Ok(true)
    }
}
