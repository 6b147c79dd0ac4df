use std::collections::{BTreeMap, BTreeSet};
use std::{fmt::Display, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::canonical::{CanonicalRecord, FieldValue};
use crate::identity::{IdentityHash, member_identity, speech_identity};

#[derive(Debug, thiserror::Error)]
#[error("Invalid sex '{0}'. Accepted values: 'woman', 'man'")]
pub struct SexParseError(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Woman,
    Man,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Woman => "woman",
            Sex::Man => "man",
        }
    }
}

impl FromStr for Sex {
    type Err = SexParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "woman" => Ok(Sex::Woman),
            "man" => Ok(Sex::Man),
            _ => Err(SexParseError(s.to_string())),
        }
    }
}

impl Display for Sex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Record is missing required field: {0}")]
    MissingField(&'static str),
    #[error("Record field '{field}' has an unexpected value")]
    InvalidField { field: &'static str },
}

/// A member of the Sejm as ingested from their profile page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub identity: IdentityHash,
    pub name: String,
    pub sex: Sex,
    pub date_of_birth: NaiveDate,
    pub place_of_birth: Option<String>,
    pub age: Option<u32>,
    pub election_list: Option<String>,
    pub election_area: Option<String>,
    pub election_area_number: Option<i64>,
    pub number_of_votes: Option<i64>,
    pub political_group: Option<String>,
    pub education: Option<String>,
    pub school: Option<String>,
    pub profession: Option<String>,
    pub academic_degree: Option<String>,
    pub election_date: Option<NaiveDate>,
    pub oath_date: Option<NaiveDate>,
    pub resign_date: Option<NaiveDate>,
    pub email: Option<String>,
    pub parliamentary_terms: BTreeSet<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    /// Fields the registry does not know, kept under their source label.
    pub extra: BTreeMap<String, String>,
}

impl TryFrom<CanonicalRecord> for Member {
    type Error = RecordError;

    fn try_from(mut record: CanonicalRecord) -> Result<Self, Self::Error> {
        let name = record
            .take_text("name")
            .filter(|n| !n.is_empty())
            .ok_or(RecordError::MissingField("name"))?;
        let date_of_birth = record
            .take_date("date_of_birth")
            .ok_or(RecordError::MissingField("date_of_birth"))?;
        let sex = match record.take_text("sex") {
            Some(raw) => raw
                .parse::<Sex>()
                .map_err(|_| RecordError::InvalidField { field: "sex" })?,
            None => return Err(RecordError::MissingField("sex")),
        };

        let member = Member {
            identity: member_identity(&name, date_of_birth),
            name,
            sex,
            date_of_birth,
            place_of_birth: record.take_text("place_of_birth"),
            age: record.take_integer("age").and_then(|a| u32::try_from(a).ok()),
            election_list: record.take_text("election_list"),
            election_area: record.take_text("election_area"),
            election_area_number: record.take_integer("election_area_number"),
            number_of_votes: record.take_integer("number_of_votes"),
            political_group: record.take_text("political_group"),
            education: record.take_text("education"),
            school: record.take_text("school"),
            profession: record.take_text("profession"),
            academic_degree: record.take_text("academic_degree"),
            election_date: record.take_date("election_date"),
            oath_date: record.take_date("oath_date"),
            resign_date: record.take_date("resign_date"),
            email: record.take_text("email"),
            parliamentary_terms: record.take_terms("parliamentary_terms").unwrap_or_default(),
            url: record.take_text("url"),
            image_url: record.take_text("image_url"),
            extra: record
                .into_fields()
                .filter_map(|(k, v)| match v {
                    FieldValue::Text(text) => Some((k, text)),
                    _ => None,
                })
                .collect(),
        };

        Ok(member)
    }
}

impl Display for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.name, self.identity)?;
        if let Some(group) = &self.political_group {
            write!(f, " · {}", group)?;
        }
        if let Some(area) = &self.election_area {
            write!(f, " · {}", area)?;
        }
        Ok(())
    }
}

/// One entry of the speaker index: a member display name and the link to
/// their speech listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speaker {
    pub name: String,
    pub url: String,
}

/// A row of a member's speech listing, before its text is fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechListing {
    pub date: NaiveDate,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechRecord {
    pub identity: IdentityHash,
    /// Display name the speech was listed under.
    pub member_name: String,
    pub date: NaiveDate,
    pub raw_text: String,
    pub url: Option<String>,
}

impl SpeechRecord {
    pub fn new(member_name: impl Into<String>, date: NaiveDate, raw_text: impl Into<String>) -> Self {
        let raw_text = raw_text.into();
        Self {
            identity: speech_identity(&raw_text),
            member_name: member_name.into(),
            date,
            raw_text,
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

impl Display for SpeechRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let preview: String = self.raw_text.chars().take(120).collect();
        write!(f, "[{}] {}: {}", self.date, self.member_name, preview)
    }
}
