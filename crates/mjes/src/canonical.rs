//! Canonicalization of raw label/value pairs scraped from member pages.
//!
//! Source labels are Polish and follow the site's wording. A static table maps
//! them onto canonical field names; labels missing from the table pass through
//! untouched. A second table maps canonical fields to transforms. A transform
//! returns a [`FieldPatch`] holding every field it produces, and the registry
//! merges patches into a fresh record. Transforms never see or mutate the
//! record being built.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

use crate::parser::ParseError;
use crate::types::Sex;
use crate::utils::{normalize_whitespace, to_roman};

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("Malformed value for '{field}': {value:?}")]
    Malformed { field: String, value: String },
    #[error(transparent)]
    Date(#[from] ParseError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Date(NaiveDate),
    Terms(BTreeSet<String>),
}

/// Fields produced by a single transform.
pub type FieldPatch = Vec<(String, FieldValue)>;

type Transform = fn(&str, &str, &TransformContext) -> Result<FieldPatch, TransformError>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CanonicalRecord(BTreeMap<String, FieldValue>);

impl CanonicalRecord {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) {
        self.0.insert(field.into(), value);
    }

    pub fn merge(&mut self, patch: FieldPatch) {
        self.0.extend(patch);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn take_text(&mut self, field: &str) -> Option<String> {
        match self.0.remove(field)? {
            FieldValue::Text(text) => Some(text),
            other => {
                self.0.insert(field.to_string(), other);
                None
            }
        }
    }

    pub fn take_integer(&mut self, field: &str) -> Option<i64> {
        match self.0.remove(field)? {
            FieldValue::Integer(n) => Some(n),
            other => {
                self.0.insert(field.to_string(), other);
                None
            }
        }
    }

    pub fn take_date(&mut self, field: &str) -> Option<NaiveDate> {
        match self.0.remove(field)? {
            FieldValue::Date(date) => Some(date),
            other => {
                self.0.insert(field.to_string(), other);
                None
            }
        }
    }

    pub fn take_terms(&mut self, field: &str) -> Option<BTreeSet<String>> {
        match self.0.remove(field)? {
            FieldValue::Terms(terms) => Some(terms),
            other => {
                self.0.insert(field.to_string(), other);
                None
            }
        }
    }

    pub fn into_fields(self) -> impl Iterator<Item = (String, FieldValue)> {
        self.0.into_iter()
    }
}

impl FromIterator<(String, FieldValue)> for CanonicalRecord {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        CanonicalRecord(iter.into_iter().collect())
    }
}

const LABELS: &[(&str, &str)] = &[
    ("Wybrany dnia", "election_date"),
    ("Wybrana dnia", "election_date"),
    ("Lista", "election_list"),
    ("Okręg wyborczy", "election_area"),
    ("Liczba głosów", "number_of_votes"),
    ("Ślubowanie", "oath_date"),
    ("Staż parlamentarny", "parliamentary_terms"),
    ("Klub/koło", "political_group"),
    ("Data i miejsce urodzenia", "place_and_date_of_birth"),
    ("Wykształcenie", "education"),
    ("Ukończona szkoła", "school"),
    ("Zawód", "profession"),
    ("Wygaśnięcie mandatu", "resign_date"),
    ("Tytuł/stopień naukowy", "academic_degree"),
];

/// Maps a source label to its canonical field name, or returns it unchanged.
pub fn canonical_label(label: &str) -> &str {
    LABELS
        .iter()
        .find(|(source, _)| *source == label)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(label)
}

static RE_ELECTION_AREA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)\s+(.+?)\s*$").expect("invalid regex: election area")
});

static RE_POLISH_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})\s+(\p{L}+)\s+(\d{4})$").expect("invalid regex: polish date")
});

static RE_TERM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[XVI]+\b").expect("invalid regex: term numeral"));

/// Bytes of UTF-8 Polish letters that the site serves decoded as Latin-1.
const MOJIBAKE: &[(&str, &str)] = &[("Å›", "ś"), ("Å„", "ń"), ("Å‚", "ł")];

fn parse_month(month: &str) -> Result<u32, ParseError> {
    match month.to_lowercase().as_str() {
        "stycznia" | "styczeń" => Ok(1),
        "lutego" | "luty" => Ok(2),
        "marca" | "marzec" => Ok(3),
        "kwietnia" | "kwiecień" => Ok(4),
        "maja" | "maj" => Ok(5),
        "czerwca" | "czerwiec" => Ok(6),
        "lipca" | "lipiec" => Ok(7),
        "sierpnia" | "sierpień" => Ok(8),
        "września" | "wrzesień" => Ok(9),
        "października" | "październik" => Ok(10),
        "listopada" | "listopad" => Ok(11),
        "grudnia" | "grudzień" => Ok(12),
        _ => Err(ParseError::DateParse(format!("Unknown month: {}", month))),
    }
}

/// Parses the free-text dates used across the site.
///
/// Numeric dates are day-first unless they start with the year.
pub fn parse_date(raw: &str) -> Result<NaiveDate, ParseError> {
    let normalized = normalize_whitespace(raw);
    let cleaned = normalized
        .trim_end_matches("r.")
        .trim()
        .trim_end_matches(',')
        .trim();

    let numeric = |s: &str| {
        ["%Y-%m-%d", "%d-%m-%Y", "%d.%m.%Y", "%d/%m/%Y"]
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
    };

    if let Some(date) = numeric(cleaned) {
        return Ok(date);
    }

    if let Some(caps) = RE_POLISH_DATE.captures(cleaned) {
        let day: u32 = caps[1]
            .parse()
            .map_err(|_| ParseError::DateParse(format!("Invalid day: {}", &caps[1])))?;
        let month = parse_month(&caps[2])?;
        let year: i32 = caps[3]
            .parse()
            .map_err(|_| ParseError::DateParse(format!("Invalid year: {}", &caps[3])))?;
        return NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
            ParseError::DateParse(format!("Invalid date: {}-{}-{}", year, month, day))
        });
    }

    // Listing cells sometimes carry a time after the date.
    cleaned
        .split_whitespace()
        .next()
        .and_then(numeric)
        .ok_or_else(|| ParseError::DateParse(format!("Unrecognised date: {:?}", raw)))
}

fn malformed(field: &str, value: &str) -> TransformError {
    TransformError::Malformed {
        field: field.to_string(),
        value: value.to_string(),
    }
}

fn date_field(field: &str, value: &str, _: &TransformContext) -> Result<FieldPatch, TransformError> {
    Ok(vec![(field.to_string(), FieldValue::Date(parse_date(value)?))])
}

fn integer_field(field: &str, value: &str, _: &TransformContext) -> Result<FieldPatch, TransformError> {
    let digits: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    let n = digits.parse::<i64>().map_err(|_| malformed(field, value))?;
    Ok(vec![(field.to_string(), FieldValue::Integer(n))])
}

fn election_area(field: &str, value: &str, _: &TransformContext) -> Result<FieldPatch, TransformError> {
    let caps = RE_ELECTION_AREA
        .captures(value)
        .ok_or_else(|| malformed(field, value))?;
    let number = caps[1].parse::<i64>().map_err(|_| malformed(field, value))?;

    Ok(vec![
        ("election_area_number".to_string(), FieldValue::Integer(number)),
        (field.to_string(), FieldValue::Text(normalize_whitespace(&caps[2]))),
    ])
}

fn place_and_date_of_birth(
    field: &str,
    value: &str,
    ctx: &TransformContext,
) -> Result<FieldPatch, TransformError> {
    let (date, place) = value.split_once(',').ok_or_else(|| malformed(field, value))?;
    let date_of_birth = parse_date(date)?;
    let place = normalize_whitespace(place);

    let mut patch = vec![("date_of_birth".to_string(), FieldValue::Date(date_of_birth))];
    if !place.is_empty() {
        patch.push(("place_of_birth".to_string(), FieldValue::Text(place)));
    }
    if let Some(age) = ctx.today.years_since(date_of_birth) {
        patch.push(("age".to_string(), FieldValue::Integer(i64::from(age))));
    }
    Ok(patch)
}

/// Undoes the site's email obfuscation (`JAN#KOWALSKI A T SEJM D O T PL`).
pub fn assemble_email(value: &str) -> Option<String> {
    let replacements = [("#", ""), (" A T ", "@"), (" D O T ", "."), (" ", "")];
    let email = replacements
        .iter()
        .fold(value.trim().to_string(), |acc, (from, to)| acc.replace(from, to))
        .to_lowercase();

    email.contains('@').then_some(email)
}

fn email(field: &str, value: &str, _: &TransformContext) -> Result<FieldPatch, TransformError> {
    let email = assemble_email(value).ok_or_else(|| malformed(field, value))?;
    Ok(vec![(field.to_string(), FieldValue::Text(email))])
}

pub fn repair_encoding(value: &str) -> String {
    MOJIBAKE
        .iter()
        .fold(value.to_string(), |acc, (broken, fixed)| acc.replace(broken, fixed))
}

/// Feminine Polish given names end in "a".
pub fn infer_sex(name: &str) -> Sex {
    let feminine = name
        .split_whitespace()
        .next()
        .is_some_and(|first| first.to_lowercase().ends_with('a'));
    if feminine { Sex::Woman } else { Sex::Man }
}

fn name(field: &str, value: &str, _: &TransformContext) -> Result<FieldPatch, TransformError> {
    let name = normalize_whitespace(&repair_encoding(value));
    if name.is_empty() {
        return Err(malformed(field, value));
    }
    let sex = infer_sex(&name);

    Ok(vec![
        (field.to_string(), FieldValue::Text(name)),
        ("sex".to_string(), FieldValue::Text(sex.as_str().to_string())),
    ])
}

fn parliamentary_terms(
    field: &str,
    value: &str,
    ctx: &TransformContext,
) -> Result<FieldPatch, TransformError> {
    let mut terms: BTreeSet<String> = RE_TERM
        .find_iter(value)
        .map(|m| m.as_str().to_string())
        .collect();
    terms.insert(ctx.current_term.clone());
    Ok(vec![(field.to_string(), FieldValue::Terms(terms))])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformContext {
    /// Processing date, used to derive ages.
    pub today: NaiveDate,
    /// Roman numeral of the term being crawled.
    pub current_term: String,
}

pub struct Registry {
    context: TransformContext,
    transforms: HashMap<&'static str, Transform>,
}

impl Registry {
    pub fn new(today: NaiveDate, current_term: u32) -> Self {
        let transforms: HashMap<&'static str, Transform> = HashMap::from([
            ("name", name as Transform),
            ("election_date", date_field),
            ("oath_date", date_field),
            ("resign_date", date_field),
            ("election_area", election_area),
            ("number_of_votes", integer_field),
            ("place_and_date_of_birth", place_and_date_of_birth),
            ("email", email),
            ("parliamentary_terms", parliamentary_terms),
        ]);

        Self {
            context: TransformContext {
                today,
                current_term: to_roman(current_term),
            },
            transforms,
        }
    }

    pub fn context(&self) -> &TransformContext {
        &self.context
    }

    /// Builds a canonical record from raw `(label, value)` pairs.
    ///
    /// A transform that fails drops its field; the rest of the record is
    /// still produced.
    pub fn canonicalize(&self, raw: &[(String, String)]) -> CanonicalRecord {
        let mut record = CanonicalRecord::default();

        for (label, value) in raw {
            let field = canonical_label(label.trim());
            match self.transforms.get(field) {
                Some(transform) => match transform(field, value, &self.context) {
                    Ok(patch) => record.merge(patch),
                    Err(e) => log::warn!("Skipping field '{}': {}", field, e),
                },
                None => record.insert(field, FieldValue::Text(normalize_whitespace(value))),
            }
        }

        record
    }
}
