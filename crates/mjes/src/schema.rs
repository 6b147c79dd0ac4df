//! Description of the source website.
//!
//! Everything that depends on the site's markup or URL layout lives here, so a
//! redesign of the site is a change to this structure (or to the JSON file it
//! is loaded from) rather than to the crawling code.

use std::path::Path;

use reqwest::Url;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Failed to read schema file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid schema file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSchema {
    /// Parliamentary term being crawled; substituted for `{term}` in `root_url`.
    pub term: u32,
    pub root_url: String,
    pub member_listing_path: String,
    /// Detail page of one member; `{id}` is the zero-padded sequence number.
    pub member_detail_path: String,
    pub member_id_width: usize,
    /// Pattern locating member ids in listing links. Must capture `id`.
    pub member_id_pattern: String,
    pub speeches_path: String,
    pub speakers_view: String,
    pub member: MemberSelectors,
    pub speeches: SpeechSelectors,
    pub transcript: TranscriptMarkers,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberSelectors {
    pub name: String,
    /// Sections holding the interleaved label/value nodes, in page order.
    pub sections: Vec<String>,
    pub label: String,
    pub value: String,
    pub label_separator: String,
    pub email: String,
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSelectors {
    pub speaker_links: String,
    pub pagination: String,
    pub listing_rows: String,
    pub row_date: String,
    pub text_container: String,
    pub text_paragraphs: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptMarkers {
    /// Lines containing any of these phrases are dropped.
    pub denylist: Vec<String>,
    /// Lines matching any of these patterns are dropped.
    pub boilerplate: Vec<String>,
    pub right_column_indent: usize,
    pub left_column_max_len: usize,
    pub opening_anchor: String,
    pub closing_anchor: String,
}

impl Default for SiteSchema {
    fn default() -> Self {
        Self {
            term: 9,
            root_url: "https://www.sejm.gov.pl/sejm{term}.nsf/".to_string(),
            member_listing_path: "poslowie.xsp?type=A".to_string(),
            member_detail_path: "posel.xsp?id={id}&type=A".to_string(),
            member_id_width: 3,
            member_id_pattern: r"posel\.xsp\?id=(?P<id>\d{3})".to_string(),
            speeches_path: "wypowiedzi.xsp".to_string(),
            speakers_view: "3".to_string(),
            member: MemberSelectors::default(),
            speeches: SpeechSelectors::default(),
            transcript: TranscriptMarkers::default(),
        }
    }
}

impl Default for MemberSelectors {
    fn default() -> Self {
        Self {
            name: "#title_content h1".to_string(),
            sections: vec!["div.partia ul.data".to_string(), "div.cv ul.data".to_string()],
            label: "p.left".to_string(),
            value: "p.right".to_string(),
            label_separator: ":".to_string(),
            email: "#PoselEmail + * a[href]".to_string(),
            image: "div.partia img[src]".to_string(),
        }
    }
}

impl Default for SpeechSelectors {
    fn default() -> Self {
        Self {
            speaker_links: "ul.category-list li a[href]".to_string(),
            pagination: "ul.pagination".to_string(),
            listing_rows: "table.lista-wyp tr".to_string(),
            row_date: "td.nobr".to_string(),
            text_container: "div.stenogram".to_string(),
            text_paragraphs: "p".to_string(),
        }
    }
}

impl Default for TranscriptMarkers {
    fn default() -> Self {
        Self {
            denylist: [
                "KANCELARIA SEJMU: redakcja i skład – Sekretariat Posiedzeń Sejmu",
                "Informacja dla Sejmu i Senatu RP o udziale RP w pracach",
                ". . . . . . .",
                "TŁOCZONO Z POLECENIA MARSZAŁKA SEJMU",
                "PL ISSN",
                "Sprawozdanie Stenograficzne",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            boilerplate: [
                r"z \d\d?\. posiedzenia Sejmu Rzeczypospolitej Polskiej",
                r"posiedzenie Sejmu w dniu \d\d? \w+ \d{4} r\.",
                r"\s\s+\d+\s\s+",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            right_column_indent: 5,
            left_column_max_len: 65,
            opening_anchor: "Otwieram posiedzenie Sejmu.".to_string(),
            closing_anchor: "Zamykam posiedzenie Sejmu.".to_string(),
        }
    }
}

impl SiteSchema {
    pub fn for_term(term: u32) -> Self {
        Self {
            term,
            ..Self::default()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn root(&self) -> String {
        self.root_url.replace("{term}", &self.term.to_string())
    }

    pub fn member_listing_url(&self) -> String {
        format!("{}{}", self.root(), self.member_listing_path)
    }

    pub fn member_url(&self, id: u32) -> String {
        let padded = format!("{:0width$}", id, width = self.member_id_width);
        format!("{}{}", self.root(), self.member_detail_path.replace("{id}", &padded))
    }

    pub fn speeches_url(&self) -> String {
        format!("{}{}", self.root(), self.speeches_path)
    }

    pub fn speakers_url(&self) -> String {
        format!("{}?view={}", self.speeches_url(), self.speakers_view)
    }

    /// Resolves a link found on a page of this site.
    ///
    /// Query-only links (`?...`) are relative to the speeches page, which is
    /// where the site emits them.
    pub fn resolve(&self, href: &str) -> String {
        let href = href.trim();
        let base = if href.starts_with('?') {
            self.speeches_url()
        } else {
            self.root()
        };
        match Url::parse(&base).and_then(|base| base.join(href)) {
            Ok(url) => url.into(),
            Err(e) => {
                log::warn!("Cannot resolve {} against {}: {}", href, base, e);
                href.to_string()
            }
        }
    }
}
