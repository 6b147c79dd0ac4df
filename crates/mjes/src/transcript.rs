//! Cleaning of plenary transcript text.
//!
//! Transcripts are published as two-column PDFs: speaker names on the left,
//! remarks on the right. The text layer flattens both columns into physical
//! lines, so each line is classified and routed to a column buffer before the
//! columns are stitched back together. Binary PDF decoding is left to an
//! external tool; input here is page text.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::parser::ParseError;
use crate::schema::TranscriptMarkers;

static RE_COLUMNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s?\s?(?P<left>.*?)\s{3}\s?(?P<right>.*)").expect("invalid regex: columns")
});

static RE_ASIDE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(.*?\)").expect("invalid regex: aside"));

static RE_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("invalid regex: whitespace"));

static RE_LINE_BREAK_HYPHEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)- ").expect("invalid regex: hyphenation"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass {
    Dropped,
    Left(String),
    Right(String),
    Split { left: String, right: String },
    Unparsed,
}

pub struct TranscriptCleaner {
    markers: TranscriptMarkers,
    boilerplate: Vec<Regex>,
}

impl TranscriptCleaner {
    pub fn new(markers: &TranscriptMarkers) -> Result<Self, regex::Error> {
        let boilerplate = markers
            .boilerplate
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            markers: markers.clone(),
            boilerplate,
        })
    }

    pub fn classify(&self, line: &str) -> LineClass {
        if self.markers.denylist.iter().any(|phrase| line.contains(phrase.as_str()))
            || self.boilerplate.iter().any(|re| re.is_match(line))
        {
            return LineClass::Dropped;
        }

        let indent = line.chars().take_while(|c| *c == ' ').count();
        if indent >= self.markers.right_column_indent {
            return LineClass::Right(line.trim_start_matches(' ').to_string());
        }

        if line.chars().count() < self.markers.left_column_max_len {
            return LineClass::Left(line.trim_matches(' ').to_string());
        }

        match RE_COLUMNS.captures(line) {
            Some(caps) => LineClass::Split {
                left: caps["left"].trim_matches(' ').to_string(),
                right: caps["right"].trim_matches(' ').to_string(),
            },
            None => LineClass::Unparsed,
        }
    }

    /// Lines of one page: the left column followed by the right column.
    pub fn parse_page(&self, page_text: &str) -> Vec<String> {
        let mut left = Vec::new();
        let mut right = Vec::new();

        for line in page_text.lines() {
            match self.classify(line) {
                LineClass::Dropped => {}
                LineClass::Left(text) => left.push(text),
                LineClass::Right(text) => right.push(text),
                LineClass::Split { left: l, right: r } => {
                    left.push(l);
                    right.push(r);
                }
                LineClass::Unparsed => log::warn!("Unparsed transcript line: {:?}", line),
            }
        }

        left.extend(right);
        left
    }

    /// Joins the lines of a whole sitting, keeping the proceedings between the
    /// opening and closing anchors.
    ///
    /// The line before the opening anchor names the presiding officer and is
    /// kept. Without a closing anchor the text runs to the end.
    pub fn clean_document(&self, lines: &[String]) -> Result<String, ParseError> {
        let opening = lines
            .iter()
            .position(|l| l.contains(&self.markers.opening_anchor))
            .ok_or_else(|| ParseError::MissingAnchor(self.markers.opening_anchor.clone()))?;
        let start = opening.saturating_sub(1);

        let end = match lines[opening..]
            .iter()
            .position(|l| l.contains(&self.markers.closing_anchor))
        {
            Some(offset) => opening + offset + 1,
            None => {
                log::warn!(
                    "Closing anchor {:?} not found; keeping text to the end",
                    self.markers.closing_anchor
                );
                lines.len()
            }
        };

        let document = lines[start..end].join(" ");
        let document = RE_ASIDE.replace_all(&document, "");
        let document = RE_WHITESPACE.replace_all(&document, " ");
        let document = RE_LINE_BREAK_HYPHEN.replace_all(&document, "$1");

        Ok(document.trim().to_string())
    }

    pub fn clean_pages<'a>(
        &self,
        pages: impl IntoIterator<Item = &'a str>,
    ) -> Result<String, ParseError> {
        let lines: Vec<String> = pages
            .into_iter()
            .flat_map(|page| self.parse_page(page))
            .collect();
        self.clean_document(&lines)
    }
}

/// Links to transcript PDFs on a sitting page.
pub fn parse_transcript_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let link_sel = Selector::parse("a[href]").unwrap();

    document
        .select(&link_sel)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| href.to_lowercase().ends_with(".pdf"))
        .map(str::to_string)
        .collect()
}
