use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::canonical::parse_date;
use crate::schema::{MemberSelectors, SpeechSelectors};
use crate::types::SpeechListing;
use crate::utils::normalize_whitespace;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Failed to parse date: {0}")]
    DateParse(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Missing transcript anchor: {0}")]
    MissingAnchor(String),
    #[error("Invalid selector '{0}'")]
    InvalidSelector(String),
}

pub(crate) fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|_| ParseError::InvalidSelector(css.to_string()))
}

fn elem_text(element: ElementRef) -> String {
    element.text().collect::<String>()
}

/// A marked node of a member profile section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldNode {
    Label(String),
    Value(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairState {
    AwaitingLabel,
    AwaitingValue,
}

/// Pairs an interleaved label/value node stream.
///
/// A node of the wrong kind for the current state is skipped, so a stray label
/// or value never produces a pair on its own.
pub fn pair_fields(
    nodes: impl IntoIterator<Item = FieldNode>,
    separator: &str,
) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut state = PairState::AwaitingLabel;
    let mut label = String::new();

    for node in nodes {
        match (state, node) {
            (PairState::AwaitingLabel, FieldNode::Label(text)) => {
                let text = normalize_whitespace(&text);
                label = text
                    .strip_suffix(separator)
                    .map(str::trim_end)
                    .unwrap_or(&text)
                    .to_string();
                state = PairState::AwaitingValue;
            }
            (PairState::AwaitingValue, FieldNode::Value(text)) => {
                pairs.push((std::mem::take(&mut label), text));
                state = PairState::AwaitingLabel;
            }
            (_, node) => log::debug!("Ignoring out-of-order field node {:?}", node),
        }
    }

    pairs
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberPage {
    pub name: String,
    pub fields: Vec<(String, String)>,
    pub email: Option<String>,
    pub image_url: Option<String>,
}

/// Extracts a member profile. Returns `Ok(None)` when the page has no name,
/// which is how the site answers for sequence numbers nobody holds.
pub fn parse_member_page(
    html: &str,
    selectors: &MemberSelectors,
) -> Result<Option<MemberPage>, ParseError> {
    let document = Html::parse_document(html);

    let name_sel = selector(&selectors.name)?;
    let name = document
        .select(&name_sel)
        .next()
        .map(|e| normalize_whitespace(&elem_text(e)))
        .unwrap_or_default();

    if name.is_empty() {
        return Ok(None);
    }

    let label_sel = selector(&selectors.label)?;
    let value_sel = selector(&selectors.value)?;
    let node_sel = selector(&format!("{}, {}", selectors.label, selectors.value))?;

    let mut fields = Vec::new();
    for section_css in &selectors.sections {
        let section_sel = selector(section_css)?;
        let Some(section) = document.select(&section_sel).next() else {
            log::warn!("Section '{}' missing on profile of {}", section_css, name);
            continue;
        };

        let nodes = section.select(&node_sel).filter_map(|e| {
            if label_sel.matches(&e) {
                Some(FieldNode::Label(elem_text(e)))
            } else if value_sel.matches(&e) {
                Some(FieldNode::Value(elem_text(e)))
            } else {
                None
            }
        });
        fields.extend(pair_fields(nodes, &selectors.label_separator));
    }

    let email_sel = selector(&selectors.email)?;
    let email = document
        .select(&email_sel)
        .next()
        .and_then(|e| e.value().attr("href"))
        .map(str::to_string);

    let image_sel = selector(&selectors.image)?;
    let image_url = document
        .select(&image_sel)
        .next()
        .and_then(|e| e.value().attr("src"))
        .map(str::to_string);

    Ok(Some(MemberPage {
        name,
        fields,
        email,
        image_url,
    }))
}

/// Highest member sequence number linked from the listing page.
pub fn parse_member_bound(html: &str, id_pattern: &Regex) -> Option<u32> {
    let document = Html::parse_document(html);
    let link_sel = Selector::parse("a[href]").unwrap();

    document
        .select(&link_sel)
        .filter_map(|e| {
            let href = e.value().attr("href")?;
            let caps = id_pattern.captures(href)?;
            caps.name("id")?.as_str().parse::<u32>().ok()
        })
        .max()
}

/// Speaker index entries as `(display name, href)`, names as listed.
pub fn parse_speakers(
    html: &str,
    selectors: &SpeechSelectors,
) -> Result<Vec<(String, String)>, ParseError> {
    let document = Html::parse_document(html);
    let link_sel = selector(&selectors.speaker_links)?;

    Ok(document
        .select(&link_sel)
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim();
            let name = normalize_whitespace(&elem_text(a));
            (!href.is_empty() && !name.is_empty()).then(|| (name, href.to_string()))
        })
        .collect())
}

/// Page links of a speech listing's pagination control, in order.
///
/// `None` means the control is absent and the listing is a single page. The
/// first and last items of the control are the previous/next arrows.
pub fn parse_speech_pages(
    html: &str,
    selectors: &SpeechSelectors,
) -> Result<Option<Vec<String>>, ParseError> {
    let document = Html::parse_document(html);
    let pagination_sel = selector(&selectors.pagination)?;
    let Some(control) = document.select(&pagination_sel).next() else {
        return Ok(None);
    };

    let item_sel = Selector::parse("li").unwrap();
    let link_sel = Selector::parse("a[href]").unwrap();
    let items: Vec<ElementRef> = control.select(&item_sel).collect();
    let inner = items.len().saturating_sub(1);

    let pages = items
        .iter()
        .take(inner)
        .skip(1)
        .filter_map(|li| {
            let href = li
                .select(&link_sel)
                .next()
                .and_then(|a| a.value().attr("href"));
            if href.is_none() {
                log::debug!("Pagination item without a link: {}", normalize_whitespace(&elem_text(*li)));
            }
            href
        })
        .map(str::to_string)
        .collect();

    Ok(Some(pages))
}

/// Rows of a speech listing page. Rows without a parsable date or link are
/// skipped, which also drops the header row.
pub fn parse_speech_listing(
    html: &str,
    selectors: &SpeechSelectors,
) -> Result<Vec<SpeechListing>, ParseError> {
    let document = Html::parse_document(html);
    let row_sel = selector(&selectors.listing_rows)?;
    let date_sel = selector(&selectors.row_date)?;
    let cell_sel = Selector::parse("td").unwrap();
    let link_sel = Selector::parse("a[href]").unwrap();

    let mut listings = Vec::new();
    for row in document.select(&row_sel) {
        let Some(date_cell) = row.select(&date_sel).next() else {
            continue;
        };
        let date_text = normalize_whitespace(&elem_text(date_cell));
        let date = match parse_date(&date_text) {
            Ok(date) => date,
            Err(e) => {
                log::warn!("Skipping speech row: {}", e);
                continue;
            }
        };

        let cells: Vec<ElementRef> = row.select(&cell_sel).collect();
        let url = cells
            .len()
            .checked_sub(2)
            .and_then(|i| cells[i].select(&link_sel).next())
            .and_then(|a| a.value().attr("href"));

        match url {
            Some(url) => listings.push(SpeechListing {
                date,
                url: url.to_string(),
            }),
            None => log::warn!("Skipping speech row dated {}: no link", date),
        }
    }

    Ok(listings)
}

/// Speech text: every paragraph of the transcript container except the
/// first, which repeats the speaker heading.
pub fn parse_speech_text(html: &str, selectors: &SpeechSelectors) -> Result<String, ParseError> {
    let document = Html::parse_document(html);
    let container_sel = selector(&selectors.text_container)?;
    let paragraph_sel = selector(&selectors.text_paragraphs)?;

    let container = document
        .select(&container_sel)
        .next()
        .ok_or_else(|| ParseError::MissingField("speech text container".to_string()))?;

    let text = container
        .select(&paragraph_sel)
        .skip(1)
        .map(|p| elem_text(p).replace("\r\n", "").trim().to_string())
        .collect::<Vec<_>>()
        .join(" ");

    if text.trim().is_empty() {
        return Err(ParseError::MissingField("speech text".to_string()));
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SiteSchema;
    use chrono::NaiveDate;
    use std::fs;

    fn label(s: &str) -> FieldNode {
        FieldNode::Label(s.to_string())
    }

    fn value(s: &str) -> FieldNode {
        FieldNode::Value(s.to_string())
    }

    #[test]
    fn test_pair_fields_alternating() {
        let pairs = pair_fields(
            [label("Lista:"), value("Koalicja"), label("Zawód:"), value("prawnik")],
            ":",
        );
        assert_eq!(
            pairs,
            vec![
                ("Lista".to_string(), "Koalicja".to_string()),
                ("Zawód".to_string(), "prawnik".to_string()),
            ]
        );
    }

    #[test]
    fn test_pair_fields_label_after_label_records_nothing() {
        let pairs = pair_fields([label("Lista:"), label("Zawód:")], ":");
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_pair_fields_ignores_wrong_kind() {
        let pairs = pair_fields(
            [
                value("sierota"),
                label("Lista:"),
                label("Zawód:"),
                value("Koalicja"),
                value("nadmiarowa"),
            ],
            ":",
        );
        assert_eq!(pairs, vec![("Lista".to_string(), "Koalicja".to_string())]);
    }

    #[test]
    fn test_parse_member_page_from_fixture() {
        let html = fs::read_to_string("fixtures/member_042.html").expect("Failed to read fixture");
        let schema = SiteSchema::default();

        let page = parse_member_page(&html, &schema.member)
            .expect("Failed to parse member page")
            .expect("Page should hold a member");

        assert_eq!(page.name, "Anna Maria Nowak");
        assert_eq!(
            page.email.as_deref(),
            Some("ANNA#NOWAK A T SEJM D O T GOV D O T PL")
        );
        assert_eq!(page.image_url.as_deref(), Some("/sejm9.nsf/foto/042.jpg"));

        let labels: Vec<&str> = page.fields.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "Wybrana dnia",
                "Lista",
                "Okręg wyborczy",
                "Liczba głosów",
                "Ślubowanie",
                "Staż parlamentarny",
                "Klub/koło",
                "Data i miejsce urodzenia",
                "Wykształcenie",
                "Ukończona szkoła",
                "Zawód",
            ]
        );
        let area = &page.fields[2].1;
        assert!(area.contains("\u{a0}\u{a0}"), "area keeps its separator: {:?}", area);
    }

    #[test]
    fn test_parse_member_page_without_name() {
        let html = r#"<html><body><div id="title_content"><h1></h1></div></body></html>"#;
        let page = parse_member_page(html, &SiteSchema::default().member).unwrap();
        assert!(page.is_none());
    }

    #[test]
    fn test_parse_member_page_tolerates_missing_section() {
        let html = r#"<div id="title_content"><h1>Jan Kowalski</h1></div>
            <div class="cv"><ul class="data">
              <li><p class="left">Zawód:</p><p class="right">rolnik</p></li>
            </ul></div>"#;
        let page = parse_member_page(html, &SiteSchema::default().member)
            .unwrap()
            .unwrap();
        assert_eq!(page.fields, vec![("Zawód".to_string(), "rolnik".to_string())]);
        assert!(page.email.is_none());
    }

    #[test]
    fn test_parse_member_bound_from_fixture() {
        let html = fs::read_to_string("fixtures/member_listing.html").expect("Failed to read fixture");
        let pattern = Regex::new(&SiteSchema::default().member_id_pattern).unwrap();
        assert_eq!(parse_member_bound(&html, &pattern), Some(460));
    }

    #[test]
    fn test_parse_member_bound_without_links() {
        let pattern = Regex::new(&SiteSchema::default().member_id_pattern).unwrap();
        assert_eq!(parse_member_bound("<a href='/x'>x</a>", &pattern), None);
    }

    #[test]
    fn test_parse_speakers() {
        let html = fs::read_to_string("fixtures/speakers.html").expect("Failed to read fixture");
        let speakers = parse_speakers(&html, &SiteSchema::default().speeches).unwrap();
        assert_eq!(speakers.len(), 3);
        assert_eq!(speakers[0].0, "Kowalski Jan");
        assert_eq!(speakers[0].1, "?view=3&posel=Kowalski Jan");
    }

    #[test]
    fn test_parse_speech_pages_from_fixture() {
        let html =
            fs::read_to_string("fixtures/speech_listing_paginated.html").expect("Failed to read fixture");
        let pages = parse_speech_pages(&html, &SiteSchema::default().speeches)
            .unwrap()
            .expect("Should find the pagination control");
        assert_eq!(
            pages,
            vec![
                "?view=3&posel=Nowak Anna Maria&page=1",
                "?view=3&posel=Nowak Anna Maria&page=2",
                "?view=3&posel=Nowak Anna Maria&page=3",
            ]
        );
    }

    #[test]
    fn test_parse_speech_pages_without_control() {
        let html = "<table class='lista-wyp'></table>";
        let pages = parse_speech_pages(html, &SiteSchema::default().speeches).unwrap();
        assert!(pages.is_none());
    }

    #[test]
    fn test_parse_speech_pages_skips_unlinked_item() {
        let html = r#"<ul class="pagination">
            <li><a href="?page=1">&laquo;</a></li>
            <li class="active"><span>1</span></li>
            <li><a href="?page=2">2</a></li>
            <li><a href="?page=2">&raquo;</a></li>
        </ul>"#;
        let pages = parse_speech_pages(html, &SiteSchema::default().speeches)
            .unwrap()
            .expect("Should find the pagination control");
        assert_eq!(pages, vec!["?page=2"]);
    }

    #[test]
    fn test_parse_speech_listing_from_fixture() {
        let html =
            fs::read_to_string("fixtures/speech_listing_paginated.html").expect("Failed to read fixture");
        let rows = parse_speech_listing(&html, &SiteSchema::default().speeches).unwrap();

        assert_eq!(rows.len(), 2, "header and undated rows are skipped");
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2021, 5, 12).unwrap());
        assert_eq!(rows[0].url, "wypowiedz.xsp?posiedzenie=31&dzien=1&wyp=12");
        assert_eq!(rows[1].date, NaiveDate::from_ymd_opt(2020, 1, 15).unwrap());
    }

    #[test]
    fn test_parse_speech_text_from_fixture() {
        let html = fs::read_to_string("fixtures/speech.html").expect("Failed to read fixture");
        let text = parse_speech_text(&html, &SiteSchema::default().speeches).unwrap();
        assert_eq!(
            text,
            "Panie Marszałku! Wysoka Izbo! Projekt ustawy trafia do komisji. Dziękuję bardzo."
        );
    }

    #[test]
    fn test_parse_speech_text_missing_container() {
        let result = parse_speech_text("<div class='inne'></div>", &SiteSchema::default().speeches);
        assert!(matches!(result, Err(ParseError::MissingField(_))));
    }

    #[test]
    fn test_invalid_selector_is_reported() {
        let mut selectors = SiteSchema::default().speeches;
        selectors.text_container = "div[".to_string();
        let result = parse_speech_text("<div></div>", &selectors);
        assert!(matches!(result, Err(ParseError::InvalidSelector(_))));
    }
}
