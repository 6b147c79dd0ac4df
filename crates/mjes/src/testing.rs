//! In-memory site used by the crawler and sync tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::canonical::{CanonicalRecord, FieldValue, infer_sex};
use crate::schema::SiteSchema;
use crate::scraper::{PageSource, ScraperError};
use crate::types::Member;

const LISTED_NAMES: &[&str] = &["Posel Pierwszy", "Posel Drugi", "Posel Trzeci", "Posel Czwarty"];
const HIDDEN_NAMES: &[&str] = &["Ukryta Posłanka", "Ukryty Poseł"];

#[derive(Default)]
pub struct FakeSite {
    pages: HashMap<String, String>,
    hits: Mutex<Vec<String>>,
}

impl FakeSite {
    pub fn insert(&mut self, url: &str, html: &str) {
        self.pages.insert(url.to_string(), html.to_string());
    }

    pub fn hits_containing(&self, needle: &str) -> usize {
        self.hits
            .lock()
            .unwrap()
            .iter()
            .filter(|url| url.contains(needle))
            .count()
    }

    /// A listing linking `listed` members, with `hidden` more detail pages
    /// past the highest linked id.
    pub fn with_members(schema: &SiteSchema, listed: u32, hidden: u32) -> Self {
        let mut site = Self::default();

        let links: String = (1..=listed)
            .map(|id| {
                format!(
                    "<li><a href=\"/sejm{}.nsf/posel.xsp?id={:03}&amp;type=A\">{}</a></li>",
                    schema.term, id, id
                )
            })
            .collect();
        site.insert(
            &schema.member_listing_url(),
            &format!("<html><body><ul>{}</ul></body></html>", links),
        );

        let names = LISTED_NAMES
            .iter()
            .take(listed as usize)
            .chain(HIDDEN_NAMES.iter().take(hidden as usize));
        for (id, name) in (1u32..).zip(names) {
            site.insert(&schema.member_url(id), &member_page(name, id));
        }

        site
    }

    /// A speaker index with two members. Jan Kowalski has three speeches over
    /// two listing pages; Anna Nowak has none.
    pub fn with_speeches(schema: &SiteSchema) -> Self {
        let mut site = Self::default();

        site.insert(
            &schema.speakers_url(),
            r#"<ul class="category-list">
                 <li><a href="?view=3&amp;posel=Kowalski Jan">Kowalski Jan</a></li>
                 <li><a href="?view=3&amp;posel=Nowak Anna">Nowak Anna</a></li>
               </ul>"#,
        );

        let pagination = r#"<ul class="pagination">
              <li><a href="?view=3&amp;posel=Kowalski Jan&amp;page=1">&laquo;</a></li>
              <li><a href="?view=3&amp;posel=Kowalski Jan&amp;page=1">1</a></li>
              <li><a href="?view=3&amp;posel=Kowalski Jan&amp;page=2">2</a></li>
              <li><a href="?view=3&amp;posel=Kowalski Jan&amp;page=2">&raquo;</a></li>
            </ul>"#;
        let first_page = format!(
            "{}{}",
            pagination,
            listing_table(&[("01-06-2021", 3), ("12-05-2021", 2)])
        );
        site.insert(&schema.resolve("?view=3&posel=Kowalski Jan"), &first_page);
        site.insert(&schema.resolve("?view=3&posel=Kowalski Jan&page=1"), &first_page);
        site.insert(
            &schema.resolve("?view=3&posel=Kowalski Jan&page=2"),
            &format!("{}{}", pagination, listing_table(&[("15-01-2020", 1)])),
        );
        site.insert(&schema.resolve("?view=3&posel=Nowak Anna"), &listing_table(&[]));

        for wyp in 1..=3 {
            site.insert(
                &schema.resolve(&format!("wypowiedz.xsp?wyp={}", wyp)),
                &speech_page(&format!("Wypowiedź numer {}.", wyp)),
            );
        }

        site
    }
}

#[async_trait]
impl PageSource for FakeSite {
    async fn get_html(&self, url: &str) -> Result<String, ScraperError> {
        self.hits.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| ScraperError::NotFound(url.to_string()))
    }
}

pub fn member(name: &str, date_of_birth: NaiveDate) -> Member {
    let record: CanonicalRecord = [
        ("name".to_string(), FieldValue::Text(name.to_string())),
        ("sex".to_string(), FieldValue::Text(infer_sex(name).to_string())),
        ("date_of_birth".to_string(), FieldValue::Date(date_of_birth)),
    ]
    .into_iter()
    .collect();
    Member::try_from(record).unwrap()
}

pub fn member_page(name: &str, id: u32) -> String {
    format!(
        r#"<html><body>
        <div id="title_content"><h1>{name}</h1></div>
        <div class="partia"><ul class="data">
          <li><p class="left">Klub/koło:</p><p class="right">Klub {id}</p></li>
        </ul></div>
        <div class="cv"><ul class="data">
          <li><p class="left">Data i miejsce urodzenia:</p><p class="right">{id:02}-01-1960, Kraków</p></li>
        </ul></div>
        </body></html>"#
    )
}

pub fn speech_page(text: &str) -> String {
    format!(
        r#"<div class="stenogram"><p>Poseł Jan Kowalski:</p><p>{}</p></div>"#,
        text
    )
}

fn listing_table(rows: &[(&str, u32)]) -> String {
    let rows: String = rows
        .iter()
        .map(|(date, wyp)| {
            format!(
                "<tr><td class=\"nobr\">{}</td><td><a href=\"wypowiedz.xsp?wyp={}\">Temat</a></td><td></td></tr>",
                date, wyp
            )
        })
        .collect();
    format!("<table class=\"lista-wyp\">{}</table>", rows)
}
