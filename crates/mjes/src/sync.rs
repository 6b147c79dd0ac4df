//! Incremental ingestion of crawled members and speeches into a [`Store`].

use std::collections::HashMap;
use std::fmt::Display;
use std::time::Duration;

use chrono::NaiveDate;

use crate::canonical::Registry;
use crate::crawl::{CrawlError, Crawler, MemberCrawler, SpeechCrawler};
use crate::schema::SiteSchema;
use crate::scraper::{PageSource, ScraperError, WebScraper};
use crate::site::Site;
use crate::store::{NameMatch, Store, StoreError};
use crate::types::{Member, SpeechRecord};
use crate::utils::swap_name_with_surname;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Crawl(#[from] CrawlError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Latest stored speech date per member display name. Loaded once before a
/// speech crawl and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct Watermarks(HashMap<String, NaiveDate>);

impl From<HashMap<String, NaiveDate>> for Watermarks {
    fn from(marks: HashMap<String, NaiveDate>) -> Self {
        Watermarks(marks)
    }
}

impl Watermarks {
    pub fn load<St: Store + ?Sized>(store: &St) -> Result<Self, StoreError> {
        Ok(Watermarks(store.last_speech_date_per_member()?))
    }

    pub fn get(&self, name: &str) -> Option<NaiveDate> {
        self.0
            .get(name)
            .or_else(|| self.0.get(&swap_name_with_surname(name)))
            .copied()
    }

    /// Whether a speech dated `date` is newer than what is stored for `name`.
    pub fn admits(&self, name: &str, date: NaiveDate) -> bool {
        self.get(name).is_none_or(|mark| date > mark)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestOptions {
    /// Detail pages or speakers fetched at once.
    pub concurrency: usize,
    /// Skip speeches the watermark already covers.
    pub only_new: bool,
    /// Restrict the speech crawl to one member, named in either order.
    pub name_filter: Option<String>,
    /// Request timeout of the HTTP client built by [`Harvester::from_options`].
    pub timeout: Duration,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            only_new: true,
            name_filter: None,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub skipped_by_watermark: usize,
    /// Speeches no stored member could be found for.
    pub unresolved: Vec<SpeechRecord>,
}

impl Display for SyncReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} inserted, {} already stored, {} failed, {} skipped by watermark, {} unresolved",
            self.inserted,
            self.duplicates,
            self.failed,
            self.skipped_by_watermark,
            self.unresolved.len()
        )
    }
}

/// Writes crawl results through a store, one record at a time.
pub struct SyncController<'s, St: Store + ?Sized> {
    store: &'s mut St,
}

impl<'s, St: Store + ?Sized> SyncController<'s, St> {
    pub fn new(store: &'s mut St) -> Self {
        Self { store }
    }

    pub fn ingest_members(&mut self, members: &[Member]) -> Result<SyncReport, StoreError> {
        let mut report = SyncReport::default();
        for member in members {
            if self.store.upsert_member(&member.identity, member)? {
                report.inserted += 1;
            } else {
                log::debug!("Member {} already stored", member);
                report.duplicates += 1;
            }
        }
        log::info!("Members: {}", report);
        Ok(report)
    }

    /// Finds the stored member a display name refers to, trying the swapped
    /// name order when the exact name is unknown.
    pub fn resolve(&self, name: &str) -> Result<Option<Member>, StoreError> {
        let found = self.store.find_member_by_name(name, true)?;
        if let NameMatch::Ambiguous { first, count } = &found {
            log::warn!(
                "{} stored members are named {}; attributing to {}",
                count,
                name,
                first.identity
            );
        }
        Ok(found.into_member())
    }

    pub fn ingest_speeches(&mut self, speeches: Vec<SpeechRecord>) -> Result<SyncReport, StoreError> {
        let mut report = SyncReport::default();
        let mut resolved: HashMap<String, Option<Member>> = HashMap::new();

        for speech in speeches {
            let member = match resolved.get(&speech.member_name) {
                Some(member) => member.clone(),
                None => {
                    let member = self.resolve(&speech.member_name)?;
                    resolved.insert(speech.member_name.clone(), member.clone());
                    member
                }
            };

            let Some(member) = member else {
                log::error!(
                    "No stored member matches {}; keeping speech of {} unresolved",
                    speech.member_name,
                    speech.date
                );
                report.unresolved.push(speech);
                continue;
            };

            if self.store.upsert_speech(&member.identity, &speech)? {
                report.inserted += 1;
            } else {
                report.duplicates += 1;
            }
        }

        log::info!("Speeches: {}", report);
        Ok(report)
    }
}

/// Crawls one legislature term and syncs it into a store.
pub struct Harvester<S: PageSource> {
    source: S,
    schema: SiteSchema,
    options: HarvestOptions,
    today: NaiveDate,
}

impl<S: PageSource> Harvester<S> {
    pub fn new(source: S, schema: SiteSchema, options: HarvestOptions) -> Self {
        Self {
            source,
            schema,
            options,
            today: chrono::Local::now().date_naive(),
        }
    }

    /// Fixes the date ages are computed against.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub async fn sync_members<St: Store + ?Sized>(&self, store: &mut St) -> Result<SyncReport, SyncError> {
        let site = Site::new(&self.source, &self.schema)?;
        let registry = Registry::new(self.today, self.schema.term);

        let crawler = MemberCrawler::new(&site, &registry, self.options.concurrency);
        let members = crawler.crawl().await?;
        log::info!("Crawled {} members", members.len());

        let mut report = SyncController::new(store).ingest_members(&members)?;
        report.failed = crawler.failed();
        Ok(report)
    }

    pub async fn sync_speeches<St: Store + ?Sized>(&self, store: &mut St) -> Result<SyncReport, SyncError> {
        let site = Site::new(&self.source, &self.schema)?;
        let watermarks = Watermarks::load(&*store)?;
        log::info!("Loaded watermarks for {} members", watermarks.len());

        let crawler = SpeechCrawler::new(&site, &watermarks, &self.options);
        let speeches = crawler.crawl().await?;

        let mut report = SyncController::new(store).ingest_speeches(speeches)?;
        report.skipped_by_watermark = crawler.skipped_by_watermark();
        report.failed = crawler.failed();
        Ok(report)
    }
}

impl Harvester<WebScraper> {
    /// A harvester over the live site, with an HTTP client honouring
    /// `options.timeout`.
    pub fn from_options(schema: SiteSchema, options: HarvestOptions) -> Result<Self, ScraperError> {
        let scraper = WebScraper::with_timeout(options.timeout)?;
        Ok(Self::new(scraper, schema, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonStore;
    use crate::testing::{FakeSite, member};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_watermark_is_exclusive() {
        let marks = Watermarks::from(HashMap::from([("Jan Kowalski".to_string(), date(2021, 5, 12))]));

        assert!(!marks.admits("Jan Kowalski", date(2021, 5, 11)));
        assert!(!marks.admits("Jan Kowalski", date(2021, 5, 12)));
        assert!(marks.admits("Jan Kowalski", date(2021, 5, 13)));
        assert!(marks.admits("Anna Nowak", date(1999, 1, 1)));
    }

    #[test]
    fn test_watermark_matches_swapped_name() {
        let marks = Watermarks::from(HashMap::from([("Jan Kowalski".to_string(), date(2021, 5, 12))]));
        assert_eq!(marks.get("Kowalski Jan"), Some(date(2021, 5, 12)));
        assert!(!marks.admits("Kowalski Jan", date(2021, 5, 1)));
    }

    #[test]
    fn test_ingest_members_twice() {
        let mut store = JsonStore::in_memory();
        let members = vec![
            member("Jan Kowalski", date(1970, 3, 15)),
            member("Anna Nowak", date(1980, 1, 1)),
        ];

        let first = SyncController::new(&mut store).ingest_members(&members).unwrap();
        let second = SyncController::new(&mut store).ingest_members(&members).unwrap();

        assert_eq!((first.inserted, first.duplicates), (2, 0));
        assert_eq!((second.inserted, second.duplicates), (0, 2));
        assert_eq!(store.members().count(), 2);
    }

    #[test]
    fn test_speech_resolves_swapped_name() {
        let mut store = JsonStore::in_memory();
        let jan = member("Jan Kowalski", date(1970, 3, 15));
        store.upsert_member(&jan.identity, &jan).unwrap();

        let speech = SpeechRecord::new("Kowalski Jan", date(2021, 5, 12), "Dziękuję.");
        let report = SyncController::new(&mut store)
            .ingest_speeches(vec![speech.clone(), speech])
            .unwrap();

        assert_eq!((report.inserted, report.duplicates), (1, 1));
        assert!(report.unresolved.is_empty());
        assert_eq!(store.speeches_of(&jan.identity).len(), 1);
    }

    #[test]
    fn test_unresolved_speech_is_kept() {
        let mut store = JsonStore::in_memory();
        let speech = SpeechRecord::new("Nieznany Poseł", date(2021, 5, 12), "Dziękuję.");

        let report = SyncController::new(&mut store)
            .ingest_speeches(vec![speech.clone()])
            .unwrap();

        assert_eq!(report.inserted, 0);
        assert_eq!(report.unresolved, vec![speech]);
    }

    #[test]
    fn test_ambiguous_name_falls_back_to_first_match() {
        let mut store = JsonStore::in_memory();
        let older = member("Jan Kowalski", date(1950, 1, 1));
        let younger = member("Jan Kowalski", date(1990, 1, 1));
        store.upsert_member(&older.identity, &older).unwrap();
        store.upsert_member(&younger.identity, &younger).unwrap();

        let first = if older.identity < younger.identity { &older } else { &younger };

        let controller = SyncController::new(&mut store);
        let resolved = controller.resolve("Jan Kowalski").unwrap().unwrap();
        assert_eq!(&resolved, first);
    }

    #[test]
    fn test_harvester_from_options_applies_timeout() {
        let options = HarvestOptions {
            timeout: Duration::from_secs(5),
            ..HarvestOptions::default()
        };
        let harvester = Harvester::from_options(SiteSchema::default(), options).unwrap();
        assert_eq!(harvester.source.timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_member_sync_finds_hidden_member_once() {
        let schema = SiteSchema::default();
        let harvester = Harvester::new(FakeSite::with_members(&schema, 3, 1), schema, HarvestOptions::default())
            .with_today(date(2022, 3, 14));
        let mut store = JsonStore::in_memory();

        let first = harvester.sync_members(&mut store).await.unwrap();
        let second = harvester.sync_members(&mut store).await.unwrap();

        assert_eq!(first.inserted, 4);
        assert_eq!((second.inserted, second.duplicates), (0, 4));
        assert_eq!(store.members().count(), 4);
    }

    #[tokio::test]
    async fn test_speech_sync_is_incremental() {
        let schema = SiteSchema::default();
        let fake = FakeSite::with_speeches(&schema);
        let harvester = Harvester::new(&fake, schema, HarvestOptions::default());

        let mut store = JsonStore::in_memory();
        let jan = member("Jan Kowalski", date(1970, 3, 15));
        store.upsert_member(&jan.identity, &jan).unwrap();

        let first = harvester.sync_speeches(&mut store).await.unwrap();
        assert_eq!(first.inserted, 3);
        assert_eq!(first.skipped_by_watermark, 0);
        assert_eq!(fake.hits_containing("wypowiedz.xsp"), 3);

        let second = harvester.sync_speeches(&mut store).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped_by_watermark, 3);
        assert_eq!(fake.hits_containing("wypowiedz.xsp"), 3);

        let texts: Vec<&str> = store
            .speeches_of(&jan.identity)
            .iter()
            .map(|s| s.raw_text.as_str())
            .collect();
        assert_eq!(
            texts,
            vec!["Wypowiedź numer 3.", "Wypowiedź numer 2.", "Wypowiedź numer 1."]
        );
    }
}
