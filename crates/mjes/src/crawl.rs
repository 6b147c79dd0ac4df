//! Bounded concurrent crawling of members and their speeches.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::{StreamExt, stream};

use crate::canonical::{FieldValue, Registry};
use crate::scraper::{PageSource, ScraperError};
use crate::site::Site;
use crate::sync::{HarvestOptions, Watermarks};
use crate::types::{Member, RecordError, Speaker, SpeechRecord};
use crate::utils::swap_name_with_surname;

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("Discovery failed: {0}")]
    Discovery(String),
    #[error("Invalid site pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error(transparent)]
    Scraper(#[from] ScraperError),
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Runs `f` over every item with at most `concurrency` futures in flight and
/// waits for all of them. Results come back in completion order.
pub async fn fan_out<I, F, Fut, T>(items: I, concurrency: usize, f: F) -> Vec<T>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = T>,
{
    stream::iter(items)
        .map(f)
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}

#[async_trait]
pub trait Crawler {
    type Output: Send;

    async fn crawl(&self) -> Result<Vec<Self::Output>, CrawlError>;
}

/// Consecutive failing detail pages past the listing after which probing
/// gives up even though no empty page was seen.
const MAX_PROBE_FAILURES: usize = 5;

pub struct MemberCrawler<'a, S: PageSource> {
    site: &'a Site<'a, S>,
    registry: &'a Registry,
    concurrency: usize,
    failed: AtomicUsize,
}

impl<'a, S: PageSource> MemberCrawler<'a, S> {
    pub fn new(site: &'a Site<'a, S>, registry: &'a Registry, concurrency: usize) -> Self {
        Self {
            site,
            registry,
            concurrency,
            failed: AtomicUsize::new(0),
        }
    }

    /// Detail pages that could not be turned into a member.
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    /// Fetches and canonicalizes one detail page. `Ok(None)` when nobody
    /// holds the sequence number.
    pub async fn member(&self, id: u32) -> Result<Option<Member>, CrawlError> {
        let url = self.site.schema().member_url(id);
        let Some(page) = self.site.fetch_member(&url).await? else {
            return Ok(None);
        };

        let mut raw = page.fields;
        raw.push(("name".to_string(), page.name));
        if let Some(email) = page.email {
            raw.push(("email".to_string(), email));
        }
        if let Some(image) = page.image_url {
            raw.push(("image_url".to_string(), self.site.schema().resolve(&image)));
        }
        raw.push(("url".to_string(), url));

        let mut record = self.registry.canonicalize(&raw);
        if record.get("parliamentary_terms").is_none() {
            let current = self.registry.context().current_term.clone();
            record.insert(
                "parliamentary_terms",
                FieldValue::Terms(BTreeSet::from([current])),
            );
        }

        Ok(Some(Member::try_from(record)?))
    }
}

#[async_trait]
impl<S: PageSource> Crawler for MemberCrawler<'_, S> {
    type Output = Member;

    async fn crawl(&self) -> Result<Vec<Member>, CrawlError> {
        let bound = self.site.member_bound().await?;
        log::info!("Member listing links up to id {}", bound);

        let mut results = fan_out(1..=bound, self.concurrency, |id| async move {
            (id, self.member(id).await)
        })
        .await;
        results.sort_by_key(|(id, _)| *id);

        let mut members = Vec::new();
        for (id, result) in results {
            match result {
                Ok(Some(member)) => members.push(member),
                Ok(None) => log::debug!("No member at id {}", id),
                Err(e) => {
                    log::warn!("Failed to crawl member {}: {}", id, e);
                    self.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        // The listing omits some members; keep going until a page has no name.
        let mut next = bound + 1;
        let mut failures_in_a_row = 0;
        loop {
            match self.member(next).await {
                Ok(Some(member)) => {
                    log::info!("Found member {} past the listing at id {}", member.name, next);
                    members.push(member);
                    failures_in_a_row = 0;
                }
                Ok(None) => {
                    log::info!("No member at id {}, probing stopped", next);
                    break;
                }
                Err(e) => {
                    log::warn!("Failed to crawl member {} past the listing: {}", next, e);
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    failures_in_a_row += 1;
                    if failures_in_a_row >= MAX_PROBE_FAILURES {
                        log::error!(
                            "Probing stopped at id {} after {} failures in a row",
                            next,
                            failures_in_a_row
                        );
                        break;
                    }
                }
            }
            next += 1;
        }

        Ok(members)
    }
}

pub struct SpeechCrawler<'a, S: PageSource> {
    site: &'a Site<'a, S>,
    watermarks: &'a Watermarks,
    options: &'a HarvestOptions,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

impl<'a, S: PageSource> SpeechCrawler<'a, S> {
    pub fn new(site: &'a Site<'a, S>, watermarks: &'a Watermarks, options: &'a HarvestOptions) -> Self {
        Self {
            site,
            watermarks,
            options,
            skipped: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Speeches, or whole speakers, dropped after a fetch or parse failure.
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    /// Speeches left out of the last crawl because the store already covers
    /// their date.
    pub fn skipped_by_watermark(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }

    fn wanted(&self, speaker: &Speaker) -> bool {
        match &self.options.name_filter {
            Some(filter) => speaker.name == *filter || swap_name_with_surname(&speaker.name) == *filter,
            None => true,
        }
    }

    /// One member's speeches in listing order. Dates the watermark already
    /// covers are skipped before their text is fetched.
    pub async fn speeches_of(&self, speaker: &Speaker) -> Result<Vec<SpeechRecord>, CrawlError> {
        let listings = self.site.speech_listings(speaker).await?;

        let mut speeches = Vec::new();
        for listing in listings {
            if self.options.only_new && !self.watermarks.admits(&speaker.name, listing.date) {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let url = self.site.schema().resolve(&listing.url);
            match self.site.speech_text(&url).await {
                Ok(text) => speeches.push(SpeechRecord::new(&speaker.name, listing.date, text).with_url(url)),
                Err(e) => {
                    log::error!("Dropping speech of {} on {}: {}", speaker.name, listing.date, e);
                    self.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        log::info!("Scraped {} speeches of {}", speeches.len(), speaker.name);
        Ok(speeches)
    }
}

#[async_trait]
impl<S: PageSource> Crawler for SpeechCrawler<'_, S> {
    type Output = SpeechRecord;

    async fn crawl(&self) -> Result<Vec<SpeechRecord>, CrawlError> {
        let speakers: Vec<Speaker> = self
            .site
            .speakers()
            .await?
            .into_iter()
            .filter(|s| self.wanted(s))
            .collect();
        log::info!("Crawling speeches of {} members", speakers.len());

        let results = fan_out(speakers, self.options.concurrency, |speaker| async move {
            let result = self.speeches_of(&speaker).await;
            (speaker, result)
        })
        .await;

        let mut speeches = Vec::new();
        for (speaker, result) in results {
            match result {
                Ok(batch) => speeches.extend(batch),
                Err(e) => {
                    log::warn!("Failed to crawl speeches of {}: {}", speaker.name, e);
                    self.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Ok(speeches)
    }
}
