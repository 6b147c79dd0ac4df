use regex::Regex;

use crate::crawl::CrawlError;
use crate::parser::{
    MemberPage, parse_member_bound, parse_member_page, parse_speakers, parse_speech_listing,
    parse_speech_pages, parse_speech_text,
};
use crate::schema::SiteSchema;
use crate::scraper::{PageSource, ScraperError};
use crate::types::{Speaker, SpeechListing};
use crate::utils::swap_name_with_surname;

/// Fetch-and-parse operations over one legislature term of the site.
pub struct Site<'a, S: PageSource> {
    source: &'a S,
    schema: &'a SiteSchema,
    id_pattern: Regex,
}

impl<'a, S: PageSource> Site<'a, S> {
    pub fn new(source: &'a S, schema: &'a SiteSchema) -> Result<Self, CrawlError> {
        Ok(Self {
            source,
            schema,
            id_pattern: Regex::new(&schema.member_id_pattern)?,
        })
    }

    pub fn schema(&self) -> &SiteSchema {
        self.schema
    }

    /// Highest member sequence number the listing page links to.
    pub async fn member_bound(&self) -> Result<u32, CrawlError> {
        let url = self.schema.member_listing_url();
        log::info!("Fetching member listing: {}", url);
        let html = self
            .source
            .get_html(&url)
            .await
            .map_err(|e| CrawlError::Discovery(format!("member listing unreachable: {}", e)))?;

        parse_member_bound(&html, &self.id_pattern).ok_or_else(|| {
            CrawlError::Discovery(format!("no member links on {}", url))
        })
    }

    /// `Ok(None)` when the sequence number holds nobody.
    pub async fn fetch_member(&self, url: &str) -> Result<Option<MemberPage>, ScraperError> {
        let html = match self.source.get_html(url).await {
            Ok(html) => html,
            Err(ScraperError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(parse_member_page(&html, &self.schema.member)?)
    }

    /// Members with speeches, named first name first.
    pub async fn speakers(&self) -> Result<Vec<Speaker>, CrawlError> {
        let url = self.schema.speakers_url();
        log::info!("Fetching speaker index: {}", url);
        let html = self
            .source
            .get_html(&url)
            .await
            .map_err(|e| CrawlError::Discovery(format!("speaker index unreachable: {}", e)))?;

        let speakers: Vec<Speaker> = parse_speakers(&html, &self.schema.speeches)
            .map_err(|e| CrawlError::Discovery(e.to_string()))?
            .into_iter()
            .map(|(name, href)| Speaker {
                name: swap_name_with_surname(&name),
                url: self.schema.resolve(&href),
            })
            .collect();

        if speakers.is_empty() {
            return Err(CrawlError::Discovery(format!("no speakers on {}", url)));
        }
        Ok(speakers)
    }

    /// Every row of a speaker's listing, walking the pagination control in
    /// page order.
    pub async fn speech_listings(&self, speaker: &Speaker) -> Result<Vec<SpeechListing>, ScraperError> {
        let html = self.source.get_html(&speaker.url).await?;

        let pages = match parse_speech_pages(&html, &self.schema.speeches)? {
            Some(pages) if !pages.is_empty() => pages,
            _ => return Ok(parse_speech_listing(&html, &self.schema.speeches)?),
        };

        log::debug!("{} has {} listing pages", speaker.name, pages.len());
        let mut listings = Vec::new();
        for page in pages {
            let html = self.source.get_html(&self.schema.resolve(&page)).await?;
            listings.extend(parse_speech_listing(&html, &self.schema.speeches)?);
        }
        Ok(listings)
    }

    /// Speech text, fetched again once if the page comes back without it.
    pub async fn speech_text(&self, url: &str) -> Result<String, ScraperError> {
        match self.fetch_speech_text(url).await {
            Ok(text) => Ok(text),
            Err(ScraperError::ParseError(e)) => {
                log::warn!("Retrying speech {}: {}", url, e);
                self.fetch_speech_text(url)
                    .await
                    .inspect_err(|e| log::error!("Giving up on speech {}: {}", url, e))
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_speech_text(&self, url: &str) -> Result<String, ScraperError> {
        let html = self.source.get_html(url).await?;
        Ok(parse_speech_text(&html, &self.schema.speeches)?)
    }
}
