pub mod canonical;
pub mod crawl;
pub mod identity;
pub mod parser;
pub mod schema;
pub mod scraper;
pub mod site;
pub mod store;
pub mod sync;
pub mod transcript;
pub mod types;
pub mod utils;

#[cfg(test)]
mod testing;

pub use schema::SiteSchema;
pub use scraper::{PageSource, WebScraper};
pub use store::{JsonStore, Store};
pub use sync::{HarvestOptions, Harvester, SyncReport};
pub use transcript::TranscriptCleaner;
