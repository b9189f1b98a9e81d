//! Metadata scraping for catalog book pages.
//!
//! A scrape walks a fixed sequence of states. Title, description and genres
//! are required: a miss aborts the whole target. Reviews are optional per
//! card.

use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use crate::browser::page::{element_text, find_within};
use crate::browser::{BrowserSession, Page, wait_for};
use crate::config::ScrapeConfig;
use crate::error::{PipelineError, Result};
use crate::models::BookRecord;

const TITLE_SECTION: &str = ".BookPageTitleSection";
const CONTRIBUTOR_NAME: &str = ".ContributorLink__name";
const DESCRIPTION: &str = r#"div[data-testid="description"]"#;
const GENRES: &str = r#"div[data-testid="genresList"]"#;
const REVIEW_CARD: &str = ".ReviewCard";
const REVIEW_TEXT: &str = ".ReviewCard__content .ReviewText";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeState {
    Idle,
    Loaded,
    TitleExtracted,
    DescriptionExtracted,
    GenresExtracted,
    /// Review cards have appeared, or the wait for them ran out
    ReviewsReady,
    ReviewsExtracted,
    Done,
}

impl fmt::Display for ScrapeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScrapeState::Idle => "idle",
            ScrapeState::Loaded => "loaded",
            ScrapeState::TitleExtracted => "title-extracted",
            ScrapeState::DescriptionExtracted => "description-extracted",
            ScrapeState::GenresExtracted => "genres-extracted",
            ScrapeState::ReviewsReady => "reviews-ready",
            ScrapeState::ReviewsExtracted => "reviews-extracted",
            ScrapeState::Done => "done",
        };
        f.write_str(name)
    }
}

/// A scrape that stopped before reaching [`ScrapeState::Done`]
#[derive(Debug, Error)]
#[error("scrape stopped in state {state}: {source}")]
pub struct ScrapeError {
    pub state: ScrapeState,
    #[source]
    pub source: PipelineError,
}

/// Scrapes book pages on the configured catalog site
#[derive(Debug, Clone)]
pub struct MetadataScraper {
    config: ScrapeConfig,
}

impl MetadataScraper {
    pub fn new(config: ScrapeConfig) -> Self {
        Self { config }
    }

    /// Whether `link` points into the catalog site
    pub fn accepts(&self, link: &str) -> bool {
        link.starts_with(&self.config.site_base)
    }

    /// First link in `links` that points into the catalog site
    pub fn first_catalog_link<'a>(&self, links: &'a [String]) -> Option<&'a str> {
        links
            .iter()
            .map(String::as_str)
            .find(|link| self.accepts(link))
    }

    /// Walk the scrape states for `link` using the caller's session.
    ///
    /// The returned record has `source_link` empty; the caller attaches it.
    pub fn scrape(
        &self,
        session: &mut dyn BrowserSession,
        link: &str,
    ) -> Result<BookRecord, ScrapeError> {
        let mut machine = ScrapeMachine::new(link);
        while machine.state != ScrapeState::Done {
            if let Err(source) = machine.step(session, &self.config) {
                return Err(ScrapeError {
                    state: machine.state,
                    source,
                });
            }
        }
        Ok(machine.record)
    }
}

struct ScrapeMachine<'a> {
    link: &'a str,
    state: ScrapeState,
    record: BookRecord,
}

impl<'a> ScrapeMachine<'a> {
    fn new(link: &'a str) -> Self {
        Self {
            link,
            state: ScrapeState::Idle,
            record: BookRecord::default(),
        }
    }

    fn step(&mut self, session: &mut dyn BrowserSession, config: &ScrapeConfig) -> Result<()> {
        let next = match self.state {
            ScrapeState::Idle => {
                session.navigate(self.link)?;
                ScrapeState::Loaded
            }
            ScrapeState::Loaded => {
                let page = session.page()?;
                let section = page.find(TITLE_SECTION)?;
                self.record.title = flatten(&element_text(section));
                self.record.authors = authors(&page)?;
                ScrapeState::TitleExtracted
            }
            ScrapeState::TitleExtracted => {
                let page = session.page()?;
                let description = page.find(DESCRIPTION)?;
                self.record.description = clean_description(&element_text(description));
                ScrapeState::DescriptionExtracted
            }
            ScrapeState::DescriptionExtracted => {
                let page = session.page()?;
                let genres = page.find(GENRES)?;
                self.record.genres = clean_genres(&element_text(genres));
                ScrapeState::GenresExtracted
            }
            ScrapeState::GenresExtracted => {
                match wait_for(session, REVIEW_CARD, config.review_wait) {
                    Ok(true) => {}
                    Ok(false) => debug!(link = self.link, "no review cards appeared"),
                    // Reviews are optional: read whatever the last good page holds
                    Err(err) => {
                        warn!(link = self.link, error = %err, "wait for review cards failed")
                    }
                }
                ScrapeState::ReviewsReady
            }
            ScrapeState::ReviewsReady => {
                let page = session.page()?;
                self.record.reviews = reviews(&page, config.max_reviews)?;
                ScrapeState::ReviewsExtracted
            }
            ScrapeState::ReviewsExtracted | ScrapeState::Done => ScrapeState::Done,
        };
        debug!(link = self.link, from = %self.state, to = %next, "scrape transition");
        self.state = next;
        Ok(())
    }
}

fn authors(page: &Page) -> Result<String> {
    let mut names: Vec<String> = Vec::new();
    for element in page.find_all(CONTRIBUTOR_NAME)? {
        let name = flatten(&element_text(element));
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    Ok(names.join(", "))
}

/// Text of the first `limit` review cards, skipping cards without review text
fn reviews(page: &Page, limit: usize) -> Result<Vec<String>> {
    let mut reviews = Vec::new();
    for (index, card) in page.find_all(REVIEW_CARD)?.into_iter().take(limit).enumerate() {
        match find_within(card, REVIEW_TEXT)? {
            Some(text) => reviews.push(clean_description(&element_text(text))),
            None => debug!(card = index, "review card has no text, skipping"),
        }
    }
    Ok(reviews)
}

fn flatten(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Flatten lines and drop the "Show more" toggle
pub fn clean_description(text: &str) -> String {
    flatten(&text.replace("Show more", ""))
}

/// One genre per line, without the list label or the "...more" toggle
pub fn clean_genres(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.replace("...more", "").replace("…more", ""))
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty() && line != "Genres")
        .collect()
}
