//! Integration tests for the catalog page scraper.
//!
//! Tests cover:
//! - Required fields (title, description, genres) and author collection
//! - The three-review cap and DOM ordering
//! - Skipping review cards without text
//! - Aborting on missing required fields, and session teardown either way
//! - Review waits that fail or meet a static page

mod common;

use std::time::Duration;

use common::*;
use shelfscan::WaitPolicy;

fn scrape_html(html: String) -> (Result<BookRecord, shelfscan::ScrapeError>, FakeBrowser) {
    let browser = FakeBrowser::new().route(DUNE_LINK, html);
    let scraper = MetadataScraper::new(test_scrape_config());
    let result = with_session(&browser, |session| Ok(scraper.scrape(session, DUNE_LINK)))
        .expect("fake browser always opens");
    (result, browser)
}

#[test]
fn test_scrape_populates_required_fields() -> anyhow::Result<()> {
    let (result, _browser) = scrape_html(dune_page(&[Some("A masterpiece.")]));
    let record = result?;

    assert_eq!(record.title, "Dune");
    assert_eq!(record.authors, "Frank Herbert");
    assert_eq!(record.description, "Set on the desert planet Arrakis.");
    assert_eq!(record.genres, vec!["Science Fiction", "Fiction"]);
    assert_eq!(record.reviews, vec!["A masterpiece."]);
    // The caller attaches the link
    assert_eq!(record.source_link, "");

    Ok(())
}

#[test]
fn test_reviews_capped_at_three_in_dom_order() -> anyhow::Result<()> {
    let (result, _browser) = scrape_html(dune_page(&[
        Some("first"),
        Some("second"),
        Some("third"),
        Some("fourth"),
        Some("fifth"),
    ]));

    assert_eq!(result?.reviews, vec!["first", "second", "third"]);

    Ok(())
}

#[test]
fn test_fewer_reviews_than_cap() -> anyhow::Result<()> {
    let (result, _browser) = scrape_html(dune_page(&[Some("only one")]));
    assert_eq!(result?.reviews, vec!["only one"]);

    let (result, _browser) = scrape_html(dune_page(&[]));
    assert!(result?.reviews.is_empty());

    Ok(())
}

#[test]
fn test_review_card_without_text_is_skipped() -> anyhow::Result<()> {
    let (result, _browser) = scrape_html(dune_page(&[Some("kept"), None, Some("also kept")]));
    let record = result?;

    assert_eq!(record.reviews, vec!["kept", "also kept"]);
    // Required fields are unaffected by the bad card
    assert_eq!(record.title, "Dune");
    assert_eq!(record.genres.len(), 2);

    Ok(())
}

#[test]
fn test_missing_title_aborts_scrape() -> anyhow::Result<()> {
    let html = "<html><body><div data-testid=\"description\">text</div></body></html>".to_string();
    let (result, browser) = scrape_html(html);

    let err = result.expect_err("title section is required");
    assert_eq!(err.state, ScrapeState::Loaded);
    assert!(err.source.is_element_not_found());
    assert_eq!(browser.closed.get(), 1, "session must be closed after a failed scrape");

    Ok(())
}

#[test]
fn test_missing_description_aborts_after_title() -> anyhow::Result<()> {
    let html = BookPage {
        title: "Dune",
        authors: &[],
        description: None,
        genres: &["Fiction"],
        reviews: &[Some("ok")],
    }
    .html();
    let (result, _browser) = scrape_html(html);

    let err = result.expect_err("description is required");
    assert_eq!(err.state, ScrapeState::TitleExtracted);
    assert!(err.to_string().contains("description"));

    Ok(())
}

#[test]
fn test_unreachable_page_fails_in_idle_state() -> anyhow::Result<()> {
    let browser = FakeBrowser::new();
    let scraper = MetadataScraper::new(test_scrape_config());

    let result = with_session(&browser, |session| Ok(scraper.scrape(session, DUNE_LINK)))?;
    let err = result.expect_err("no route for the link");

    assert_eq!(err.state, ScrapeState::Idle);
    assert!(matches!(err.source, PipelineError::Navigation { .. }));
    assert_eq!(browser.opened.get(), 1);
    assert_eq!(browser.closed.get(), 1);

    Ok(())
}

fn polling_scraper(timeout: Duration) -> MetadataScraper {
    MetadataScraper::new(shelfscan::ScrapeConfig {
        review_wait: WaitPolicy {
            timeout,
            poll_interval: Duration::from_millis(1),
        },
        ..shelfscan::ScrapeConfig::default()
    })
}

#[test]
fn test_failed_refresh_during_review_wait_keeps_record() -> anyhow::Result<()> {
    // 1. A review-less page whose reloads are rate limited
    let browser = FakeBrowser::new()
        .route(DUNE_LINK, dune_page(&[]))
        .with_failing_refresh();
    let scraper = polling_scraper(Duration::from_secs(5));

    // 2. The wait gives up, but the required fields survive
    let record = with_session(&browser, |session| Ok(scraper.scrape(session, DUNE_LINK)))??;

    assert_eq!(record.title, "Dune");
    assert_eq!(record.genres, vec!["Science Fiction", "Fiction"]);
    assert!(record.reviews.is_empty());
    assert_eq!(browser.refreshes.get(), 1);
    assert_eq!(browser.closed.get(), 1);

    Ok(())
}

#[test]
fn test_static_pages_are_not_reloaded_while_waiting() -> anyhow::Result<()> {
    let browser = FakeBrowser::new()
        .route(DUNE_LINK, dune_page(&[]))
        .with_static_pages();
    let scraper = polling_scraper(Duration::from_secs(5));

    let record = with_session(&browser, |session| Ok(scraper.scrape(session, DUNE_LINK)))??;

    assert!(record.reviews.is_empty());
    assert_eq!(browser.refreshes.get(), 0);

    Ok(())
}

#[test]
fn test_live_pages_are_polled_until_timeout() -> anyhow::Result<()> {
    let browser = FakeBrowser::new().route(DUNE_LINK, dune_page(&[]));
    let scraper = polling_scraper(Duration::from_millis(50));

    with_session(&browser, |session| Ok(scraper.scrape(session, DUNE_LINK)))??;

    assert!(browser.refreshes.get() >= 1);

    Ok(())
}
