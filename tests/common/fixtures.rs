use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use image::{ImageBuffer, Rgb};
use shelfscan::browser::{Browser, BrowserSession, Page};
use shelfscan::{
    BookPipeline, DetectionModel, OutputConfig, PipelineConfig, PipelineError, Prediction,
    ScrapeConfig, SearchClient, SearchConfig, SegmentationService, TitleExtractionService,
    VisionModel, WaitPolicy,
};

pub const SEARCH_ENDPOINT: &str = "https://www.google.com/search";
pub const DUNE_LINK: &str = "https://www.goodreads.com/book/show/44767458-dune";

/// Writes a 100x100 test image into `dir` and returns its path.
pub fn create_test_image(dir: &Path) -> PathBuf {
    let img = ImageBuffer::from_fn(100, 100, |x, y| Rgb([(x * 2) as u8, (y * 2) as u8, 128u8]));
    let path = dir.join("shelf.png");
    img.save_with_format(&path, image::ImageFormat::Png)
        .expect("Failed to save test image");
    path
}

/// Rectangle prediction spanning `x0..=x1` horizontally
pub fn spine(id: Option<&str>, confidence: f32, x0: f32, x1: f32) -> Prediction {
    Prediction {
        detection_id: id.map(str::to_string),
        confidence,
        class: Some("book".to_string()),
        points: vec![(x0, 10.0), (x1, 10.0), (x1, 90.0), (x0, 90.0)],
    }
}

pub struct FakeDetectionModel {
    pub predictions: Option<Vec<Prediction>>,
}

impl DetectionModel for FakeDetectionModel {
    fn infer(&self, _image: &[u8]) -> shelfscan::Result<Vec<Prediction>> {
        self.predictions
            .clone()
            .ok_or_else(|| PipelineError::Model("inference endpoint returned 500".into()))
    }
}

pub enum Answer {
    Text(&'static str),
    Nothing,
    Fail,
}

/// Answers one queued reply per call
pub struct FakeVisionModel {
    answers: RefCell<VecDeque<Answer>>,
}

impl FakeVisionModel {
    pub fn new(answers: Vec<Answer>) -> Self {
        Self {
            answers: RefCell::new(answers.into()),
        }
    }
}

impl VisionModel for FakeVisionModel {
    fn ask(&self, image_png: &[u8], _instruction: &str) -> shelfscan::Result<Option<String>> {
        assert!(image_png.starts_with(b"\x89PNG"), "crop should be PNG encoded");
        match self.answers.borrow_mut().pop_front() {
            Some(Answer::Text(text)) => Ok(Some(text.to_string())),
            Some(Answer::Nothing) | None => Ok(None),
            Some(Answer::Fail) => Err(PipelineError::UpstreamStatus {
                service: "chat completions",
                status: 503,
                body: "overloaded".into(),
            }),
        }
    }
}

/// Serves canned HTML by longest matching URL prefix and counts sessions
#[derive(Clone, Default)]
pub struct FakeBrowser {
    routes: Rc<RefCell<Vec<(String, String)>>>,
    pub opened: Rc<Cell<usize>>,
    pub closed: Rc<Cell<usize>>,
    pub refreshes: Rc<Cell<usize>>,
    pub visited: Rc<RefCell<Vec<String>>>,
    refresh_fails: bool,
    static_pages: bool,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, prefix: impl Into<String>, html: impl Into<String>) -> Self {
        self.routes.borrow_mut().push((prefix.into(), html.into()));
        self
    }

    /// Every refresh answers 429, leaving the loaded page in place
    pub fn with_failing_refresh(mut self) -> Self {
        self.refresh_fails = true;
        self
    }

    /// Sessions report their pages as static, like the HTTP backend
    pub fn with_static_pages(mut self) -> Self {
        self.static_pages = true;
        self
    }
}

impl Browser for FakeBrowser {
    fn open_session(&self) -> shelfscan::Result<Box<dyn BrowserSession>> {
        self.opened.set(self.opened.get() + 1);
        Ok(Box::new(FakeSession {
            browser: self.clone(),
            current: None,
        }))
    }
}

struct FakeSession {
    browser: FakeBrowser,
    current: Option<(String, String)>,
}

impl BrowserSession for FakeSession {
    fn navigate(&mut self, url: &str) -> shelfscan::Result<()> {
        self.browser.visited.borrow_mut().push(url.to_string());
        let routes = self.browser.routes.borrow();
        let html = routes
            .iter()
            .filter(|(prefix, _)| url.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, html)| html.clone())
            .ok_or_else(|| PipelineError::Navigation {
                url: url.to_string(),
                message: "status 404 Not Found".into(),
            })?;
        self.current = Some((url.to_string(), html));
        Ok(())
    }

    fn page(&self) -> shelfscan::Result<Page> {
        let (url, html) = self.current.as_ref().ok_or(PipelineError::NoPage)?;
        Ok(Page::parse(url.clone(), html))
    }

    fn refresh(&mut self) -> shelfscan::Result<()> {
        self.browser.refreshes.set(self.browser.refreshes.get() + 1);
        if self.browser.refresh_fails {
            let url = self.current.as_ref().map(|(url, _)| url.clone()).unwrap_or_default();
            return Err(PipelineError::Navigation {
                url,
                message: "status 429 Too Many Requests".into(),
            });
        }
        Ok(())
    }

    fn close(&mut self) -> shelfscan::Result<()> {
        self.browser.closed.set(self.browser.closed.get() + 1);
        Ok(())
    }

    fn is_live(&self) -> bool {
        !self.browser.static_pages
    }
}

/// Search URL the pipeline requests for a book name
pub fn search_url(book_name: &str) -> String {
    format!("{}?as_q={}+goodreads", SEARCH_ENDPOINT, book_name.replace(' ', "+"))
}

pub fn search_results_html(links: &[&str]) -> String {
    let rows: String = links
        .iter()
        .map(|link| {
            format!(
                r#"<div class="MjjYud"><div><a href="{link}"><h3>{link}</h3></a></div></div>"#
            )
        })
        .collect();
    format!("<html><body><div id=\"search\">{rows}</div></body></html>")
}

pub struct BookPage<'a> {
    pub title: &'a str,
    pub authors: &'a [&'a str],
    pub description: Option<&'a str>,
    pub genres: &'a [&'a str],
    /// `None` renders a card without review text
    pub reviews: &'a [Option<&'a str>],
}

impl BookPage<'_> {
    pub fn html(&self) -> String {
        let authors: String = self
            .authors
            .iter()
            .map(|name| {
                format!(
                    r#"<a class="ContributorLink">
                       <span class="ContributorLink__name">{name}</span></a>"#
                )
            })
            .collect();
        let description = self
            .description
            .map(|text| {
                format!(
                    r#"<div data-testid="description"><span class="Formatted">{text}</span>
                       <button>Show more</button></div>"#
                )
            })
            .unwrap_or_default();
        let genres: String = self
            .genres
            .iter()
            .map(|genre| {
                format!(
                    r#"<span class="BookPageMetadataSection__genreButton"><a>{genre}</a></span>"#
                )
            })
            .collect();
        let reviews: String = self
            .reviews
            .iter()
            .map(|review| match review {
                Some(text) => format!(
                    r#"<article class="ReviewCard"><section class="ReviewCard__content">
                       <section class="ReviewText"><span>{text}</span></section>
                       </section></article>"#
                ),
                None => r#"<article class="ReviewCard">
                           <section class="ReviewCard__rating">5 stars</section></article>"#
                    .to_string(),
            })
            .collect();

        format!(
            r#"<html><body><main>
              <div class="BookPageTitleSection"><h1 data-testid="bookTitle">{title}</h1></div>
              <div class="BookPageMetadataSection">
                <div class="ContributorLinksList">{authors}</div>
                {description}
                <div data-testid="genresList">
                  <span class="Text">Genres</span>{genres}<button>...more</button>
                </div>
              </div>
              <div class="ReviewsList">{reviews}</div>
            </main></body></html>"#,
            title = self.title,
        )
    }
}

pub fn dune_page(reviews: &[Option<&str>]) -> String {
    BookPage {
        title: "Dune",
        authors: &["Frank Herbert"],
        description: Some("Set on the desert planet Arrakis."),
        genres: &["Science Fiction", "Fiction"],
        reviews,
    }
    .html()
}

pub fn test_scrape_config() -> ScrapeConfig {
    ScrapeConfig {
        review_wait: WaitPolicy::immediate(),
        ..ScrapeConfig::default()
    }
}

/// Pipeline over fakes that writes everything under `dir` and never sleeps
pub fn make_pipeline(
    dir: &Path,
    predictions: Option<Vec<Prediction>>,
    answers: Vec<Answer>,
    browser: &FakeBrowser,
) -> BookPipeline {
    let segmentation = SegmentationService::new(Box::new(FakeDetectionModel { predictions }));
    let extraction = TitleExtractionService::new(Box::new(FakeVisionModel::new(answers)));
    let search = SearchClient::new(Box::new(browser.clone()), SearchConfig::default());
    let config = PipelineConfig::default()
        .with_output(OutputConfig::rooted_at(dir))
        .with_scrape(test_scrape_config())
        .with_candidate_delay(std::time::Duration::ZERO);

    BookPipeline::new(segmentation, extraction, search, Box::new(browser.clone()))
        .with_config(config)
}
