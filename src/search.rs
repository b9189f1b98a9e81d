use tracing::debug;
use url::Url;

use crate::browser::page::{element_text, find_within};
use crate::browser::{Browser, BrowserSession, with_session};
use crate::config::SearchConfig;
use crate::error::{PipelineError, Result};

/// Scrapes organic result links from a search engine results page
pub struct SearchClient {
    browser: Box<dyn Browser>,
    config: SearchConfig,
}

impl SearchClient {
    pub fn new(browser: Box<dyn Browser>, config: SearchConfig) -> Self {
        Self { browser, config }
    }

    pub fn query_url(&self, query: &str) -> Result<Url> {
        Url::parse_with_params(&self.config.endpoint, &[("as_q", query)]).map_err(|e| {
            PipelineError::Navigation {
                url: self.config.endpoint.clone(),
                message: e.to_string(),
            }
        })
    }

    /// Result links in page order, one per result row. Each call runs in its
    /// own browser session.
    pub fn search(&self, query: &str) -> Result<Vec<String>> {
        let url = self.query_url(query)?;
        with_session(self.browser.as_ref(), |session| self.collect_links(session, &url))
    }

    fn collect_links(&self, session: &mut dyn BrowserSession, url: &Url) -> Result<Vec<String>> {
        session.navigate(url.as_str())?;
        let page = session.page()?;
        let base = Url::parse(page.url()).unwrap_or_else(|_| url.clone());

        let rows = page.find_all(&format!(".{}", self.config.result_row_class))?;
        let mut links = Vec::new();
        for row in rows {
            let Some(anchor) = find_within(row, "a")? else {
                continue;
            };
            match anchor.value().attr("href").and_then(|href| resolve_link(&base, href)) {
                Some(link) => links.push(link),
                None => debug!(row = %element_text(row), "result row without usable link"),
            }
        }

        debug!(url = %url, links = links.len(), "search results collected");
        Ok(links)
    }
}

/// Absolute target of a result anchor, unwrapping `/url?q=` redirects
fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let absolute = base.join(href).ok()?;
    if absolute.path() == "/url" && absolute.host_str() == base.host_str() {
        return absolute
            .query_pairs()
            .find(|(key, _)| key == "q" || key == "url")
            .map(|(_, target)| target.into_owned());
    }
    Some(absolute.to_string())
}
