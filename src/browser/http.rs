use reqwest::blocking::Client;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use tracing::debug;

use super::{Browser, BrowserSession, Page};
use crate::config::BrowserConfig;
use crate::error::{PipelineError, Result};

const SERVICE: &str = "browser";

/// Browser backed by plain HTTP fetches. Pages are parsed as served, without
/// running scripts.
#[derive(Clone)]
pub struct HttpBrowser {
    client: Client,
}

impl HttpBrowser {
    pub fn new(config: &BrowserConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(PipelineError::upstream(SERVICE))?;
        Ok(Self { client })
    }
}

impl Browser for HttpBrowser {
    fn open_session(&self) -> Result<Box<dyn BrowserSession>> {
        debug!("opening http browser session");
        Ok(Box::new(HttpSession {
            client: self.client.clone(),
            current: None,
        }))
    }
}

struct Loaded {
    url: String,
    body: String,
}

struct HttpSession {
    client: Client,
    current: Option<Loaded>,
}

impl HttpSession {
    fn fetch(&self, url: &str) -> Result<Loaded> {
        let resp = self.client.get(url).send().map_err(|e| PipelineError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let status = resp.status();
        let final_url = resp.url().to_string();
        if !status.is_success() {
            return Err(PipelineError::Navigation {
                url: url.to_string(),
                message: format!("status {status}"),
            });
        }
        let body = resp.text().map_err(PipelineError::upstream(SERVICE))?;
        Ok(Loaded {
            url: final_url,
            body,
        })
    }
}

impl BrowserSession for HttpSession {
    fn navigate(&mut self, url: &str) -> Result<()> {
        debug!(url, "navigating");
        self.current = Some(self.fetch(url)?);
        Ok(())
    }

    fn page(&self) -> Result<Page> {
        let loaded = self.current.as_ref().ok_or(PipelineError::NoPage)?;
        Ok(Page::parse(loaded.url.clone(), &loaded.body))
    }

    fn refresh(&mut self) -> Result<()> {
        let url = self
            .current
            .as_ref()
            .map(|loaded| loaded.url.clone())
            .ok_or(PipelineError::NoPage)?;
        self.current = Some(self.fetch(&url)?);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        debug!("closing http browser session");
        self.current = None;
        Ok(())
    }

    /// Served HTML never changes without a new request
    fn is_live(&self) -> bool {
        false
    }
}
