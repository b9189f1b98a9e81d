//! Browser sessions used by search and scraping.
//!
//! A [`Browser`] hands out sessions wrapped in a [`SessionGuard`]; dropping
//! the guard closes the session, so every exit path releases it.

pub mod http;
pub mod page;

use std::ops::{Deref, DerefMut};
use std::time::Instant;

use tracing::{debug, warn};

use crate::config::WaitPolicy;
use crate::error::Result;

pub use http::HttpBrowser;
pub use page::Page;

/// One live browsing context
pub trait BrowserSession {
    fn navigate(&mut self, url: &str) -> Result<()>;

    /// Snapshot of the current document
    fn page(&self) -> Result<Page>;

    /// Reload the current document so late content can appear
    fn refresh(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Whether the loaded document can change without navigating again.
    ///
    /// Waits only poll sessions that report `true`; for the rest a single
    /// check decides.
    fn is_live(&self) -> bool {
        true
    }
}

/// Factory for browser sessions
pub trait Browser {
    fn open_session(&self) -> Result<Box<dyn BrowserSession>>;

    fn open(&self) -> Result<SessionGuard> {
        Ok(SessionGuard::new(self.open_session()?))
    }
}

/// Owns a session and closes it when dropped
pub struct SessionGuard {
    session: Option<Box<dyn BrowserSession>>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn BrowserSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    /// Close now and surface any error instead of logging it
    pub fn close(mut self) -> Result<()> {
        match self.session.take() {
            Some(mut session) => session.close(),
            None => Ok(()),
        }
    }
}

impl Deref for SessionGuard {
    type Target = dyn BrowserSession;

    fn deref(&self) -> &Self::Target {
        self.session
            .as_deref()
            .unwrap_or_else(|| unreachable!("session used after close"))
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
            .as_deref_mut()
            .unwrap_or_else(|| unreachable!("session used after close"))
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(err) = session.close() {
                warn!(error = %err, "failed to close browser session");
            }
        }
    }
}

/// Run `f` inside a fresh session that is closed however `f` returns
pub fn with_session<T>(
    browser: &dyn Browser,
    f: impl FnOnce(&mut dyn BrowserSession) -> Result<T>,
) -> Result<T> {
    let mut guard = browser.open()?;
    let result = f(&mut *guard);
    drop(guard);
    result
}

/// Poll until `css` matches on the current page or the policy times out.
///
/// Returns whether the element appeared.
pub fn wait_for(session: &mut dyn BrowserSession, css: &str, policy: WaitPolicy) -> Result<bool> {
    let started = Instant::now();
    loop {
        if session.page()?.exists(css)? {
            return Ok(true);
        }
        if !session.is_live() {
            debug!(selector = css, "static page, not polling");
            return Ok(false);
        }
        if started.elapsed() >= policy.timeout {
            debug!(selector = css, timeout = ?policy.timeout, "wait timed out");
            return Ok(false);
        }
        std::thread::sleep(policy.poll_interval);
        session.refresh()?;
    }
}
