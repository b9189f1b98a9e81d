use scraper::{ElementRef, Html, Selector};

use crate::error::{PipelineError, Result};

/// Parsed snapshot of the DOM a session currently shows
pub struct Page {
    url: String,
    document: Html,
}

impl Page {
    pub fn parse(url: impl Into<String>, html: &str) -> Self {
        Self {
            url: url.into(),
            document: Html::parse_document(html),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// First element matching `css`, or [`PipelineError::ElementNotFound`]
    pub fn find(&self, css: &str) -> Result<ElementRef<'_>> {
        let selector = parse_selector(css)?;
        self.document
            .select(&selector)
            .next()
            .ok_or_else(|| self.not_found(css))
    }

    /// Every element matching `css`, in document order
    pub fn find_all(&self, css: &str) -> Result<Vec<ElementRef<'_>>> {
        let selector = parse_selector(css)?;
        Ok(self.document.select(&selector).collect())
    }

    pub fn exists(&self, css: &str) -> Result<bool> {
        let selector = parse_selector(css)?;
        Ok(self.document.select(&selector).next().is_some())
    }

    pub fn not_found(&self, css: &str) -> PipelineError {
        PipelineError::ElementNotFound {
            selector: css.to_string(),
            url: self.url.clone(),
        }
    }
}

/// First descendant of `element` matching `css`
pub fn find_within<'a>(element: ElementRef<'a>, css: &str) -> Result<Option<ElementRef<'a>>> {
    let selector = parse_selector(css)?;
    Ok(element.select(&selector).next())
}

/// Rendered-text approximation: one line per non-blank text node
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| PipelineError::Selector {
        selector: css.to_string(),
        message: e.to_string(),
    })
}
