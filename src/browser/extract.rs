//! DOM extraction over the rendered page.
//!
//! Extractors read a parsed snapshot of the page instead of running script in
//! the browser, so they can be tested against static HTML.

use super::PageDriver;
use crate::error::BrowserError;
use scraper::{ElementRef, Html, Selector};

pub trait Extractor {
    type Output;

    fn extract(&self, document: &Html) -> Self::Output;
}

pub async fn extract_structured_data<E: Extractor>(
    page: &dyn PageDriver,
    extractor: &E,
) -> Result<E::Output, BrowserError> {
    let html = page.content().await?;
    let document = Html::parse_document(&html);
    Ok(extractor.extract(&document))
}

pub(crate) fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

pub(crate) fn first<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = selector(css)?;
    document.select(&selector).next()
}

/// Trimmed text content of an element
pub(crate) fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
