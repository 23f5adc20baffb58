//! HTML link extraction
//!
//! Pulls the outgoing anchor links of a fetched page, resolved to absolute
//! URLs with fragments removed.

use scraper::{Html, Selector};
use url::Url;

/// Links extracted from one page
///
/// The sequence is computed once, when the page is parsed; iterating it
/// again requires parsing the page again.
#[derive(Debug)]
pub struct ExtractedLinks {
    links: std::vec::IntoIter<Url>,
}

impl Iterator for ExtractedLinks {
    type Item = Url;

    fn next(&mut self) -> Option<Url> {
        self.links.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.links.size_hint()
    }
}

impl ExactSizeIterator for ExtractedLinks {}

/// Extracts anchor links from HTML content
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` anywhere in the document
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - empty and fragment-only hrefs (same page anchors)
/// - `javascript:`, `mailto:`, `tel:` links and data URIs
/// - anything that is not HTTP(S) after resolution
///
/// Relative links resolve against `page_url`, which should be the page's
/// final URL after redirects.
///
/// # Example
///
/// ```
/// use site_ingest::crawler::extract_links;
/// use url::Url;
///
/// let html = r#"<a href="/guide#setup">Guide</a><a href="mailto:x@y.z">Mail</a>"#;
/// let page = Url::parse("https://docs.example.com/intro").unwrap();
/// let links: Vec<Url> = extract_links(html, &page).collect();
/// assert_eq!(links.len(), 1);
/// assert_eq!(links[0].as_str(), "https://docs.example.com/guide");
/// ```
pub fn extract_links(html: &str, page_url: &Url) -> ExtractedLinks {
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(href) = element.value().attr("href") {
                if let Some(absolute_url) = resolve_link(href, page_url) {
                    links.push(absolute_url);
                }
            }
        }
    }

    ExtractedLinks {
        links: links.into_iter(),
    }
}

/// Resolves a link href to an absolute URL and validates it
fn resolve_link(href: &str, page_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    let mut absolute_url = page_url.join(href).ok()?;
    if absolute_url.scheme() != "http" && absolute_url.scheme() != "https" {
        return None;
    }

    absolute_url.set_fragment(None);
    Some(absolute_url)
}
