//! HTML content extraction and Markdown conversion.
//!
//! Pulls the main content region out of a page (dropping nav/header/footer
//! chrome), converts it to Markdown with `htmd`, and runs a small cleanup
//! pass over the result.

use std::sync::LazyLock;

use feedloom_shared::{FeedloomError, Result};
use regex::Regex;
use scraper::Html;

/// Convert a raw HTML page to cleaned Markdown.
pub fn html_to_markdown(html: &str) -> Result<String> {
    let content_html = extract_content_html(html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "nav", "iframe", "noscript", "svg"])
        .build();

    let raw_markdown = converter
        .convert(&content_html)
        .map_err(|e| FeedloomError::parse(format!("htmd conversion failed: {e}")))?;

    Ok(cleanup(&raw_markdown))
}

/// Extract the main content HTML, stripping chrome (nav, header, footer, etc.).
fn extract_content_html(html: &str) -> String {
    let doc = Html::parse_document(html);

    // Try known content containers in priority order
    let selectors = ["article", "main", "[role=\"main\"]", ".content", "body"];

    for sel_str in &selectors {
        if let Ok(selector) = scraper::Selector::parse(sel_str) {
            if let Some(el) = doc.select(&selector).next() {
                return el.inner_html();
            }
        }
    }

    html.to_string()
}

/// Cleanup pass: collapse blank-line runs and trim edges.
fn cleanup(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    let collapsed = MULTI_BLANK_RE.replace_all(md, "\n\n");
    let mut result = collapsed.trim().to_string();
    result.push('\n');
    result
}
