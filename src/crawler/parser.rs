//! Link extraction from fetched HTML
//!
//! Followed: `<a href>` anywhere in the document and
//! `<link rel="canonical">`. `rel="nofollow"` does not stop a link from
//! being reported; following it or not is crawl policy.
//!
//! Dropped: `download` anchors, `javascript:`, `mailto:`, `tel:` and
//! `data:` targets, same-page fragments and anything that does not resolve
//! to an http(s) URL.

use crate::url::resolve_against;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

const IGNORED_SCHEMES: [&str; 4] = ["javascript:", "mailto:", "tel:", "data:"];

/// Extracts outbound links from `html`, resolved against `page_url` (or the
/// document's `<base href>` when present)
///
/// Links come back absolute, without fragments, de-duplicated and in
/// document order.
pub fn extract_links(html: &str, page_url: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let base = document_base(&document, page_url);

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for href in anchor_targets(&document).chain(canonical_targets(&document)) {
        if let Some(link) = resolve_href(href, &base) {
            if seen.insert(link.clone()) {
                links.push(link);
            }
        }
    }

    links
}

fn document_base(document: &Html, page_url: &Url) -> Url {
    let Ok(selector) = Selector::parse("base[href]") else {
        return page_url.clone();
    };
    document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .unwrap_or_else(|| page_url.clone())
}

fn anchor_targets(document: &Html) -> impl Iterator<Item = &str> {
    select_hrefs(document, "a[href]")
        .filter(|(element, _)| element.value().attr("download").is_none())
        .map(|(_, href)| href)
}

fn canonical_targets(document: &Html) -> impl Iterator<Item = &str> {
    select_hrefs(document, "link[rel='canonical'][href]").map(|(_, href)| href)
}

fn select_hrefs<'a>(
    document: &'a Html,
    selector: &str,
) -> impl Iterator<Item = (scraper::ElementRef<'a>, &'a str)> {
    let selector = Selector::parse(selector).ok();
    selector
        .into_iter()
        .flat_map(move |selector| document.select(&selector).collect::<Vec<_>>())
        .filter_map(|element| element.value().attr("href").map(|href| (element, href)))
}

fn resolve_href(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if IGNORED_SCHEMES.iter().any(|scheme| lowered.starts_with(scheme)) {
        return None;
    }

    resolve_against(base, href).ok().map(|url| url.to_string())
}
