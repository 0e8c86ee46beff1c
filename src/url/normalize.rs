use crate::UrlError;
use url::Url;

/// Normalizes a URL into the form the crawler keys pages by
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Accept only `http` and `https` schemes
/// 3. Require a host
/// 4. Remove the fragment (everything after #)
/// 5. An empty path becomes `/`
///
/// The query string is kept verbatim: whether it disqualifies a link is a
/// crawl policy decision, not a normalization one.
///
/// # Examples
///
/// ```
/// use trawl::url::normalize_url;
///
/// let url = normalize_url("http://example.com/page#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/page");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim())?;
    normalize_parsed(url)
}

/// Resolves a possibly relative link against the page it was found on and
/// normalizes the result
pub fn resolve_against(base: &Url, link: &str) -> Result<Url, UrlError> {
    let url = base.join(link.trim())?;
    normalize_parsed(url)
}

/// Returns the Page Store key for a normalized URL
pub fn canonical_key(url: &Url) -> String {
    url.as_str().to_string()
}

fn normalize_parsed(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::MissingDomain),
    }

    url.set_fragment(None);

    if url.path().is_empty() {
        url.set_path("/");
    }

    Ok(url)
}
