use url::Url;

/// Returns the host identity used for same-site scoping
///
/// The key is the lowercase host, followed by `:port` when the URL carries a
/// port that is not the scheme default. Two URLs are on the same site exactly
/// when their keys are equal, so `https://docs.example.com` and
/// `https://example.com` are different sites.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use site_ingest::url::host_key;
///
/// let url = Url::parse("https://Docs.Example.com/path").unwrap();
/// assert_eq!(host_key(&url), Some("docs.example.com".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(host_key(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}

/// Returns true if `url` belongs to the site identified by `allowed_host`
pub fn in_scope(url: &Url, allowed_host: &str) -> bool {
    host_key(url).map_or(false, |key| key == allowed_host)
}
