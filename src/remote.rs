//! Remote-source resolution: fetch a video from a Sora share page.
//!
//! The page URL is validated (HTTPS, allow-listed host, no loopback/private
//! addresses) before anything is fetched, then the page body is scanned with
//! an ordered list of pattern matchers. This is pattern matching, not
//! parsing, and brittle by design; the page format is externally controlled
//! and unversioned. The first pattern whose match passes the media-extension
//! check wins. [`MediaUrlExtractor`] isolates the heuristic so it can be
//! swapped for a real parser without touching anything else.

use std::net::{IpAddr, ToSocketAddrs};
use std::sync::LazyLock;
use std::time::Duration;

use log::{debug, info};
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::Url;

use crate::error::{Error, Result};

/// The one host (and its subdomains) pages may be fetched from.
pub const ALLOWED_PAGE_DOMAIN: &str = "sora.chatgpt.com";

/// Request timeout for page and media fetches.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Ordered pattern matchers: video-tag src, source-tag src, then the two
/// JSON field shapes seen in share pages.
static MEDIA_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?i)<video[^>]*?\ssrc\s*=\s*["']([^"']+)["']"#,
        r#"(?i)<source[^>]*?\ssrc\s*=\s*["']([^"']+)["']"#,
        r#""video_url"\s*:\s*"([^"]+)""#,
        r#""url"\s*:\s*"([^"]+?\.(?:mp4|webm|mov)[^"]*)""#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap_or_else(|e| unreachable!("bad pattern: {e}")))
    .collect()
});

/// Extracts a media URL from a fetched page body.
pub trait MediaUrlExtractor {
    /// Return the first media URL found in `html`, if any.
    fn extract_media_url(&self, html: &str) -> Option<String>;
}

/// The default regex-based extractor.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternExtractor;

impl MediaUrlExtractor for PatternExtractor {
    fn extract_media_url(&self, html: &str) -> Option<String> {
        for pattern in MEDIA_PATTERNS.iter() {
            if let Some(captures) = pattern.captures(html) {
                let candidate = captures.get(1).map(|m| m.as_str())?;
                if has_media_extension(candidate) {
                    debug!("pattern {pattern} matched {candidate}");
                    return Some(candidate.to_string());
                }
                // Matched but not a media file; fall through to the next
                // pattern rather than trusting it.
            }
        }
        None
    }
}

/// Check for a `.mp4`/`.webm`/`.mov` suffix, optionally followed by a query
/// string.
#[must_use]
pub fn has_media_extension(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = path.to_lowercase();
    path.ends_with(".mp4") || path.ends_with(".webm") || path.ends_with(".mov")
}

/// Validate a share-page URL with the system resolver.
///
/// # Errors
///
/// Returns [`Error::DisallowedUrl`] unless the URL is HTTPS, its host is
/// [`ALLOWED_PAGE_DOMAIN`] or a subdomain of it, and the host does not
/// resolve to a loopback, private, or link-local address.
pub fn validate_page_url(url: &str) -> Result<Url> {
    validate_page_url_with_resolver(url, |host| {
        Ok((host, 443u16)
            .to_socket_addrs()?
            .map(|a| a.ip())
            .collect())
    })
}

/// [`validate_page_url`] with an injectable resolver, for tests and callers
/// with their own DNS policy.
///
/// # Errors
///
/// See [`validate_page_url`]. Resolver failures surface as
/// [`Error::DisallowedUrl`] as well; an unresolvable host is not fetchable.
pub fn validate_page_url_with_resolver<F>(url: &str, resolve: F) -> Result<Url>
where
    F: Fn(&str) -> std::io::Result<Vec<IpAddr>>,
{
    let reject = |reason: &str| Error::DisallowedUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let parsed = Url::parse(url).map_err(|e| reject(&format!("malformed URL: {e}")))?;

    if parsed.scheme() != "https" {
        return Err(reject("only https page URLs are accepted"));
    }

    let Some(host) = parsed.host_str() else {
        return Err(reject("URL has no host"));
    };

    // IP-literal hosts are never the allowed domain; reject them before
    // bothering the resolver, with a sharper reason for internal ranges.
    if let Ok(ip) = host.trim_matches(['[', ']']).parse::<IpAddr>() {
        if is_disallowed_address(ip) {
            return Err(reject("host is a loopback/private/link-local address"));
        }
        return Err(reject("IP-literal hosts are not allowed"));
    }

    let host_lower = host.to_lowercase();
    if host_lower != ALLOWED_PAGE_DOMAIN
        && !host_lower.ends_with(&format!(".{ALLOWED_PAGE_DOMAIN}"))
    {
        return Err(reject(&format!(
            "host must be {ALLOWED_PAGE_DOMAIN} or a subdomain"
        )));
    }

    let addrs = resolve(&host_lower).map_err(|e| reject(&format!("host did not resolve: {e}")))?;
    if addrs.is_empty() {
        return Err(reject("host did not resolve to any address"));
    }
    if addrs.iter().any(|ip| is_disallowed_address(*ip)) {
        return Err(reject(
            "host resolves to a loopback/private/link-local address",
        ));
    }

    Ok(parsed)
}

/// Loopback, private, link-local, and unspecified ranges, for IPv4 and the
/// common IPv6 literal forms (including v4-mapped).
fn is_disallowed_address(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_disallowed_address(IpAddr::V4(mapped));
            }
            let segments = v6.segments();
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique-local
                || (segments[0] & 0xfe00) == 0xfc00
                // fe80::/10 link-local
                || (segments[0] & 0xffc0) == 0xfe80
        }
    }
}

/// A video fetched from a share page.
#[derive(Debug)]
pub struct RemoteSource {
    /// Suggested file name, derived from the media URL.
    pub name: String,
    /// The media URL the page pointed at.
    pub media_url: String,
    /// The raw media bytes.
    pub data: Vec<u8>,
}

/// Resolves a share-page URL to a downloaded video.
pub struct RemoteResolver<X: MediaUrlExtractor = PatternExtractor> {
    client: Client,
    extractor: X,
}

impl RemoteResolver<PatternExtractor> {
    /// Build a resolver with the default pattern extractor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fetch`] if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self> {
        Self::with_extractor(PatternExtractor)
    }
}

impl<X: MediaUrlExtractor> RemoteResolver<X> {
    /// Build a resolver with a custom extractor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fetch`] if the HTTP client cannot be constructed.
    pub fn with_extractor(extractor: X) -> Result<Self> {
        let client = Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self { client, extractor })
    }

    /// Validate the page URL, fetch the page, extract the media URL, and
    /// download the media.
    ///
    /// # Errors
    ///
    /// [`Error::DisallowedUrl`] on validation failure, [`Error::Fetch`] if
    /// the page or media is unreachable, [`Error::NoMediaUrl`] if no pattern
    /// matched. Callers are expected to degrade fetch/extraction failures to
    /// a manual-fallback message, not to fail silently.
    pub fn resolve(&self, page_url: &str) -> Result<RemoteSource> {
        let page = validate_page_url(page_url)?;
        info!("fetching share page {page}");
        let html = self
            .client
            .get(page.clone())
            .send()?
            .error_for_status()?
            .text()?;

        let media_url = self
            .extractor
            .extract_media_url(&html)
            .ok_or(Error::NoMediaUrl)?;

        // Patterns can yield page-relative paths; resolve against the page.
        let media = page.join(&media_url).map_err(|e| Error::DisallowedUrl {
            url: media_url.clone(),
            reason: format!("malformed media URL: {e}"),
        })?;
        if media.scheme() != "http" && media.scheme() != "https" {
            return Err(Error::DisallowedUrl {
                url: media.to_string(),
                reason: "media URL must be http or https".to_string(),
            });
        }

        info!("downloading media {media}");
        let data = self
            .client
            .get(media.clone())
            .send()?
            .error_for_status()?
            .bytes()?
            .to_vec();

        Ok(RemoteSource {
            name: file_name_from_url(&media),
            media_url: media.to_string(),
            data,
        })
    }
}

/// Instructions shown when the remote path fails and the user should
/// download the video themselves.
#[must_use]
pub fn manual_fallback_instructions(page_url: &str) -> String {
    format!(
        "Could not fetch the video automatically.\n\
         Open {page_url} in a browser, save the video locally\n\
         (right-click the player, \"Save video as...\"), then re-run this\n\
         tool with the downloaded file as input."
    )
}

/// Last path segment of the media URL, or a generic name.
fn file_name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .map_or_else(|| "video.mp4".to_string(), ToString::to_string)
}
