//! Feed sources.
//!
//! [`FeedSource`] is the seam between the refresh engine and the network.
//! [`HttpFeedSource`] fetches over HTTP with SSRF protection and size
//! limits, then parses RSS or Atom with feed-rs.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use feed_rs::parser;
use reqwest::Client;
use tracing::debug;

use crate::config::FetcherConfig;
use crate::error::{Result, RssfeedError};
use crate::feed::types::{ParsedEntry, ParsedFeed};

/// Something that can produce a parsed feed document for a URL.
///
/// Every failure (network, HTTP status, malformed document) is reported as
/// [`RssfeedError::Fetch`].
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch and parse the document at `url`.
    async fn fetch(&self, url: &str) -> Result<ParsedFeed>;
}

/// HTTP feed source.
pub struct HttpFeedSource {
    client: Client,
    config: FetcherConfig,
}

impl HttpFeedSource {
    /// Create a source with its own HTTP client.
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .timeout(Duration::from_secs(config.total_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| RssfeedError::Fetch(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn check_size(&self, size: u64) -> Result<()> {
        if size > self.config.max_feed_size_bytes {
            return Err(RssfeedError::Fetch(format!(
                "feed too large: {} bytes (max {} bytes)",
                size, self.config.max_feed_size_bytes
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &str) -> Result<ParsedFeed> {
        if !self.config.allow_private_hosts {
            validate_url(url)?;
        }

        debug!("Fetching feed {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RssfeedError::Fetch(format!("failed to fetch feed: {}", e)))?;

        if !response.status().is_success() {
            return Err(RssfeedError::Fetch(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        if let Some(content_length) = response.content_length() {
            self.check_size(content_length)?;
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RssfeedError::Fetch(format!("failed to read response: {}", e)))?;
        self.check_size(bytes.len() as u64)?;

        parse_feed(&bytes, self.config.max_description_length)
    }
}

/// Validate a feed URL for SSRF protection.
///
/// Only http and https are accepted, and the host must not be a loopback,
/// private or otherwise reserved address or an intranet-style hostname.
pub fn validate_url(url: &str) -> Result<()> {
    let parsed =
        url::Url::parse(url).map_err(|e| RssfeedError::Fetch(format!("invalid URL: {}", e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(RssfeedError::Fetch(format!(
                "unsupported URL scheme: {}",
                scheme
            )));
        }
    }

    let host = parsed
        .host()
        .ok_or_else(|| RssfeedError::Fetch("URL has no host".to_string()))?;

    let ip = match host {
        url::Host::Domain(domain) => {
            if is_forbidden_hostname(domain) {
                return Err(RssfeedError::Fetch(format!("forbidden host: {}", domain)));
            }
            return Ok(());
        }
        url::Host::Ipv4(v4) => IpAddr::V4(v4),
        url::Host::Ipv6(v6) => IpAddr::V6(v6),
    };

    if is_private_ip(&ip) {
        return Err(RssfeedError::Fetch(format!(
            "private IP address not allowed: {}",
            ip
        )));
    }
    Ok(())
}

const FORBIDDEN_SUFFIXES: &[&str] = &[
    ".local",
    ".localhost",
    ".internal",
    ".intranet",
    ".corp",
    ".home",
    ".lan",
];

fn is_forbidden_hostname(host: &str) -> bool {
    let host = host.to_lowercase();
    host == "localhost" || FORBIDDEN_SUFFIXES.iter().any(|s| host.ends_with(s))
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || v4.is_documentation()
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(mapped));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local
                || (first & 0xfe00) == 0xfc00
                // fe80::/10 link-local
                || (first & 0xffc0) == 0xfe80
        }
    }
}

/// Parse an RSS or Atom document.
///
/// Timestamps take the published value, falling back to updated. Entry
/// identifiers that are missing or blank become `None`; no identifier is
/// derived from links or titles.
pub fn parse_feed(bytes: &[u8], max_description_length: usize) -> Result<ParsedFeed> {
    let feed = parser::Builder::new()
        .id_generator(|_, _, _| String::new())
        .build()
        .parse(bytes)
        .map_err(|e| RssfeedError::Fetch(format!("failed to parse feed: {}", e)))?;

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let id = Some(entry.id).filter(|id| !id.trim().is_empty());
            let description = entry
                .summary
                .map(|t| t.content)
                .or(entry.content.and_then(|c| c.body))
                .map(|d| truncate_description(&strip_html(&d), max_description_length));

            ParsedEntry {
                id,
                title: entry.title.map(|t| t.content),
                link: entry.links.first().map(|l| l.href.clone()),
                description,
                author: entry.authors.first().map(|a| a.name.clone()),
                published: entry.published.or(entry.updated),
            }
        })
        .collect();

    Ok(ParsedFeed {
        title: feed.title.map(|t| t.content),
        link: feed.links.first().map(|l| l.href.clone()),
        description: feed.description.map(|d| strip_html(&d.content)),
        language: feed.language,
        published: feed.published.or(feed.updated),
        entries,
    })
}

/// Strip HTML tags and decode entities, collapsing whitespace.
fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut entity: Option<String> = None;

    for ch in html.chars() {
        if let Some(mut name) = entity.take() {
            if ch == ';' {
                decode_entity(&name, &mut text);
                continue;
            }
            if ch.is_ascii_alphanumeric() || ch == '#' {
                name.push(ch);
                entity = Some(name);
                continue;
            }
            // Bare ampersand
            text.push('&');
            text.push_str(&name);
        }
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            '&' if !in_tag => entity = Some(String::new()),
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    if let Some(name) = entity {
        text.push('&');
        text.push_str(&name);
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entity(name: &str, out: &mut String) {
    let decoded = match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => parse_numeric_entity(name).and_then(char::from_u32),
    };
    match decoded {
        Some(c) => out.push(c),
        None if name.starts_with('#') => {}
        None => {
            out.push('&');
            out.push_str(name);
            out.push(';');
        }
    }
}

/// Parse a numeric entity body such as `#123` or `#x7B`.
fn parse_numeric_entity(entity: &str) -> Option<u32> {
    let digits = entity.strip_prefix('#')?;
    match digits.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => digits.parse().ok(),
    }
}

fn truncate_description(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
