//! Lightweight homepage probes: trust/conversion signals and service-page
//! heuristics.

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;

use crate::models::candidate::WebsiteSignals;
use crate::models::criteria::LightweightCheck;

/// Bytes of HTML kept from a homepage.
pub const MAX_BODY_BYTES: usize = 300_000;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("homepage request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid website url: {0}")]
    InvalidUrl(String),
}

/// A fetched homepage after redirects.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub final_url: String,
    pub html: String,
}

#[async_trait]
pub trait WebsiteProbe: Send + Sync {
    async fn fetch_homepage(&self, url: &str) -> Result<FetchedPage, ProbeError>;
}

/// Normalize a website for storage and comparison: https by default,
/// lowercase host, no query or fragment, no trailing slash on paths.
pub fn normalize_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };

    let mut url = Url::parse(&with_scheme).ok()?;
    url.host_str()?;
    url.set_query(None);
    url.set_fragment(None);

    let path = url.path().to_string();
    if path == "/" {
        // Url always serializes a root path, so drop it by hand.
        let s = url.as_str().trim_end_matches('/').to_string();
        return Some(s);
    }
    if path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }
    Some(url.to_string())
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\+?\d[\d\s().-]{7,}\d)").expect("valid regex"))
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,})").expect("valid regex")
    })
}

fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Signals read from one homepage.
pub fn analyze_html(page: &FetchedPage) -> WebsiteSignals {
    let html = truncate_utf8(&page.html, MAX_BODY_BYTES);
    let lower = html.to_lowercase();
    let document = Html::parse_document(html);

    let form_sel = Selector::parse("form").expect("valid selector");
    let viewport_sel = Selector::parse(r#"meta[name="viewport"]"#).expect("valid selector");
    let schema_sel =
        Selector::parse(r#"script[type="application/ld+json"], [itemscope]"#).expect("valid selector");
    let mailto_sel = Selector::parse(r#"a[href^="mailto:"], a[href^="MAILTO:"]"#).expect("valid selector");

    let has_contact_form = document.select(&form_sel).next().is_some() || lower.contains("contact");
    let has_viewport = document.select(&viewport_sel).next().is_some();
    let has_schema = document.select(&schema_sel).next().is_some();

    let email = document
        .select(&mailto_sel)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| {
            let addr = &href[7..];
            addr.split('?').next().unwrap_or(addr).trim().to_string()
        })
        .find(|addr| !addr.is_empty())
        .or_else(|| email_re().find(html).map(|m| m.as_str().to_string()));

    WebsiteSignals {
        ssl: page.final_url.starts_with("https://"),
        has_contact_form,
        has_phone: phone_re().is_match(html),
        has_viewport,
        has_schema,
        email,
    }
}

/// Extra terms that count as mentioning a service.
fn service_synonyms(service: &str) -> &'static [&'static str] {
    match service {
        "implants" => &["implant", "dental implant"],
        "invisalign" => &["clear aligner", "clear aligners"],
        _ => &[],
    }
}

/// Homepage heuristic for a dedicated service page. `matches` is true when
/// the page looks missing.
pub fn check_service_page(page: &FetchedPage, service: &str, criterion_key: &str) -> LightweightCheck {
    let service = service.trim().to_lowercase();
    let html = truncate_utf8(&page.html, MAX_BODY_BYTES);
    let lower = html.to_lowercase();

    let service_mentioned = lower.contains(&service)
        || service_synonyms(&service).iter().any(|t| lower.contains(t));

    let tokens = [service.replace(' ', "-"), service.replace(' ', ""), service.clone()];
    let document = Html::parse_document(html);
    let link_sel = Selector::parse("a[href]").expect("valid selector");

    let mut dedicated_page_detected = document
        .select(&link_sel)
        .filter_map(|a| a.value().attr("href"))
        .map(str::to_lowercase)
        .any(|href| {
            tokens.iter().any(|t| href.contains(t.as_str()))
                && href.contains('/')
                && (href.contains("http") || href.starts_with('/'))
        });

    if !dedicated_page_detected {
        if let Ok(url) = Url::parse(&page.final_url) {
            let path = url.path().to_lowercase();
            dedicated_page_detected = path.contains(&tokens[0]) || path.contains(&tokens[1]);
        }
    }

    LightweightCheck {
        criterion_key: criterion_key.to_string(),
        service,
        matches: !dedicated_page_detected,
        reason: "heuristic".to_string(),
        service_mentioned,
        dedicated_page_detected,
    }
}

/// Result used when a homepage cannot be checked. Never counts as a match.
pub fn unchecked(service: &str, criterion_key: &str, reason: &str) -> LightweightCheck {
    LightweightCheck {
        criterion_key: criterion_key.to_string(),
        service: service.trim().to_lowercase(),
        matches: false,
        reason: reason.to_string(),
        service_mentioned: false,
        dedicated_page_detected: false,
    }
}

/// reqwest-backed probe.
pub struct HttpWebsiteProbe {
    http: reqwest::Client,
}

impl HttpWebsiteProbe {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (compatible; TerritoryScan/1.0)")
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl WebsiteProbe for HttpWebsiteProbe {
    async fn fetch_homepage(&self, url: &str) -> Result<FetchedPage, ProbeError> {
        let target = normalize_url(url).ok_or_else(|| ProbeError::InvalidUrl(url.to_string()))?;
        let mut response = self.http.get(&target).send().await?;
        let final_url = response.url().to_string();

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if append_capped(&mut body, &chunk, MAX_BODY_BYTES) {
                break;
            }
        }
        let html = String::from_utf8_lossy(&body);

        Ok(FetchedPage {
            final_url,
            html: truncate_utf8(&html, MAX_BODY_BYTES).to_string(),
        })
    }
}

/// Append as much of `chunk` as fits under `max`. Returns true once the
/// buffer is full.
fn append_capped(buf: &mut Vec<u8>, chunk: &[u8], max: usize) -> bool {
    let room = max.saturating_sub(buf.len());
    buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
    buf.len() >= max
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str, html: &str) -> FetchedPage {
        FetchedPage {
            final_url: url.to_string(),
            html: html.to_string(),
        }
    }

    #[test]
    fn test_append_capped_stops_at_limit() {
        let mut buf = Vec::new();
        assert!(!append_capped(&mut buf, b"hello ", 10));
        assert!(append_capped(&mut buf, b"world!", 10));
        assert_eq!(buf, b"hello worl");
        assert!(append_capped(&mut buf, b"more", 10));
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("Example.com/Path/?utm=1#top").as_deref(),
            Some("https://example.com/Path")
        );
        assert_eq!(normalize_url("http://EXAMPLE.com/").as_deref(), Some("http://example.com"));
        assert_eq!(normalize_url("https://example.com").as_deref(), Some("https://example.com"));
        assert_eq!(normalize_url("   "), None);
    }

    #[test]
    fn test_analyze_full_signals() {
        let html = r#"<html><head>
            <meta name="viewport" content="width=device-width">
            <script type="application/ld+json">{"@type":"Dentist"}</script>
            </head><body>
            <form action="/book"></form>
            <p>Call (512) 555-0100</p>
            <a href="mailto:front@acme.example?subject=hi">Email us</a>
            </body></html>"#;

        let s = analyze_html(&page("https://acme.example/", html));
        assert!(s.ssl);
        assert!(s.has_contact_form);
        assert!(s.has_phone);
        assert!(s.has_viewport);
        assert!(s.has_schema);
        assert_eq!(s.email.as_deref(), Some("front@acme.example"));
    }

    #[test]
    fn test_analyze_bare_page() {
        let s = analyze_html(&page("http://bare.example/", "<html><body>Welcome</body></html>"));
        assert_eq!(s, WebsiteSignals::default());
    }

    #[test]
    fn test_email_falls_back_to_text() {
        let s = analyze_html(&page("https://x.example", "<p>write to info@x.example today</p>"));
        assert_eq!(s.email.as_deref(), Some("info@x.example"));
    }

    #[test]
    fn test_service_page_detected_from_link() {
        let html = r#"<a href="/services/dental-implants">Implants</a>"#;
        let check = check_service_page(
            &page("https://smile.example/", html),
            "implants",
            "missing_service_page_light:implants",
        );
        assert!(check.dedicated_page_detected);
        assert!(check.service_mentioned);
        assert!(!check.matches);
    }

    #[test]
    fn test_service_page_missing() {
        let html = r#"<p>We offer invisalign.</p><a href="/about">About</a>"#;
        let check = check_service_page(
            &page("https://smile.example/", html),
            "Invisalign",
            "missing_service_page_light:invisalign",
        );
        assert!(check.service_mentioned);
        assert!(!check.dedicated_page_detected);
        assert!(check.matches);
        assert_eq!(check.service, "invisalign");
    }
}
