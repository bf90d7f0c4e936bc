//! Page visitor collaborator
//!
//! The crawler never renders pages itself; it delegates retrieval to a
//! [`PageVisitor`]. [`HttpVisitor`] is the default non-rendering visitor: a
//! plain GET plus anchor extraction. A browser-backed visitor plugs in behind
//! the same trait.

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use url::Url;

/// Result of visiting one page
#[derive(Debug, Clone)]
pub struct PageVisit {
    pub discovered_links: Vec<String>,
    pub status_code: Option<u16>,
    pub load_time: Duration,
    pub error: Option<String>,
}

impl PageVisit {
    pub fn links(links: Vec<String>, status_code: u16, load_time: Duration) -> Self {
        Self {
            discovered_links: links,
            status_code: Some(status_code),
            load_time,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>, load_time: Duration) -> Self {
        Self {
            discovered_links: Vec::new(),
            status_code: None,
            load_time,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait PageVisitor: Send + Sync {
    async fn visit(&self, url: &str, depth: u32) -> PageVisit;

    fn name(&self) -> &str;
}

/// Plain-HTTP visitor: fetches the page body and extracts `href` targets,
/// resolving relative links against the page URL.
pub struct HttpVisitor {
    client: reqwest::Client,
    href_re: Regex,
}

impl HttpVisitor {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("siteprobe/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            href_re: Regex::new(r#"href\s*=\s*["']([^"'#][^"']*)["']"#).unwrap(),
        })
    }

    fn extract_links(&self, base: &Url, body: &str) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut links = Vec::new();
        for capture in self.href_re.captures_iter(body) {
            let raw = &capture[1];
            if raw.starts_with("javascript:") || raw.starts_with("mailto:") {
                continue;
            }
            if let Ok(resolved) = base.join(raw) {
                let link = resolved.to_string();
                if seen.insert(link.clone()) {
                    links.push(link);
                }
            }
        }
        links
    }
}

#[async_trait]
impl PageVisitor for HttpVisitor {
    async fn visit(&self, url: &str, _depth: u32) -> PageVisit {
        let start = Instant::now();
        let base = match Url::parse(url) {
            Ok(base) => base,
            Err(error) => return PageVisit::failure(error.to_string(), start.elapsed()),
        };
        match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                match response.text().await {
                    Ok(body) => PageVisit::links(
                        self.extract_links(&base, &body),
                        status,
                        start.elapsed(),
                    ),
                    Err(error) => PageVisit::failure(error.to_string(), start.elapsed()),
                }
            }
            Err(error) => PageVisit::failure(error.to_string(), start.elapsed()),
        }
    }

    fn name(&self) -> &str {
        "HttpVisitor"
    }
}

/// Scripted visitor for tests: per-URL link lists, optional failures,
/// and a record of every visit made.
pub struct MockVisitor {
    pages: HashMap<String, Vec<String>>,
    default_links: Vec<String>,
    failing_urls: HashMap<String, String>,
    visits: Mutex<Vec<String>>,
}

impl MockVisitor {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            default_links: Vec::new(),
            failing_urls: HashMap::new(),
            visits: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page(mut self, url: impl Into<String>, links: Vec<String>) -> Self {
        self.pages.insert(url.into(), links);
        self
    }

    /// Links returned for any URL without an explicit page entry.
    pub fn with_default_links(mut self, links: Vec<String>) -> Self {
        self.default_links = links;
        self
    }

    pub fn with_failure(mut self, url: impl Into<String>, error: impl Into<String>) -> Self {
        self.failing_urls.insert(url.into(), error.into());
        self
    }

    pub fn visit_count(&self) -> usize {
        self.visits.lock().unwrap().len()
    }

    pub fn visited_urls(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }
}

impl Default for MockVisitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageVisitor for MockVisitor {
    async fn visit(&self, url: &str, _depth: u32) -> PageVisit {
        self.visits.lock().unwrap().push(url.to_string());
        if let Some(error) = self.failing_urls.get(url) {
            return PageVisit::failure(error.clone(), Duration::from_millis(1));
        }
        let links = self
            .pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| self.default_links.clone());
        PageVisit::links(links, 200, Duration::from_millis(1))
    }

    fn name(&self) -> &str {
        "MockVisitor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_links_resolves_relative_urls() {
        let visitor = HttpVisitor::new(Duration::from_secs(5)).unwrap();
        let base = Url::parse("https://example.com/docs/index.html").unwrap();
        let body = r##"
            <a href="/pricing">Pricing</a>
            <a href="guide.html">Guide</a>
            <a href="https://other.com/page">External</a>
            <a href="mailto:hi@example.com">Mail</a>
            <a href="#section">Anchor</a>
        "##;
        let links = visitor.extract_links(&base, body);
        assert_eq!(
            links,
            vec![
                "https://example.com/pricing",
                "https://example.com/docs/guide.html",
                "https://other.com/page",
            ]
        );
    }

    #[test]
    fn extract_links_dedupes() {
        let visitor = HttpVisitor::new(Duration::from_secs(5)).unwrap();
        let base = Url::parse("https://example.com/").unwrap();
        let body = r#"<a href="/a">one</a><a href="/a">two</a>"#;
        assert_eq!(visitor.extract_links(&base, body).len(), 1);
    }

    #[tokio::test]
    async fn mock_visitor_scripts_pages_and_failures() {
        let visitor = MockVisitor::new()
            .with_page("https://example.com/", vec!["https://example.com/a".into()])
            .with_failure("https://example.com/broken", "connection reset");

        let ok = visitor.visit("https://example.com/", 0).await;
        assert_eq!(ok.discovered_links.len(), 1);
        assert!(ok.error.is_none());

        let failed = visitor.visit("https://example.com/broken", 1).await;
        assert!(failed.error.is_some());
        assert_eq!(visitor.visit_count(), 2);
    }
}
