//! URL canonicalization and route-pattern inference
//!
//! Collapses parameterized URLs (`/users/42`, `/users/43`) into a bounded set
//! of logical route patterns (`/users/{userId}`) with a stable route id, so
//! that coverage and crawl bookkeeping operate on routes instead of raw URLs.

use anyhow::{bail, Context, Result};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use url::{form_urlencoded, Url};

/// Query parameters dropped during canonicalization. Covers the UTM family
/// (by prefix), ad click ids, and session/cache-buster keys.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "yclid", "twclid", "igshid", "mc_cid", "mc_eid", "_ga",
    "_gl", "ref_src", "spm", "phpsessid", "jsessionid", "sid", "_t", "cb", "cachebust",
    "timestamp", "nocache",
];

/// Parameter names inferred from the static segment preceding a dynamic one.
const PARAM_NAME_TABLE: &[(&str, &str)] = &[
    ("users", "userId"),
    ("accounts", "accountId"),
    ("posts", "postId"),
    ("articles", "articleId"),
    ("products", "productId"),
    ("items", "itemId"),
    ("orders", "orderId"),
    ("invoices", "invoiceId"),
    ("categories", "categoryId"),
    ("comments", "commentId"),
    ("projects", "projectId"),
    ("teams", "teamId"),
    ("organizations", "organizationId"),
    ("sessions", "sessionId"),
    ("files", "fileId"),
    ("tags", "tagId"),
];

/// Options controlling canonicalization behavior
#[derive(Debug, Clone)]
pub struct CanonicalizeOptions {
    /// Drop tracking query parameters (UTM, click ids, cache busters)
    pub remove_tracking_params: bool,

    /// Query parameters that distinguish routes and are folded into the
    /// route-id hash when present
    pub significant_params: Vec<String>,

    /// Fold SPA hash-routes (`#/dashboard`) into the path
    pub fold_spa_hash_routes: bool,
}

impl Default for CanonicalizeOptions {
    fn default() -> Self {
        Self {
            remove_tracking_params: true,
            significant_params: Vec::new(),
            fold_spa_hash_routes: false,
        }
    }
}

impl CanonicalizeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_significant_params(mut self, params: Vec<String>) -> Self {
        self.significant_params = params;
        self
    }

    pub fn with_fold_spa_hash_routes(mut self, fold: bool) -> Self {
        self.fold_spa_hash_routes = fold;
        self
    }

    pub fn with_remove_tracking_params(mut self, remove: bool) -> Self {
        self.remove_tracking_params = remove;
        self
    }
}

/// Result of canonicalizing one URL. Derived, never stored independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalUrl {
    pub original: String,
    pub canonical: String,
    pub route_pattern: String,
    pub route_id: String,
    pub path_params: BTreeMap<String, String>,
    pub query_params: BTreeMap<String, String>,
    pub had_fragment: bool,
}

/// Canonicalizer with compiled segment classifiers. Construct once and share.
pub struct UrlCanonicalizer {
    options: CanonicalizeOptions,
    uuid_re: Regex,
    hex24_re: Regex,
    slug_id_re: Regex,
}

impl UrlCanonicalizer {
    pub fn new(options: CanonicalizeOptions) -> Self {
        Self {
            options,
            uuid_re: Regex::new(
                r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$",
            )
            .unwrap(),
            hex24_re: Regex::new(r"^[0-9a-f]{24}$").unwrap(),
            slug_id_re: Regex::new(r"^[A-Za-z][A-Za-z0-9]*(?:-[A-Za-z0-9]+)*-\d+$").unwrap(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CanonicalizeOptions::default())
    }

    pub fn options(&self) -> &CanonicalizeOptions {
        &self.options
    }

    /// Canonicalize a raw URL for the given HTTP method.
    ///
    /// Deterministic: the same input always yields identical output, and two
    /// URLs differing only in a dynamic segment value share a route id.
    pub fn canonicalize(&self, raw_url: &str, method: &str) -> Result<CanonicalUrl> {
        let mut url =
            Url::parse(raw_url).with_context(|| format!("invalid URL: {raw_url}"))?;
        let host = match url.host_str() {
            Some(h) => h.to_ascii_lowercase(),
            None => bail!("URL has no host: {raw_url}"),
        };

        let had_fragment = url.fragment().is_some();
        let mut path = url.path().to_string();
        if self.options.fold_spa_hash_routes {
            if let Some(spa) = url.fragment().and_then(|f| f.strip_prefix('/')) {
                path = format!("{}/{}", path.trim_end_matches('/'), spa);
            }
        }
        url.set_fragment(None);

        while path.len() > 1 && path.ends_with('/') {
            path.pop();
        }

        let mut query_params = BTreeMap::new();
        for (key, value) in url.query_pairs() {
            if self.options.remove_tracking_params && is_tracking_param(&key) {
                continue;
            }
            query_params.insert(key.into_owned(), value.into_owned());
        }

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut pattern_segments = Vec::with_capacity(segments.len());
        let mut path_params = BTreeMap::new();
        let mut dynamic_index = 0;
        for (i, segment) in segments.iter().enumerate() {
            if self.is_dynamic_segment(segment) {
                let prev = match i.checked_sub(1).map(|p| segments[p]) {
                    Some(p) if !self.is_dynamic_segment(p) => Some(p),
                    _ => None,
                };
                let name = infer_param_name(prev, dynamic_index);
                path_params.insert(name.clone(), (*segment).to_string());
                pattern_segments.push(format!("{{{name}}}"));
                dynamic_index += 1;
            } else {
                pattern_segments.push((*segment).to_string());
            }
        }
        let route_pattern = if pattern_segments.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", pattern_segments.join("/"))
        };

        let mut canonical = format!("{}://{}", url.scheme(), host);
        if let Some(port) = url.port() {
            canonical.push_str(&format!(":{port}"));
        }
        canonical.push_str(&path);
        if !query_params.is_empty() {
            let mut encoder = form_urlencoded::Serializer::new(String::new());
            for (key, value) in &query_params {
                encoder.append_pair(key, value);
            }
            canonical.push('?');
            canonical.push_str(&encoder.finish());
        }

        let route_id = self.route_id(method, &route_pattern, &query_params);

        Ok(CanonicalUrl {
            original: raw_url.to_string(),
            canonical,
            route_pattern,
            route_id,
            path_params,
            query_params,
            had_fragment,
        })
    }

    /// Stable hash of `METHOD:pattern` plus any significant query params.
    fn route_id(
        &self,
        method: &str,
        pattern: &str,
        query_params: &BTreeMap<String, String>,
    ) -> String {
        let mut input = format!("{}:{}", method.to_ascii_uppercase(), pattern);
        for (key, value) in query_params {
            if self.options.significant_params.iter().any(|p| p == key) {
                input.push_str(&format!("&{key}={value}"));
            }
        }
        let digest = Sha256::digest(input.as_bytes());
        hex::encode(digest)[..16].to_string()
    }

    /// A segment is dynamic if it looks like an identifier value rather than
    /// a fixed path word: UUID, numeric id or timestamp, 24-hex object id,
    /// `slug-<digits>`, or a 6-12 char token mixing letters and digits.
    fn is_dynamic_segment(&self, segment: &str) -> bool {
        if segment.is_empty() {
            return false;
        }
        if self.uuid_re.is_match(segment) {
            return true;
        }
        if segment.chars().all(|c| c.is_ascii_digit()) {
            return true;
        }
        if self.hex24_re.is_match(segment) {
            return true;
        }
        if self.slug_id_re.is_match(segment) {
            return true;
        }
        if (6..=12).contains(&segment.len())
            && segment.chars().all(|c| c.is_ascii_alphanumeric())
            && segment.chars().any(|c| c.is_ascii_digit())
            && segment.chars().any(|c| c.is_ascii_alphabetic())
        {
            return true;
        }
        false
    }
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Infer a parameter name from the preceding static segment, falling back to
/// singularize-plus-Id and finally a positional name.
fn infer_param_name(prev_segment: Option<&str>, index: usize) -> String {
    let Some(prev) = prev_segment else {
        return format!("param{index}");
    };
    let prev = prev.to_ascii_lowercase();
    if let Some((_, name)) = PARAM_NAME_TABLE.iter().find(|(seg, _)| *seg == prev) {
        return (*name).to_string();
    }
    if prev.chars().all(|c| c.is_ascii_alphabetic()) && prev.len() > 1 {
        return format!("{}Id", singularize(&prev));
    }
    format!("param{index}")
}

fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }
    for suffix in ["ses", "xes", "ches", "shes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    word.strip_suffix('s').unwrap_or(word).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    fn canon(url: &str) -> CanonicalUrl {
        UrlCanonicalizer::with_defaults()
            .canonicalize(url, "GET")
            .unwrap()
    }

    #[parameterized(
        uuid = { "550e8400-e29b-41d4-a716-446655440000", true },
        numeric = { "42", true },
        long_numeric = { "1700000000123", true },
        object_id = { "507f1f77bcf86cd799439011", true },
        slug_with_id = { "my-first-post-123", true },
        mixed_token = { "a1b2c3d4", true },
        plain_word = { "products", false },
        short_word = { "api", false },
        long_word = { "organizations", false },
        verb = { "checkout", false },
    )]
    fn dynamic_segment_classification(segment: &str, expected: bool) {
        let canonicalizer = UrlCanonicalizer::with_defaults();
        assert_eq!(canonicalizer.is_dynamic_segment(segment), expected);
    }

    #[parameterized(
        users = { Some("users"), "userId" },
        products = { Some("products"), "productId" },
        categories_plural = { Some("categories"), "categoryId" },
        unknown_plural = { Some("widgets"), "widgetId" },
        es_plural = { Some("statuses"), "statusId" },
        no_prev = { None, "param0" },
    )]
    fn param_name_inference(prev: Option<&str>, expected: &str) {
        assert_eq!(infer_param_name(prev, 0), expected);
    }

    #[test]
    fn same_route_id_across_dynamic_values() {
        let a = canon("https://app.example.com/users/42/posts/99");
        let b = canon("https://app.example.com/users/7/posts/123456");
        assert_eq!(a.route_id, b.route_id);
        assert_eq!(a.route_pattern, "/users/{userId}/posts/{postId}");
        assert_eq!(a.path_params.get("userId").unwrap(), "42");
    }

    #[test]
    fn different_methods_get_different_route_ids() {
        let canonicalizer = UrlCanonicalizer::with_defaults();
        let get = canonicalizer
            .canonicalize("https://example.com/users/1", "GET")
            .unwrap();
        let post = canonicalizer
            .canonicalize("https://example.com/users/1", "POST")
            .unwrap();
        assert_ne!(get.route_id, post.route_id);
    }

    #[test]
    fn tracking_params_stripped_significant_kept() {
        let result = canon("https://example.com/search?q=rust&utm_source=news&fbclid=xyz");
        assert!(!result.canonical.contains("utm_source"));
        assert!(!result.canonical.contains("fbclid"));
        assert!(result.canonical.contains("q=rust"));
        assert_eq!(result.query_params.len(), 1);
    }

    #[test]
    fn significant_params_affect_route_id() {
        let options = CanonicalizeOptions::new()
            .with_significant_params(vec!["tab".to_string()]);
        let canonicalizer = UrlCanonicalizer::new(options);
        let a = canonicalizer
            .canonicalize("https://example.com/settings?tab=profile", "GET")
            .unwrap();
        let b = canonicalizer
            .canonicalize("https://example.com/settings?tab=billing", "GET")
            .unwrap();
        assert_ne!(a.route_id, b.route_id);

        let plain = UrlCanonicalizer::with_defaults();
        let c = plain
            .canonicalize("https://example.com/settings?tab=profile", "GET")
            .unwrap();
        let d = plain
            .canonicalize("https://example.com/settings?tab=billing", "GET")
            .unwrap();
        assert_eq!(c.route_id, d.route_id);
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let urls = [
            "https://Example.COM/Users/42/?utm_campaign=x&b=2&a=1",
            "http://example.com/",
            "https://example.com/a/b/c?z=9&y=8#section",
            "https://example.com:8080/items/550e8400-e29b-41d4-a716-446655440000",
        ];
        let canonicalizer = UrlCanonicalizer::with_defaults();
        for url in urls {
            let once = canonicalizer.canonicalize(url, "GET").unwrap();
            let twice = canonicalizer.canonicalize(&once.canonical, "GET").unwrap();
            assert_eq!(once.canonical, twice.canonical, "not idempotent: {url}");
            assert_eq!(once.route_id, twice.route_id);
        }
    }

    #[test]
    fn trailing_slash_stripped_root_preserved() {
        assert!(canon("https://example.com/users/").canonical.ends_with("/users"));
        assert_eq!(canon("https://example.com/").canonical, "https://example.com/");
        assert_eq!(canon("https://example.com").route_pattern, "/");
    }

    #[test]
    fn fragment_ignored_unless_spa_folding_enabled() {
        let plain = canon("https://example.com/app#/dashboard");
        assert!(plain.had_fragment);
        assert_eq!(plain.route_pattern, "/app");

        let folding = UrlCanonicalizer::new(
            CanonicalizeOptions::new().with_fold_spa_hash_routes(true),
        );
        let folded = folding
            .canonicalize("https://example.com/app#/dashboard", "GET")
            .unwrap();
        assert_eq!(folded.route_pattern, "/app/dashboard");
    }

    #[test]
    fn query_params_sorted_in_canonical_form() {
        let result = canon("https://example.com/search?z=1&a=2&m=3");
        let query = result.canonical.split('?').nth(1).unwrap();
        assert_eq!(query, "a=2&m=3&z=1");
    }

    #[test]
    fn url_without_host_is_rejected() {
        let canonicalizer = UrlCanonicalizer::with_defaults();
        assert!(canonicalizer.canonicalize("mailto:dev@example.com", "GET").is_err());
        assert!(canonicalizer.canonicalize("not a url", "GET").is_err());
    }
}
