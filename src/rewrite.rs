//! Mandatory request tagging for the home domain.
//!
//! Every navigation that reaches a home-domain host must carry the tag
//! parameter (`os=<platform>`). [`RequiredParam`] is the single rule shared by
//! the native interceptor and the in-page hooks, so both insertion points agree
//! on what "tagged" means.

use tracing::debug;
use url::{form_urlencoded, Url};

use crate::config::ShellConfig;

/// A pure predicate + transform pair over URLs.
///
/// # Invariants
///
/// Implementations MUST keep `apply` idempotent:
/// `apply(apply(u)) == apply(u)` for every `u`, and `matches(apply(u))` is false
/// whenever `apply` changed the URL.
pub trait RewriteRule {
    /// Returns true if the URL needs rewriting.
    fn matches(&self, url: &str) -> bool;

    /// Returns the rewritten URL, or the input unchanged if it does not match
    /// or cannot be parsed.
    fn apply(&self, url: &str) -> String;
}

/// Returns true if `host` is `domain` or one of its subdomains.
///
/// Matching is label-aware: `evilexample.com` is not in `example.com`.
pub fn host_in_domain(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let domain = domain
        .trim_start_matches('.')
        .trim_end_matches('.')
        .to_ascii_lowercase();
    if domain.is_empty() {
        return false;
    }
    host == domain
        || host
            .strip_suffix(domain.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Requires `name=value` on every URL whose host is in the home domain.
///
/// # Examples
///
/// ```
/// use shell_bridge::{RequiredParam, RewriteRule};
///
/// let rule = RequiredParam::new("example.com", "os", "apple");
///
/// assert_eq!(
///     rule.apply("https://app.example.com/auth/login?next=%2F"),
///     "https://app.example.com/auth/login?next=%2F&os=apple"
/// );
/// // Already tagged and foreign URLs pass through untouched.
/// assert_eq!(rule.apply("https://app.example.com/?os=apple"), "https://app.example.com/?os=apple");
/// assert_eq!(rule.apply("https://other.org/"), "https://other.org/");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredParam {
    domain: String,
    name: String,
    value: String,
}

impl RequiredParam {
    pub fn new(domain: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            name: name.into(),
            value: value.into(),
        }
    }

    /// Builds the rule for the configured home domain and platform.
    pub fn from_config(config: &ShellConfig) -> Self {
        Self::new(
            config.home_domain.clone(),
            config.tag_param.clone(),
            config.tag_value(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns true if the URL's host belongs to the home domain.
    pub fn is_home(&self, url: &Url) -> bool {
        url.host_str()
            .is_some_and(|host| host_in_domain(host, &self.domain))
    }

    /// Returns true if the URL already carries `name=value`.
    pub fn is_tagged(&self, url: &Url) -> bool {
        url.query_pairs()
            .any(|(k, v)| k == self.name.as_str() && v == self.value.as_str())
    }

    /// Parsed-URL form of [`RewriteRule::matches`].
    pub fn matches_url(&self, url: &Url) -> bool {
        self.is_home(url) && !self.is_tagged(url)
    }

    /// Parsed-URL form of [`RewriteRule::apply`].
    ///
    /// Other query parameters keep their original encoding and order. Any
    /// other value for the tag name is dropped so exactly one tag remains, and
    /// empty pairs (`a=1&&b=2`, a trailing `&`) are removed.
    pub fn apply_url(&self, url: &Url) -> Url {
        if !self.matches_url(url) {
            return url.clone();
        }

        let pair = form_urlencoded::Serializer::new(String::new())
            .append_pair(&self.name, &self.value)
            .finish();
        let kept: Vec<&str> = url
            .query()
            .unwrap_or_default()
            .split('&')
            .filter(|segment| !segment.is_empty() && !self.names_tag(segment))
            .collect();

        let mut tagged = url.clone();
        if kept.is_empty() {
            tagged.set_query(Some(&pair));
        } else {
            tagged.set_query(Some(&format!("{}&{}", kept.join("&"), pair)));
        }
        tagged
    }

    // Raw `key=value` segment whose decoded key is the tag name.
    fn names_tag(&self, segment: &str) -> bool {
        form_urlencoded::parse(segment.as_bytes())
            .next()
            .is_some_and(|(k, _)| k == self.name.as_str())
    }

    /// Resolves `href` against `base` and tags it.
    ///
    /// Returns `None` when nothing needs to change (foreign host, already
    /// tagged, or not a resolvable URL), so callers can leave the original
    /// value in place.
    pub fn rewrite_href(&self, base: &Url, href: &str) -> Option<String> {
        let resolved = match base.join(href) {
            Ok(url) => url,
            Err(e) => {
                debug!(href, error = %e, "unresolvable href left untouched");
                return None;
            }
        };
        if !self.matches_url(&resolved) {
            return None;
        }
        Some(self.apply_url(&resolved).into())
    }
}

impl RewriteRule for RequiredParam {
    fn matches(&self, url: &str) -> bool {
        Url::parse(url)
            .map(|parsed| self.matches_url(&parsed))
            .unwrap_or(false)
    }

    fn apply(&self, url: &str) -> String {
        match Url::parse(url) {
            Ok(parsed) if self.matches_url(&parsed) => self.apply_url(&parsed).into(),
            Ok(_) => url.to_string(),
            Err(e) => {
                debug!(url, error = %e, "malformed URL passed through untagged");
                url.to_string()
            }
        }
    }
}
