//! Login-affordance detection.
//!
//! A login affordance is anything in the page whose purpose is to start
//! federated sign-in: a link whose path is the login entry point, or an element
//! carrying a recognized marker. Click targets are classified by walking a
//! bounded number of ancestors and testing a small set of structural
//! predicates, producing one [`Classified`] outcome.

use std::collections::BTreeMap;

use url::Url;

use crate::config::{AuthConfig, ShellConfig};
use crate::error::ConfigError;
use crate::rewrite::RequiredParam;

/// How many elements (target plus ancestors) a click classification inspects.
pub const MAX_ANCESTOR_DEPTH: usize = 5;

/// Query component naming the post-login destination.
pub const RETURN_URL_PARAM: &str = "return_url";

/// A detected login activation and where to go once it succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAffordance {
    return_url: Url,
}

impl LoginAffordance {
    pub fn new(return_url: Url) -> Self {
        Self { return_url }
    }

    /// Absolute post-login destination.
    pub fn return_url(&self) -> &Url {
        &self.return_url
    }
}

/// A minimal view of a DOM element, as seen by the click hook.
///
/// # Examples
///
/// ```
/// use shell_bridge::Element;
///
/// let link = Element::new("a")
///     .with_href("/auth/google/login?return_url=%2Fprofile")
///     .with_class("btn");
/// assert_eq!(link.tag(), "a");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    tag: String,
    href: Option<String>,
    classes: Vec<String>,
    attributes: BTreeMap<String, String>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = Some(href.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn href(&self) -> Option<&str> {
        self.href.as_deref()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c.eq_ignore_ascii_case(class))
    }
}

/// Result of classifying a click target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// The click activates federated sign-in
    Login(LoginAffordance),
    /// The click follows the nearest link
    Link {
        /// Raw `href` of the nearest anchor
        href: String,
    },
    /// Nothing navigation-related was hit
    Inert,
}

/// Recognizes login entry points and login markers.
#[derive(Debug, Clone)]
pub struct LoginMatcher {
    home: Url,
    rule: RequiredParam,
    login_path: String,
    marker_provider: Option<String>,
    marker_classes: Vec<String>,
}

impl LoginMatcher {
    pub fn new(home: Url, rule: RequiredParam, auth: &AuthConfig) -> Self {
        Self {
            home,
            rule,
            login_path: auth.login_path.to_ascii_lowercase(),
            marker_provider: auth.marker_provider.clone(),
            marker_classes: auth.marker_classes.clone(),
        }
    }

    pub fn from_config(config: &ShellConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.home_url()?,
            RequiredParam::from_config(config),
            &config.auth,
        ))
    }

    /// Root of the home site, used as the default post-login destination.
    pub fn home_root(&self) -> Url {
        let mut root = self.home.clone();
        root.set_path("/");
        root.set_query(None);
        root.set_fragment(None);
        root
    }

    /// Returns true if the URL is the federated-login entry point on the home domain.
    pub fn is_login_entry(&self, url: &Url) -> bool {
        self.rule.is_home(url)
            && url
                .path()
                .to_ascii_lowercase()
                .contains(self.login_path.as_str())
    }

    /// Detects a login activation from a navigation target.
    pub fn match_url(&self, url: &Url) -> Option<LoginAffordance> {
        self.is_login_entry(url)
            .then(|| LoginAffordance::new(self.return_destination(url)))
    }

    /// Extracts the `return_url` component, resolved against the home origin.
    ///
    /// Falls back to the home root when the component is absent, empty, or
    /// does not resolve to an http(s) URL.
    pub fn return_destination(&self, url: &Url) -> Url {
        url.query_pairs()
            .find(|(k, _)| k == RETURN_URL_PARAM)
            .and_then(|(_, v)| {
                let v = v.trim();
                if v.is_empty() {
                    None
                } else {
                    self.home.join(v).ok()
                }
            })
            .filter(|dest| matches!(dest.scheme(), "http" | "https"))
            .unwrap_or_else(|| self.home_root())
    }

    /// Classifies a click by walking at most [`MAX_ANCESTOR_DEPTH`] elements,
    /// starting at the target (`path[0]`) and moving outward.
    ///
    /// A login affordance anywhere in the inspected chain wins over a plain
    /// link; otherwise the nearest anchor with an `href` is the target.
    pub fn classify(&self, page_url: &Url, path: &[Element]) -> Classified {
        let mut nearest_link: Option<&str> = None;

        for element in path.iter().take(MAX_ANCESTOR_DEPTH) {
            let resolved = element.href().and_then(|href| page_url.join(href).ok());

            if let Some(target) = resolved.as_ref() {
                if let Some(affordance) = self.match_url(target) {
                    return Classified::Login(affordance);
                }
            }

            if self.has_marker(element) {
                let return_url = resolved
                    .as_ref()
                    .map(|target| self.return_destination(target))
                    .unwrap_or_else(|| self.home_root());
                return Classified::Login(LoginAffordance::new(return_url));
            }

            if nearest_link.is_none() && element.tag() == "a" {
                nearest_link = element.href();
            }
        }

        match nearest_link {
            Some(href) => Classified::Link {
                href: href.to_string(),
            },
            None => Classified::Inert,
        }
    }

    fn has_marker(&self, element: &Element) -> bool {
        let provider_marked = match (&self.marker_provider, element.attr("data-provider")) {
            (Some(expected), Some(actual)) => actual.trim().eq_ignore_ascii_case(expected),
            _ => false,
        };
        provider_marked || self.marker_classes.iter().any(|c| element.has_class(c))
    }
}
