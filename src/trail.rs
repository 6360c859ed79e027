//! In-memory record of navigation decisions.
//!
//! Every request the [`Navigator`](crate::Navigator) evaluates ends up here
//! exactly once, with its terminal disposition. URLs are stored without query
//! or fragment so tokens and personal data in query strings never land in the
//! record.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use url::Url;

use crate::navigation::NavigationTrigger;

/// Terminal disposition of one evaluated navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionKind {
    /// The navigation proceeded unchanged
    Allowed,
    /// Cancelled and replaced by a tagged navigation
    Substituted,
    /// Cancelled and handed to native sign-in
    SignInDiverted,
    /// Cancelled with no replacement
    Blocked,
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionKind::Allowed => write!(f, "allowed"),
            DecisionKind::Substituted => write!(f, "substituted"),
            DecisionKind::SignInDiverted => write!(f, "sign_in_diverted"),
            DecisionKind::Blocked => write!(f, "blocked"),
        }
    }
}

/// One evaluated navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionRecord {
    seq: u64,
    trigger: NavigationTrigger,
    redacted_url: String,
    kind: DecisionKind,
}

impl DecisionRecord {
    /// Position of the decision in evaluation order, starting at 0.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn trigger(&self) -> NavigationTrigger {
        self.trigger
    }

    /// Target URL without query or fragment.
    pub fn redacted_url(&self) -> &str {
        &self.redacted_url
    }

    pub fn kind(&self) -> DecisionKind {
        self.kind
    }
}

impl fmt::Display for DecisionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} [{}] {} -> {}",
            self.seq, self.trigger, self.redacted_url, self.kind
        )
    }
}

/// Strips query and fragment from a URL for recording.
pub fn redact_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.into()
        }
        Err(_) => "<unparseable>".to_string(),
    }
}

#[derive(Debug, Default)]
struct TrailState {
    next_seq: u64,
    records: Vec<DecisionRecord>,
}

/// Ordered, append-only list of decisions.
///
/// # Example
///
/// ```
/// use shell_bridge::{DecisionKind, DecisionTrail, NavigationTrigger};
///
/// let trail = DecisionTrail::new();
/// trail.record(
///     NavigationTrigger::LinkClick,
///     "https://app.example.com/search?q=secret",
///     DecisionKind::Substituted,
/// );
///
/// let records = trail.records();
/// assert_eq!(records[0].redacted_url(), "https://app.example.com/search");
/// ```
#[derive(Debug, Default)]
pub struct DecisionTrail {
    state: Mutex<TrailState>,
}

impl DecisionTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a decision, assigning it the next sequence number.
    pub fn record(&self, trigger: NavigationTrigger, url: &str, kind: DecisionKind) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = state.next_seq;
        state.next_seq += 1;
        state.records.push(DecisionRecord {
            seq,
            trigger,
            redacted_url: redact_url(url),
            kind,
        });
    }

    /// Returns a snapshot of all decisions in evaluation order.
    pub fn records(&self) -> Vec<DecisionRecord> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .clone()
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops all records. Sequence numbers keep counting.
    pub fn clear(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .clear();
    }
}
