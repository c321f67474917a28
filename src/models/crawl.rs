// src/models/crawl.rs

//! Menu discovery outcome types.

use serde::{Deserialize, Serialize};

use super::place::MenuFlag;

/// Why a page fetch failed during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// The per-page deadline elapsed
    Timeout,
    /// Connection-level failure (reset, DNS, TLS)
    Transport,
    /// Redirect chain exceeded the bounded count
    RedirectLoop,
    /// Non-success HTTP status on the site root
    BadStatus,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::RedirectLoop => "redirect-loop",
            Self::BadStatus => "bad-status",
        }
    }
}

/// Outcome of menu discovery for one website.
///
/// Produced once by the crawler, consumed once by the reconciliation
/// engine. Only `Found` ever yields a menu URL; the other variants all map
/// to an absent URL but stay distinguishable for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum CrawlResult {
    Found { menu_url: String },
    NotFound,
    Blocked { reason: String },
    Failed { kind: FailureKind },
}

impl CrawlResult {
    pub fn found(menu_url: impl Into<String>) -> Self {
        Self::Found {
            menu_url: menu_url.into(),
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self::Blocked {
            reason: reason.into(),
        }
    }

    /// The discovered menu URL, if any.
    pub fn menu_url(&self) -> Option<&str> {
        match self {
            Self::Found { menu_url } => Some(menu_url),
            _ => None,
        }
    }

    /// Whether the failure is worth another discovery attempt.
    pub fn is_transient_failure(&self) -> bool {
        matches!(
            self,
            Self::Failed {
                kind: FailureKind::Timeout | FailureKind::Transport
            }
        )
    }

    pub fn flag(&self) -> MenuFlag {
        match self {
            Self::Found { .. } => MenuFlag::Found,
            Self::NotFound => MenuFlag::NotFound,
            Self::Blocked { .. } => MenuFlag::Blocked,
            Self::Failed { .. } => MenuFlag::Failed,
        }
    }
}
