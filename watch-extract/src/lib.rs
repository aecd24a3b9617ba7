pub mod auth;
pub mod avatar;
pub mod count;
pub mod hires;
pub mod stats;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use watch_error::Result;

/// Outcome of a single extraction strategy. Absence is a value the
/// chain keeps folding over, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction<T> {
    Found(T),
    NotFound,
}

impl<T> Extraction<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Extraction::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Extraction::Found(value) => Some(value),
            Extraction::NotFound => None,
        }
    }
}

impl<T> From<Option<T>> for Extraction<T> {
    fn from(option: Option<T>) -> Self {
        match option {
            Some(value) => Extraction::Found(value),
            None => Extraction::NotFound,
        }
    }
}

/// Capability surface of a loaded profile page. The extraction chains
/// depend only on these operations, never on how the page got there.
#[async_trait]
pub trait PageSurface: Send + Sync {
    /// Navigate to the page, settling any interstitial the adapter
    /// knows how to dismiss.
    async fn goto(&self, url: &Url) -> Result<()>;

    /// Address the navigation actually landed on, after any redirects.
    async fn current_url(&self) -> Result<Url>;

    /// Raw markup of the current page.
    async fn markup(&self) -> Result<String>;

    /// Attribute value from the first matching element that carries it.
    async fn attr_first(&self, selector: &str, attr: &str) -> Result<Option<String>>;

    /// Attribute values from every matching element that carries one.
    async fn attr_all(&self, selector: &str, attr: &str) -> Result<Vec<String>>;

    /// Rendered text of every element matching the selector.
    async fn text_all(&self, selector: &str) -> Result<Vec<String>>;

    /// Evaluate a script against the live page, if the surface has one.
    async fn eval(&self, script: &str) -> Result<Value>;

    /// PNG screenshot of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Release the underlying session.
    async fn close(&mut self) -> Result<()>;
}

/// Bounded waits for strategies that read dynamically rendered content.
/// A budget caps how long a single strategy keeps re-probing; it never
/// re-runs a finished chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainBudgets {
    pub avatar: Duration,
    pub stats: Duration,
    pub step: Duration,
}

impl Default for ChainBudgets {
    fn default() -> Self {
        ChainBudgets {
            avatar: Duration::from_secs(12),
            stats: Duration::from_secs(8),
            step: Duration::from_millis(400),
        }
    }
}

impl ChainBudgets {
    /// Zero budgets. Every polling strategy gets exactly one probe.
    pub fn none() -> Self {
        ChainBudgets {
            avatar: Duration::ZERO,
            stats: Duration::ZERO,
            step: Duration::ZERO,
        }
    }
}
