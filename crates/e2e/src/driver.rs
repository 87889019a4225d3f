//! Browser capability contract
//!
//! Everything the executor knows about a browser goes through [`BrowserDriver`]:
//! process lifecycle, the page/frame graph, element location, timed waits and
//! action dispatch. Handles are plain ids; the driver owns the real objects.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};
use crate::locator::Locator;

/// Extra time granted to a driver call beyond its own bound
pub const GUARD_MARGIN: Duration = Duration::from_millis(2000);

/// Bound for queries that carry no timeout of their own (pages, frames,
/// counts, element state)
pub const QUERY_BOUND_MS: u64 = 1_000;

macro_rules! handle {
    ($name:ident, $prefix:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

handle!(BrowserId, "browser");
handle!(ContextId, "context");
handle!(PageId, "page");
handle!(FrameId, "frame");

/// Launch-time parameters, passed through to the engine unchanged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchOptions {
    pub headless: bool,
    pub args: Vec<String>,
}

/// How far a navigation must progress before `goto` returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    /// Network response received and document committed
    #[default]
    Commit,
    DomContentLoaded,
    Load,
}

impl WaitUntil {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitUntil::Commit => "commit",
            WaitUntil::DomContentLoaded => "domcontentloaded",
            WaitUntil::Load => "load",
        }
    }
}

/// Readiness of one document context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Loading,
    DomReady,
    UnknownAfterTimeout,
}

/// Observable state of the first element a locator matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElementState {
    pub attached: bool,
    pub visible: bool,
    pub enabled: bool,
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> E2eResult<BrowserId>;

    async fn new_context(
        &self,
        browser: BrowserId,
        default_timeout_ms: u64,
    ) -> E2eResult<ContextId>;

    async fn new_page(&self, context: ContextId) -> E2eResult<PageId>;

    /// Open pages of a context, in the order they were opened
    async fn pages(&self, context: ContextId) -> E2eResult<Vec<PageId>>;

    /// Main frame first, then every attached child frame
    async fn frames(&self, page: PageId) -> E2eResult<Vec<FrameId>>;

    async fn goto(
        &self,
        page: PageId,
        url: &str,
        wait_until: WaitUntil,
        timeout_ms: u64,
    ) -> E2eResult<()>;

    /// Wait for `domcontentloaded` in one frame
    async fn wait_for_dom_ready(&self, frame: FrameId, timeout_ms: u64) -> E2eResult<()>;

    async fn count(&self, page: PageId, locator: &Locator) -> E2eResult<usize>;

    async fn element_state(
        &self,
        page: PageId,
        locator: &Locator,
        nth: usize,
    ) -> E2eResult<ElementState>;

    async fn fill(
        &self,
        page: PageId,
        locator: &Locator,
        nth: usize,
        text: &str,
        timeout_ms: u64,
    ) -> E2eResult<()>;

    async fn click(
        &self,
        page: PageId,
        locator: &Locator,
        nth: usize,
        timeout_ms: u64,
    ) -> E2eResult<()>;

    async fn press(
        &self,
        page: PageId,
        locator: &Locator,
        nth: usize,
        key: &str,
        timeout_ms: u64,
    ) -> E2eResult<()>;

    async fn select_option(
        &self,
        page: PageId,
        locator: &Locator,
        nth: usize,
        value: &str,
        timeout_ms: u64,
    ) -> E2eResult<()>;

    async fn scroll(&self, page: PageId, delta_x: f64, delta_y: f64) -> E2eResult<()>;

    async fn close_context(&self, context: ContextId) -> E2eResult<()>;

    async fn close_browser(&self, browser: BrowserId) -> E2eResult<()>;

    /// Whether the browser process behind the handle is still alive
    async fn is_running(&self, browser: BrowserId) -> bool;
}

/// Run one driver call with a hard upper bound of `bound_ms` plus
/// [`GUARD_MARGIN`]. A driver that never answers yields `E2eError::Timeout`
/// instead of stalling the run.
pub async fn guarded<T, F>(what: impl fmt::Display, bound_ms: u64, call: F) -> E2eResult<T>
where
    F: Future<Output = E2eResult<T>>,
{
    match tokio::time::timeout(Duration::from_millis(bound_ms) + GUARD_MARGIN, call).await {
        Ok(result) => result,
        Err(_) => Err(E2eError::Timeout {
            what: format!("{} (driver did not answer)", what),
            timeout_ms: bound_ms,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guard_turns_a_stalled_call_into_timeout() {
        let stalled = std::future::pending::<E2eResult<()>>();
        let err = guarded("click on page#1", 200, stalled).await.unwrap_err();

        assert!(err.is_timeout());
        assert!(err.to_string().contains("click on page#1"), "{err}");
    }

    #[tokio::test]
    async fn guard_passes_results_through() {
        assert_eq!(guarded("count", 10, async { Ok(3usize) }).await.unwrap(), 3);

        let err = guarded("count", 10, async { Err::<(), _>(E2eError::Driver("gone".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::Driver(_)));
    }
}
