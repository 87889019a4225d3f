//! Active-frame resolution and best-effort readiness

use tracing::debug;

use crate::driver::{guarded, BrowserDriver, ContextId, FrameId, PageId, Readiness, QUERY_BOUND_MS};
use crate::error::{E2eError, E2eResult};

/// The document a step acts on.
///
/// Holds ids only, so a stale value never keeps a replaced document alive.
/// Resolve a fresh one before every step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveFrame {
    pub context: ContextId,
    pub page: PageId,
}

/// Most recently opened page of the context.
///
/// Popups and navigations may have changed which document is current since the
/// previous step, so the result is never cached.
pub async fn resolve_active_frame(
    driver: &dyn BrowserDriver,
    context: ContextId,
) -> E2eResult<ActiveFrame> {
    let pages = guarded("open pages", QUERY_BOUND_MS, driver.pages(context)).await?;
    let page = pages.last().copied().ok_or_else(|| {
        E2eError::Driver(format!("{} has no open pages", context))
    })?;

    Ok(ActiveFrame { context, page })
}

/// Wait for `domcontentloaded` on the page and, independently, on every frame
/// attached right now. Misses are swallowed.
pub async fn await_frames_ready(
    driver: &dyn BrowserDriver,
    page: PageId,
    timeout_ms: u64,
) -> Vec<(FrameId, Readiness)> {
    let frames = match guarded("frame list", QUERY_BOUND_MS, driver.frames(page)).await {
        Ok(frames) => frames,
        Err(e) => {
            debug!(%page, error = %e, "could not enumerate frames");
            return Vec::new();
        }
    };

    let mut states = Vec::with_capacity(frames.len());
    for frame in frames {
        let wait = driver.wait_for_dom_ready(frame, timeout_ms);
        let state = match guarded("domcontentloaded", timeout_ms, wait).await {
            Ok(()) => Readiness::DomReady,
            Err(e) if e.is_timeout() => Readiness::UnknownAfterTimeout,
            Err(e) => {
                debug!(%frame, error = %e, "readiness wait failed");
                Readiness::Loading
            }
        };
        debug!(%frame, ?state, "frame readiness");
        states.push((frame, state));
    }

    states
}
