//! Final text-visibility assertion

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::driver::{guarded, BrowserDriver, QUERY_BOUND_MS};
use crate::flow::{Expectation, TextMatch};
use crate::frame::ActiveFrame;
use crate::locator::Locator;

/// Outcome of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail(String),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Verdict::Pass => None,
            Verdict::Fail(reason) => Some(reason),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "pass"),
            Verdict::Fail(reason) => write!(f, "fail: {}", reason),
        }
    }
}

pub struct Verifier<'a> {
    driver: &'a dyn BrowserDriver,
    poll_interval: Duration,
}

impl<'a> Verifier<'a> {
    pub fn new(driver: &'a dyn BrowserDriver, poll_interval_ms: u64) -> Self {
        Self {
            driver,
            poll_interval: Duration::from_millis(poll_interval_ms.max(1)),
        }
    }

    /// Poll `frame` for a visible element carrying the expected text.
    ///
    /// A miss reports the expectation's own `failure_message`; the mechanical
    /// cause is only logged. Read-only, so repeated calls agree.
    pub async fn verify(
        &self,
        frame: ActiveFrame,
        expectation: &Expectation,
        timeout_ms: u64,
    ) -> Verdict {
        let locator = match expectation.mode {
            TextMatch::Contains => Locator::text(expectation.text.as_str()),
            TextMatch::Exact => Locator::exact_text(expectation.text.as_str()),
        };
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let mut polls = 0u32;

        loop {
            polls += 1;
            let read = self.driver.element_state(frame.page, &locator, 0);
            match guarded("verify poll", QUERY_BOUND_MS, read).await {
                Ok(state) if state.visible => {
                    info!(text = %expectation.text, polls, "expected text visible");
                    return Verdict::Pass;
                }
                Ok(_) => {}
                Err(e) => debug!(locator = %locator, error = %e, "verify poll failed"),
            }

            if Instant::now() >= deadline {
                break;
            }
            sleep(self.poll_interval).await;
        }

        info!(
            text = %expectation.text,
            timeout_ms,
            polls,
            "expected text not visible before timeout"
        );
        Verdict::Fail(expectation.failure_message.clone())
    }
}
