//! Session lifecycle: one browser process, one context, one page per run.
//!
//! [`run_session`] is the entry point. Whatever happens inside the run (a
//! verdict, a driver error, a stalled driver call, a panic), the context and
//! the browser process are released before it returns.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{join_url, FlowcheckConfig};
use crate::driver::{
    guarded, BrowserDriver, BrowserId, ContextId, FrameId, PageId, Readiness, WaitUntil,
};
use crate::error::{E2eError, E2eResult};
use crate::executor::{StepExecutor, StepRecord};
use crate::flow::Flow;
use crate::frame::{await_frames_ready, resolve_active_frame};
use crate::verifier::{Verdict, Verifier};

/// Bound for the browser process to come up
const LAUNCH_BOUND_MS: u64 = 30_000;

/// Upper bound for each teardown call
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything one run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub flow: String,
    pub verdict: Verdict,
    pub steps: Vec<StepRecord>,
    pub frames: Vec<FrameReadiness>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| !s.success).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameReadiness {
    pub frame: FrameId,
    pub state: Readiness,
}

type Drive = (Vec<FrameReadiness>, Vec<StepRecord>, Verdict);

/// Resources held for one run, released in reverse acquisition order
pub struct Session<'a> {
    driver: &'a dyn BrowserDriver,
    browser: BrowserId,
    context: Option<ContextId>,
    page: Option<PageId>,
}

impl<'a> Session<'a> {
    /// Launch the browser, then open a context and a page. On failure, whatever
    /// was already acquired is released before the error is returned.
    pub async fn open(driver: &'a dyn BrowserDriver, config: &FlowcheckConfig) -> E2eResult<Self> {
        let mut session = Self::launch(driver, config).await?;
        if let Err(e) = session.acquire(config).await {
            session.close().await;
            return Err(e);
        }
        Ok(session)
    }

    /// Start the browser process only
    async fn launch(driver: &'a dyn BrowserDriver, config: &FlowcheckConfig) -> E2eResult<Self> {
        let options = config.launch.to_options();
        info!(headless = options.headless, args = ?options.args, "launching browser");

        let browser = guarded("browser launch", LAUNCH_BOUND_MS, driver.launch(&options))
            .await
            .map_err(|e| match e {
                E2eError::Launch(_) | E2eError::PlaywrightNotFound => e,
                other => E2eError::Launch(other.to_string()),
            })?;

        Ok(Session {
            driver,
            browser,
            context: None,
            page: None,
        })
    }

    /// Open the context and the page. Leaves cleanup to [`Session::close`].
    async fn acquire(&mut self, config: &FlowcheckConfig) -> E2eResult<()> {
        let bound = config.timeouts.context_default_ms;

        let context = guarded("new context", bound, self.driver.new_context(self.browser, bound))
            .await
            .map_err(|e| E2eError::Acquire { resource: "context", reason: e.to_string() })?;
        self.context = Some(context);

        let page = guarded("new page", bound, self.driver.new_page(context))
            .await
            .map_err(|e| E2eError::Acquire { resource: "page", reason: e.to_string() })?;
        self.page = Some(page);

        debug!(browser = %self.browser, context = %context, "session open");
        Ok(())
    }

    pub fn browser(&self) -> BrowserId {
        self.browser
    }

    pub fn context(&self) -> E2eResult<ContextId> {
        self.context
            .ok_or_else(|| E2eError::UnknownHandle("session has no context".to_string()))
    }

    pub fn page(&self) -> E2eResult<PageId> {
        self.page
            .ok_or_else(|| E2eError::UnknownHandle("session has no page".to_string()))
    }

    /// Navigate to `url`, waiting only for the request to commit
    pub async fn navigate(&self, url: &str, bound_ms: u64) -> E2eResult<()> {
        let page = self.page()?;
        info!(%url, "navigating");

        let nav = self.driver.goto(page, url, WaitUntil::Commit, bound_ms);
        guarded(format!("commit of {}", url), bound_ms, nav)
            .await
            .map_err(|e| E2eError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    /// Release the context (and with it the page), then the browser process.
    /// Each release is attempted even when the previous one failed.
    pub async fn close(mut self) {
        if let Some(context) = self.context.take() {
            self.page = None;
            match timeout(CLOSE_TIMEOUT, self.driver.close_context(context)).await {
                Ok(Ok(())) => debug!(%context, "context closed"),
                Ok(Err(e)) => warn!(%context, error = %e, "context close failed"),
                Err(_) => warn!(%context, "context close timed out"),
            }
        }

        let browser = self.browser;
        match timeout(CLOSE_TIMEOUT, self.driver.close_browser(browser)).await {
            Ok(Ok(())) => debug!(%browser, "browser closed"),
            Ok(Err(e)) => warn!(%browser, error = %e, "browser close failed"),
            Err(_) => warn!(%browser, "browser close timed out"),
        }

        if timeout(CLOSE_TIMEOUT, self.driver.is_running(browser)).await.unwrap_or(true) {
            error!(%browser, "browser process still running after teardown");
        }
    }

    async fn drive(&self, config: &FlowcheckConfig, flow: &Flow) -> E2eResult<Drive> {
        let context = self.context()?;
        let page = self.page()?;
        let timeouts = &config.timeouts;

        let url = join_url(&config.target.url, flow.path.as_deref().unwrap_or(""));
        self.navigate(&url, timeouts.navigation_ms).await?;

        let frames: Vec<FrameReadiness> =
            await_frames_ready(self.driver, page, timeouts.readiness_ms)
                .await
                .into_iter()
                .map(|(frame, state)| FrameReadiness { frame, state })
                .collect();

        let executor = StepExecutor::new(self.driver, context, timeouts, &config.target.url);
        let steps = executor.run(&flow.steps).await;

        let verify_ms = flow.verify.timeout_ms.unwrap_or(timeouts.verify_ms);
        let verdict = match resolve_active_frame(self.driver, context).await {
            Ok(frame) => {
                Verifier::new(self.driver, timeouts.poll_interval_ms)
                    .verify(frame, &flow.verify, verify_ms)
                    .await
            }
            Err(e) => {
                warn!(error = %e, "no active frame to verify against");
                Verdict::Fail(flow.verify.failure_message.clone())
            }
        };

        let hold = flow.hold_after_verify_ms.unwrap_or(timeouts.hold_after_verify_ms);
        if hold > 0 {
            sleep(Duration::from_millis(hold)).await;
        }

        Ok((frames, steps, verdict))
    }
}

/// Run one flow in its own session and return its verdict.
///
/// `Err` means the run could not produce a verdict (launch, context, page or
/// initial navigation failed, or the run panicked). Teardown has happened in
/// every case.
pub async fn run_session(
    driver: &dyn BrowserDriver,
    config: &FlowcheckConfig,
    flow: &Flow,
) -> E2eResult<RunReport> {
    let start = Instant::now();
    info!(flow = %flow.name, "starting run");

    let launched = AssertUnwindSafe(Session::launch(driver, config)).catch_unwind().await;
    let mut session = match launched {
        Ok(result) => result?,
        Err(panic) => return Err(E2eError::Aborted(panic_message(panic.as_ref()))),
    };

    let outcome = AssertUnwindSafe(async {
        session.acquire(config).await?;
        session.drive(config, flow).await
    })
    .catch_unwind()
    .await;
    session.close().await;

    let (frames, steps, verdict) = match outcome {
        Ok(result) => result?,
        Err(panic) => return Err(E2eError::Aborted(panic_message(panic.as_ref()))),
    };

    let report = RunReport {
        flow: flow.name.clone(),
        verdict,
        steps,
        frames,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        flow = %report.flow,
        verdict = %report.verdict,
        failed_steps = report.failed_steps(),
        duration_ms = report.duration_ms,
        "run finished"
    );
    Ok(report)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic during run".to_string()
    }
}
