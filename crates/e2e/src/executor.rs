//! Step execution
//!
//! Every step is a (locate, wait, act) triple run against a freshly resolved
//! [`ActiveFrame`]. A step that cannot find its target or times out becomes a
//! [`StepOutcome::RecoverableFailure`]; the sequence always runs to the end and
//! failures are accumulated in the returned [`StepRecord`]s.
//!
//! Retries never repeat the failed action. They replay a known-good prefix:
//! `retry_from` replays everything after a checkpoint until its `until` marker
//! is visible, `repeat_navigation` replays the last N navigation steps.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::{join_url, Timeouts};
use crate::driver::{guarded, BrowserDriver, ContextId, WaitUntil, QUERY_BOUND_MS};
use crate::error::{E2eError, E2eResult};
use crate::flow::{Action, ReadyWhen, Step};
use crate::frame::{resolve_active_frame, ActiveFrame};
use crate::locator::{Locator, LocatorSet};

/// Result of one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Ok,
    RecoverableFailure(String),
}

impl StepOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, StepOutcome::Ok)
    }
}

/// What the report keeps about an executed step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Position in the flow, 0-based
    pub index: usize,
    pub step_name: String,
    /// Executed as part of a checkpoint or navigation replay
    pub replay: bool,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

pub struct StepExecutor<'a> {
    driver: &'a dyn BrowserDriver,
    context: ContextId,
    timeouts: &'a Timeouts,
    base_url: &'a str,
}

impl<'a> StepExecutor<'a> {
    pub fn new(
        driver: &'a dyn BrowserDriver,
        context: ContextId,
        timeouts: &'a Timeouts,
        base_url: &'a str,
    ) -> Self {
        Self {
            driver,
            context,
            timeouts,
            base_url,
        }
    }

    /// Run a whole step sequence. Never stops early.
    pub async fn run(&self, steps: &[Step]) -> Vec<StepRecord> {
        let mut records = Vec::with_capacity(steps.len());
        let mut checkpoints: HashMap<&str, usize> = HashMap::new();
        let mut navigation_history: Vec<usize> = Vec::new();

        for (index, step) in steps.iter().enumerate() {
            match &step.action {
                Action::Checkpoint { name } => {
                    debug!(checkpoint = %name, "checkpoint reached");
                    checkpoints.insert(name.as_str(), index);
                    records.push(record(index, step, false, StepOutcome::Ok, 0));
                }
                Action::RetryFrom { checkpoint, until, attempts } => {
                    let start = Instant::now();
                    let outcome = match checkpoints.get(checkpoint.as_str()) {
                        Some(&from) => {
                            let replay = &steps[from + 1..index];
                            self.retry_until(replay, from + 1, until, *attempts, step, &mut records)
                                .await
                        }
                        None => StepOutcome::RecoverableFailure(format!(
                            "checkpoint '{}' was not reached",
                            checkpoint
                        )),
                    };
                    records.push(record(index, step, false, outcome, elapsed_ms(start)));
                }
                Action::RepeatNavigation { last } => {
                    let start = Instant::now();
                    let skip = navigation_history.len().saturating_sub(*last);
                    let replay: Vec<usize> = navigation_history[skip..].to_vec();

                    info!(count = replay.len(), "repeating navigation steps");
                    for replay_index in replay.iter().copied() {
                        let rec = self.run_one(replay_index, &steps[replay_index], true).await;
                        records.push(rec);
                    }

                    let outcome = if replay.len() < *last {
                        StepOutcome::RecoverableFailure(format!(
                            "only {} of {} navigation steps available to repeat",
                            replay.len(),
                            last
                        ))
                    } else {
                        StepOutcome::Ok
                    };
                    records.push(record(index, step, false, outcome, elapsed_ms(start)));
                }
                _ => {
                    let rec = self.run_one(index, step, false).await;
                    if rec.success && step.navigates && step.is_interaction() {
                        navigation_history.push(index);
                    }
                    records.push(rec);
                }
            }
        }

        let failed = records.iter().filter(|r| !r.success).count();
        if failed > 0 {
            warn!(
                failed,
                total = records.len(),
                "step sequence finished with recoverable failures"
            );
        }

        records
    }

    /// Resolve the active frame, then execute one step against it
    async fn run_one(&self, index: usize, step: &Step, replay: bool) -> StepRecord {
        let start = Instant::now();
        let outcome = match resolve_active_frame(self.driver, self.context).await {
            Ok(frame) => {
                let outcome = self.execute(frame, step).await;
                if step.navigates {
                    if let Ok(after) = resolve_active_frame(self.driver, self.context).await {
                        if after != frame {
                            debug!(
                                before = %frame.page,
                                after = %after.page,
                                "active page changed"
                            );
                        }
                    }
                }
                outcome
            }
            Err(e) => StepOutcome::RecoverableFailure(format!("no active frame: {}", e)),
        };

        match &outcome {
            StepOutcome::Ok => debug!(index, step = %step.describe(), replay, "step ok"),
            StepOutcome::RecoverableFailure(reason) => {
                warn!(index, step = %step.describe(), replay, %reason, "step failed")
            }
        }

        record(index, step, replay, outcome, elapsed_ms(start))
    }

    async fn retry_until(
        &self,
        replay: &[Step],
        first_index: usize,
        until: &LocatorSet,
        attempts: u32,
        step: &Step,
        records: &mut Vec<StepRecord>,
    ) -> StepOutcome {
        let bound = step.timeout_ms.unwrap_or(self.timeouts.verify_ms);

        for attempt in 0..=attempts {
            if self.marker_visible(until, bound).await {
                if attempt > 0 {
                    info!(attempt, marker = %until, "marker visible after replay");
                }
                return StepOutcome::Ok;
            }
            if attempt == attempts {
                break;
            }

            info!(
                attempt = attempt + 1,
                of = attempts,
                marker = %until,
                "marker missing, replaying from checkpoint"
            );
            for (offset, replay_step) in replay.iter().enumerate() {
                if is_control(replay_step) {
                    continue;
                }
                let rec = self.run_one(first_index + offset, replay_step, true).await;
                records.push(rec);
            }
        }

        StepOutcome::RecoverableFailure(format!(
            "{} not visible after {} replay(s)",
            until, attempts
        ))
    }

    async fn marker_visible(&self, until: &LocatorSet, bound_ms: u64) -> bool {
        let deadline = Instant::now() + Duration::from_millis(bound_ms);
        loop {
            if let Ok(frame) = resolve_active_frame(self.driver, self.context).await {
                for candidate in until.candidates() {
                    let read = self.driver.element_state(frame.page, candidate, 0);
                    if let Ok(state) = guarded("marker poll", QUERY_BOUND_MS, read).await {
                        if state.visible {
                            return true;
                        }
                    }
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(self.poll_interval()).await;
        }
    }

    /// Execute a single step against `frame`
    pub async fn execute(&self, frame: ActiveFrame, step: &Step) -> StepOutcome {
        match self.perform(frame, step).await {
            Ok(()) => StepOutcome::Ok,
            Err(e) => StepOutcome::RecoverableFailure(e.to_string()),
        }
    }

    async fn perform(&self, frame: ActiveFrame, step: &Step) -> E2eResult<()> {
        if step.is_interaction() {
            let settle = step.settle_ms.unwrap_or(self.timeouts.settle_ms);
            if settle > 0 {
                sleep(Duration::from_millis(settle)).await;
            }
        }

        let timeout_ms = step.timeout_ms.unwrap_or(self.timeouts.action_ms);
        let page = frame.page;

        let what = step.describe();
        match &step.action {
            Action::Fill { target, text } => {
                let locator = self.locate(frame, target, step.ready, timeout_ms).await?;
                let fill = self.driver.fill(page, locator, 0, text, timeout_ms);
                guarded(what, timeout_ms, fill).await
            }
            Action::Click { target } => {
                let locator = self.locate(frame, target, step.ready, timeout_ms).await?;
                let click = self.driver.click(page, locator, 0, timeout_ms);
                guarded(what, timeout_ms, click).await
            }
            Action::Press { target, key } => {
                let locator = self.locate(frame, target, step.ready, timeout_ms).await?;
                let press = self.driver.press(page, locator, 0, key, timeout_ms);
                guarded(what, timeout_ms, press).await
            }
            Action::Select { target, value } => {
                let locator = self.locate(frame, target, step.ready, timeout_ms).await?;
                let select = self.driver.select_option(page, locator, 0, value, timeout_ms);
                guarded(what, timeout_ms, select).await
            }
            Action::Scroll { dx, dy } => {
                guarded(what, timeout_ms, self.driver.scroll(page, *dx, *dy)).await
            }
            Action::Goto { url } => {
                let url = join_url(self.base_url, url);
                let bound = step.timeout_ms.unwrap_or(self.timeouts.navigation_ms);
                let goto = self.driver.goto(page, &url, WaitUntil::Commit, bound);
                guarded(what, bound, goto).await
            }
            Action::Sleep { ms } => {
                sleep(Duration::from_millis(*ms)).await;
                Ok(())
            }
            Action::AssertVisible { text, exact } => {
                let locator = if *exact {
                    Locator::exact_text(text.as_str())
                } else {
                    Locator::text(text.as_str())
                };
                let bound = step.timeout_ms.unwrap_or(self.timeouts.verify_ms);
                if self.marker_visible(&LocatorSet::from(locator.clone()), bound).await {
                    Ok(())
                } else {
                    Err(E2eError::Timeout {
                        what: format!("{} to be visible", locator),
                        timeout_ms: bound,
                    })
                }
            }
            Action::Log { message } => {
                info!("[FLOW LOG] {}", message);
                Ok(())
            }
            Action::Checkpoint { .. }
            | Action::RetryFrom { .. }
            | Action::RepeatNavigation { .. } => Ok(()),
        }
    }

    /// First candidate with a match (and in the wanted state), polled up to
    /// `timeout_ms`. Index 0 is always the element acted on.
    async fn locate<'s>(
        &self,
        frame: ActiveFrame,
        target: &'s LocatorSet,
        ready: Option<ReadyWhen>,
        timeout_ms: u64,
    ) -> E2eResult<&'s Locator> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let mut matched_not_ready: Option<&Locator> = None;

        loop {
            for candidate in target.candidates() {
                let lookup = self.driver.count(frame.page, candidate);
                let count = match guarded("candidate count", QUERY_BOUND_MS, lookup).await {
                    Ok(count) => count,
                    Err(e) => {
                        debug!(locator = %candidate, error = %e, "candidate lookup failed");
                        continue;
                    }
                };
                if count == 0 {
                    continue;
                }

                let Some(when) = ready else {
                    return Ok(candidate);
                };
                // The element may detach between the count and this read
                let read = self.driver.element_state(frame.page, candidate, 0);
                let state = match guarded("candidate state", QUERY_BOUND_MS, read).await {
                    Ok(state) => state,
                    Err(e) => {
                        debug!(locator = %candidate, error = %e, "candidate state unreadable");
                        matched_not_ready.get_or_insert(candidate);
                        continue;
                    }
                };
                let satisfied = match when {
                    ReadyWhen::Attached => state.attached,
                    ReadyWhen::Visible => state.visible,
                    ReadyWhen::Enabled => state.visible && state.enabled,
                };
                if satisfied {
                    return Ok(candidate);
                }
                matched_not_ready.get_or_insert(candidate);
            }

            if Instant::now() >= deadline {
                break;
            }
            sleep(self.poll_interval()).await;
        }

        match (matched_not_ready, ready) {
            (Some(locator), Some(when)) => Err(E2eError::Timeout {
                what: format!("{} to be {}", locator, when.as_str()),
                timeout_ms,
            }),
            _ => Err(E2eError::NoMatch(target.to_string())),
        }
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.timeouts.poll_interval_ms.max(1))
    }
}

fn is_control(step: &Step) -> bool {
    matches!(
        step.action,
        Action::Checkpoint { .. } | Action::RetryFrom { .. } | Action::RepeatNavigation { .. }
    )
}

fn record(
    index: usize,
    step: &Step,
    replay: bool,
    outcome: StepOutcome,
    duration_ms: u64,
) -> StepRecord {
    let (success, error) = match outcome {
        StepOutcome::Ok => (true, None),
        StepOutcome::RecoverableFailure(reason) => (false, Some(reason)),
    };
    StepRecord {
        index,
        step_name: step.describe(),
        replay,
        success,
        duration_ms,
        error,
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
