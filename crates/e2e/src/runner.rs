//! Suite runner: selects flows, runs each in its own session, collects and
//! writes results.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::{join_url, FlowcheckConfig};
use crate::driver::BrowserDriver;
use crate::error::{E2eError, E2eResult};
use crate::executor::StepRecord;
use crate::flow::Flow;
use crate::session::{run_session, FrameReadiness};
use crate::target::{probe_target, TargetServer};
use crate::verifier::Verdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    Passed,
    Failed,
    /// No verdict: the session could not be set up or the run aborted
    Error,
}

/// Result of running a single flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowResult {
    pub name: String,
    pub status: FlowStatus,
    pub verdict: Option<Verdict>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub steps: Vec<StepRecord>,
    pub frames: Vec<FrameReadiness>,
}

impl FlowResult {
    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| !s.success).count()
    }

    /// Authored diagnostic for failures, error text for errors
    pub fn reason(&self) -> Option<&str> {
        match self.status {
            FlowStatus::Passed => None,
            FlowStatus::Failed => self.verdict.as_ref().and_then(Verdict::reason),
            FlowStatus::Error => self.error.as_deref(),
        }
    }
}

/// Result of running a set of flows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub started_at: DateTime<Utc>,
    pub target_url: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub duration_ms: u64,
    pub results: Vec<FlowResult>,
}

impl SuiteResult {
    /// 0 when every flow passed, 1 when any failed, 2 when any could not run
    pub fn exit_code(&self) -> i32 {
        if self.errored > 0 {
            2
        } else if self.failed > 0 {
            1
        } else {
            0
        }
    }
}

/// Pick flows by tag and/or name; both filters must match when given
pub fn select_flows(flows: Vec<Flow>, tag: Option<&str>, name: Option<&str>) -> Vec<Flow> {
    flows
        .into_iter()
        .filter(|f| tag.map_or(true, |t| f.tags.iter().any(|x| x == t)))
        .filter(|f| name.map_or(true, |n| f.name == n))
        .collect()
}

/// Runs flows one after another, each in a fresh browser session
pub struct FlowRunner {
    driver: Arc<dyn BrowserDriver>,
    config: FlowcheckConfig,
    server: Option<TargetServer>,
}

impl FlowRunner {
    pub fn new(driver: Arc<dyn BrowserDriver>, config: FlowcheckConfig) -> Self {
        Self {
            driver,
            config,
            server: None,
        }
    }

    pub fn config(&self) -> &FlowcheckConfig {
        &self.config
    }

    /// Start the configured dev server, if any and not yet running
    pub async fn start_target(&mut self) -> E2eResult<()> {
        if self.server.is_some() || self.config.target.command.is_empty() {
            return Ok(());
        }
        self.server = Some(TargetServer::spawn(&self.config.target).await?);
        Ok(())
    }

    /// Check the target answers before spending a browser launch on it
    pub async fn probe_target(&self) -> E2eResult<()> {
        let url = join_url(&self.config.target.url, &self.config.target.health_path);
        probe_target(&url, self.config.target.startup_timeout_ms).await
    }

    pub async fn stop_target(&mut self) -> E2eResult<()> {
        if let Some(server) = self.server.take() {
            server.stop().await?;
        }
        Ok(())
    }

    pub async fn run_flows(&self, flows: &[Flow]) -> SuiteResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut results = Vec::with_capacity(flows.len());

        info!(count = flows.len(), url = %self.config.target.url, "Running flows");

        for flow in flows {
            let result = self.run_flow(flow).await;
            match result.status {
                FlowStatus::Passed => info!("✓ {} ({} ms)", result.name, result.duration_ms),
                FlowStatus::Failed => {
                    warn!("✗ {} - {}", result.name, result.reason().unwrap_or("failed"))
                }
                FlowStatus::Error => {
                    error!("! {} - {}", result.name, result.reason().unwrap_or("error"))
                }
            }
            results.push(result);
        }

        let count = |status| results.iter().filter(|r: &&FlowResult| r.status == status).count();
        let suite = SuiteResult {
            started_at,
            target_url: self.config.target.url.clone(),
            total: results.len(),
            passed: count(FlowStatus::Passed),
            failed: count(FlowStatus::Failed),
            errored: count(FlowStatus::Error),
            duration_ms: start.elapsed().as_millis() as u64,
            results,
        };

        info!(
            passed = suite.passed,
            failed = suite.failed,
            errored = suite.errored,
            duration_ms = suite.duration_ms,
            "Suite finished"
        );
        suite
    }

    pub async fn run_flow(&self, flow: &Flow) -> FlowResult {
        let start = Instant::now();
        match run_session(self.driver.as_ref(), &self.config, flow).await {
            Ok(report) => FlowResult {
                name: report.flow,
                status: if report.verdict.is_pass() {
                    FlowStatus::Passed
                } else {
                    FlowStatus::Failed
                },
                verdict: Some(report.verdict),
                error: None,
                duration_ms: report.duration_ms,
                steps: report.steps,
                frames: report.frames,
            },
            Err(e) => FlowResult {
                name: flow.name.clone(),
                status: FlowStatus::Error,
                verdict: None,
                error: Some(e.to_string()),
                duration_ms: start.elapsed().as_millis() as u64,
                steps: Vec::new(),
                frames: Vec::new(),
            },
        }
    }

    /// Write results as pretty JSON under the output directory
    pub fn write_results(&self, suite: &SuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output.dir)?;

        let path = self.config.results_path();
        let json = serde_json::to_string_pretty(suite)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

/// Load flows from `path` and apply the filters; an empty selection is an error
pub fn load_selection(
    path: &std::path::Path,
    tag: Option<&str>,
    name: Option<&str>,
) -> E2eResult<Vec<Flow>> {
    let flows = select_flows(Flow::load_all(path)?, tag, name);
    if flows.is_empty() {
        return Err(E2eError::FlowParse(format!(
            "no flows selected under {}",
            path.display()
        )));
    }
    Ok(flows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{Action, Expectation, Step, TextMatch};
    use crate::mock::{Faults, MockApp, MockBrowser};

    fn flow(name: &str, tags: &[&str]) -> Flow {
        Flow {
            name: name.to_string(),
            description: String::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            path: None,
            steps: vec![Step::new(Action::Log { message: "hi".into() })],
            verify: Expectation {
                text: "Iniciar Sesión".to_string(),
                mode: TextMatch::Contains,
                timeout_ms: Some(50),
                failure_message: "login page not shown".to_string(),
            },
            hold_after_verify_ms: None,
            source: None,
        }
    }

    fn fast_config() -> FlowcheckConfig {
        let mut config = FlowcheckConfig::default();
        config.timeouts.settle_ms = 0;
        config.timeouts.poll_interval_ms = 5;
        config
    }

    #[test]
    fn selection_applies_both_filters() {
        let flows = vec![flow("a", &["smoke"]), flow("b", &["smoke", "tenants"]), flow("c", &[])];
        let names = |v: Vec<Flow>| v.into_iter().map(|f| f.name).collect::<Vec<_>>();

        assert_eq!(names(select_flows(flows.clone(), Some("smoke"), None)), vec!["a", "b"]);
        assert_eq!(names(select_flows(flows.clone(), Some("smoke"), Some("b"))), vec!["b"]);
        assert!(select_flows(flows, Some("tenants"), Some("a")).is_empty());
    }

    #[tokio::test]
    async fn suite_counts_and_exit_code() {
        let browser = Arc::new(MockBrowser::new(MockApp::rental_admin()));
        let runner = FlowRunner::new(browser.clone(), fast_config());

        let mut failing = flow("missing", &[]);
        failing.verify.text = "Tenant Creation Successful".to_string();

        let suite = runner.run_flows(&[flow("login", &[]), failing]).await;
        assert_eq!((suite.total, suite.passed, suite.failed, suite.errored), (2, 1, 1, 0));
        assert_eq!(suite.exit_code(), 1);
        assert_eq!(suite.results[1].reason(), Some("login page not shown"));
        assert_eq!(browser.live_browsers(), 0);
    }

    #[tokio::test]
    async fn launch_failure_is_an_error_result() {
        let faults = Faults { fail_launch: true, ..Faults::default() };
        let browser = MockBrowser::with_faults(MockApp::rental_admin(), faults);
        let runner = FlowRunner::new(Arc::new(browser), fast_config());

        let suite = runner.run_flows(&[flow("login", &[])]).await;
        assert_eq!(suite.errored, 1);
        assert_eq!(suite.exit_code(), 2);
        assert!(suite.results[0].error.as_deref().unwrap_or("").contains("launch"));
    }

    #[tokio::test]
    async fn results_file_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fast_config();
        config.output.dir = dir.path().to_path_buf();

        let runner = FlowRunner::new(Arc::new(MockBrowser::new(MockApp::rental_admin())), config);
        let suite = runner.run_flows(&[flow("login", &[])]).await;
        let path = runner.write_results(&suite).unwrap();

        let raw = std::fs::read_to_string(path).unwrap();
        let written: SuiteResult = serde_json::from_str(&raw).unwrap();
        assert_eq!(written.passed, 1);
        assert_eq!(written.results[0].status, FlowStatus::Passed);
    }
}
