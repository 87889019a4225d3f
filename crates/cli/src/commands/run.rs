//! `flowcheck run`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tracing::debug;

use flowcheck_e2e::bridge::{project_dir, BridgeConfig, PlaywrightBridge};
use flowcheck_e2e::mock::{MockApp, MockBrowser};
use flowcheck_e2e::runner::{load_selection, FlowResult, FlowStatus, SuiteResult};
use flowcheck_e2e::{BrowserDriver, FlowRunner, FlowcheckConfig};

use crate::output::{
    print_failure, print_info, print_json, print_list, print_success, print_warning, OutputFormat,
    TableDisplay,
};

#[derive(Args)]
pub struct RunArgs {
    /// Flow file or directory
    #[arg(default_value = "flows")]
    pub path: PathBuf,

    /// Only flows carrying this tag
    #[arg(long)]
    pub tag: Option<String>,

    /// Only the flow with this name
    #[arg(long)]
    pub name: Option<String>,

    /// Override target.url
    #[arg(long)]
    pub target_url: Option<String>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Directory for the results file
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Start target.command before running and stop it afterwards
    #[arg(long)]
    pub serve: bool,

    /// Check the target answers before launching any browser
    #[arg(long)]
    pub probe: bool,

    /// Directory whose node_modules provides playwright
    #[arg(long)]
    pub playwright_dir: Option<PathBuf>,

    /// Run against the built-in demo app instead of a real browser
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Serialize)]
struct FlowRow {
    name: String,
    status: FlowStatus,
    failed_steps: usize,
    duration_ms: u64,
    reason: String,
}

impl From<&FlowResult> for FlowRow {
    fn from(result: &FlowResult) -> Self {
        Self {
            name: result.name.clone(),
            status: result.status,
            failed_steps: result.failed_steps(),
            duration_ms: result.duration_ms,
            reason: result.reason().unwrap_or_default().to_string(),
        }
    }
}

impl TableDisplay for FlowRow {
    fn headers() -> Vec<&'static str> {
        vec!["Flow", "Status", "Failed steps", "Duration", "Reason"]
    }

    fn row(&self) -> Vec<String> {
        let status = match self.status {
            FlowStatus::Passed => "PASS".green().to_string(),
            FlowStatus::Failed => "FAIL".red().to_string(),
            FlowStatus::Error => "ERROR".yellow().to_string(),
        };
        vec![
            self.name.clone(),
            status,
            self.failed_steps.to_string(),
            format!("{} ms", self.duration_ms),
            self.reason.clone(),
        ]
    }
}

fn apply_overrides(config: &mut FlowcheckConfig, args: &RunArgs) -> Result<()> {
    if let Some(url) = &args.target_url {
        config.target.url = url.clone();
    }
    if args.headed {
        config.launch.headless = false;
    }
    if let Some(dir) = &args.output {
        config.output.dir = dir.clone();
    }
    config.validate()?;
    Ok(())
}

pub async fn execute(
    args: RunArgs,
    config_path: Option<&Path>,
    format: OutputFormat,
) -> Result<i32> {
    let mut config = FlowcheckConfig::load(config_path).context("loading configuration")?;
    apply_overrides(&mut config, &args)?;

    let flows = load_selection(&args.path, args.tag.as_deref(), args.name.as_deref())?;
    debug!(url = %config.target.url, flows = flows.len(), dry_run = args.dry_run, "flows selected");

    let bridge = if args.dry_run {
        None
    } else {
        let bridge_config = BridgeConfig {
            project_dir: project_dir(args.playwright_dir.as_deref()),
            ..BridgeConfig::default()
        };
        Some(Arc::new(PlaywrightBridge::start(&bridge_config).await?))
    };
    let driver: Arc<dyn BrowserDriver> = match &bridge {
        Some(bridge) => bridge.clone(),
        None => Arc::new(MockBrowser::new(MockApp::rental_admin())),
    };

    let mut runner = FlowRunner::new(driver, config);
    if args.serve {
        runner.start_target().await?;
    }
    if args.probe && !args.dry_run {
        runner.probe_target().await?;
    }

    let suite = runner.run_flows(&flows).await;
    let results_path = runner.write_results(&suite)?;

    if args.serve {
        runner.stop_target().await?;
    }
    if let Some(bridge) = bridge {
        bridge.shutdown().await;
    }

    report(&suite, format);
    if format != OutputFormat::Json {
        print_info(&format!("Results written to {}", results_path.display()));
    }
    Ok(suite.exit_code())
}

fn report(suite: &SuiteResult, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(suite),
        OutputFormat::Table => {
            let rows: Vec<FlowRow> = suite.results.iter().map(FlowRow::from).collect();
            print_list(&rows, format);
            summary(suite);
        }
        OutputFormat::Plain => {
            for result in &suite.results {
                match result.status {
                    FlowStatus::Passed => print_success(&result.name),
                    FlowStatus::Failed => print_failure(&format!(
                        "{}: {}",
                        result.name,
                        result.reason().unwrap_or_default()
                    )),
                    FlowStatus::Error => print_warning(&format!(
                        "{}: {}",
                        result.name,
                        result.reason().unwrap_or_default()
                    )),
                }
            }
            summary(suite);
        }
    }
}

fn summary(suite: &SuiteResult) {
    println!(
        "{} passed, {} failed, {} errored ({} ms)",
        suite.passed.to_string().green(),
        suite.failed.to_string().red(),
        suite.errored.to_string().yellow(),
        suite.duration_ms
    );
}
