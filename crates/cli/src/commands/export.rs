//! `flowcheck export`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use flowcheck_e2e::{export_playwright_script, Flow, FlowcheckConfig};

use crate::output::print_success;

#[derive(Args)]
pub struct ExportArgs {
    /// Flow file
    pub flow: PathBuf,

    /// Write the script here instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Override target.url
    #[arg(long)]
    pub target_url: Option<String>,
}

pub fn execute(args: ExportArgs, config_path: Option<&Path>) -> Result<i32> {
    let mut config = FlowcheckConfig::load(config_path).context("loading configuration")?;
    if let Some(url) = args.target_url {
        config.target.url = url;
        config.validate()?;
    }

    let flow = Flow::from_file(&args.flow)?;
    let script = export_playwright_script(&flow, &config);

    match args.out {
        Some(path) => {
            std::fs::write(&path, script).with_context(|| format!("writing {}", path.display()))?;
            print_success(&format!("Exported '{}' to {}", flow.name, path.display()));
        }
        None => print!("{}", script),
    }
    Ok(0)
}
