//! `flowcheck list`

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use flowcheck_e2e::Flow;

use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct ListArgs {
    /// Flow file or directory
    #[arg(default_value = "flows")]
    pub path: PathBuf,

    /// Only flows carrying this tag
    #[arg(long)]
    pub tag: Option<String>,
}

#[derive(Serialize)]
struct FlowSummary {
    name: String,
    steps: usize,
    tags: Vec<String>,
    expects: String,
    file: String,
}

impl From<&Flow> for FlowSummary {
    fn from(flow: &Flow) -> Self {
        Self {
            name: flow.name.clone(),
            steps: flow.steps.len(),
            tags: flow.tags.clone(),
            expects: flow.verify.text.clone(),
            file: flow
                .source
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }
}

impl TableDisplay for FlowSummary {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Steps", "Tags", "Expects", "File"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.steps.to_string(),
            self.tags.join(", "),
            self.expects.clone(),
            self.file.clone(),
        ]
    }
}

pub fn execute(args: ListArgs, format: OutputFormat) -> Result<i32> {
    let flows = Flow::load_all(&args.path)?;
    let summaries: Vec<FlowSummary> = match &args.tag {
        Some(tag) => Flow::filter_by_tag(&flows, tag).into_iter().map(FlowSummary::from).collect(),
        None => flows.iter().map(FlowSummary::from).collect(),
    };
    print_list(&summaries, format);
    Ok(0)
}
