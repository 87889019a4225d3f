//! `flowcheck validate`

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use flowcheck_e2e::Flow;

use crate::output::{print_error, print_json, print_success, OutputFormat};

#[derive(Args)]
pub struct ValidateArgs {
    /// Flow file or directory
    #[arg(default_value = "flows")]
    pub path: PathBuf,
}

#[derive(Serialize)]
struct FileCheck {
    file: String,
    flow: Option<String>,
    error: Option<String>,
}

pub fn execute(args: ValidateArgs, format: OutputFormat) -> Result<i32> {
    if !args.path.exists() {
        anyhow::bail!("{} does not exist", args.path.display());
    }

    let mut names = HashSet::new();
    let checks: Vec<FileCheck> = Flow::discover(&args.path)
        .into_iter()
        .map(|path| {
            let file = path.display().to_string();
            match Flow::from_file(&path) {
                Ok(flow) if !names.insert(flow.name.clone()) => FileCheck {
                    file,
                    error: Some(format!("duplicate flow name '{}'", flow.name)),
                    flow: Some(flow.name),
                },
                Ok(flow) => FileCheck { file, flow: Some(flow.name), error: None },
                Err(e) => FileCheck { file, flow: None, error: Some(e.to_string()) },
            }
        })
        .collect();

    let invalid = checks.iter().filter(|c| c.error.is_some()).count();

    if format == OutputFormat::Json {
        print_json(&checks);
    } else {
        for check in &checks {
            match &check.error {
                None => {
                    let name = check.flow.as_deref().unwrap_or_default();
                    print_success(&format!("{} ({})", check.file, name))
                }
                Some(error) => print_error(error),
            }
        }
        println!("{} file(s), {} invalid", checks.len(), invalid);
    }

    Ok(if invalid > 0 { 1 } else { 0 })
}
