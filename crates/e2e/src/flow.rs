//! Declarative YAML flow definitions

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};
use crate::locator::LocatorSet;

/// A complete flow parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    /// Unique name for this flow
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering flows
    #[serde(default)]
    pub tags: Vec<String>,

    /// Path joined onto the target origin for the initial navigation
    #[serde(default)]
    pub path: Option<String>,

    /// Steps to execute in order
    pub steps: Vec<Step>,

    /// The single end-of-run assertion
    pub verify: Expectation,

    /// Overrides `timeouts.hold_after_verify_ms`
    #[serde(default)]
    pub hold_after_verify_ms: Option<u64>,

    /// File the flow was loaded from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// One scripted interaction plus its timing knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub action: Action,

    /// Free text shown in logs and reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Overrides `timeouts.settle_ms`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle_ms: Option<u64>,

    /// Overrides `timeouts.action_ms`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// The action is expected to replace the active document
    #[serde(default)]
    pub navigates: bool,

    /// Poll the target for this state before acting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<ReadyWhen>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Fill {
        target: LocatorSet,
        text: String,
    },

    Click {
        target: LocatorSet,
    },

    /// Press a key with the target focused
    Press {
        target: LocatorSet,
        key: String,
    },

    /// Choose an option of a native `<select>`
    Select {
        target: LocatorSet,
        value: String,
    },

    /// Mouse wheel on the page
    Scroll {
        #[serde(default)]
        dx: f64,
        dy: f64,
    },

    /// Navigate the active page (relative paths join the target origin)
    Goto {
        url: String,
    },

    /// Fixed wait (prefer `ready`)
    Sleep {
        ms: u64,
    },

    /// Mid-flow text check; a miss is recorded, not fatal
    AssertVisible {
        text: String,
        #[serde(default)]
        exact: bool,
    },

    /// Named point that `retry_from` can return to
    Checkpoint {
        name: String,
    },

    /// If `until` is not visible, replay everything since `checkpoint`
    RetryFrom {
        checkpoint: String,
        until: LocatorSet,
        #[serde(default = "default_attempts")]
        attempts: u32,
    },

    /// Replay the last `last` successful navigation steps
    RepeatNavigation {
        last: usize,
    },

    /// Log a message (for debugging)
    Log {
        message: String,
    },
}

fn default_attempts() -> u32 {
    2
}

/// Element state a step waits for before acting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyWhen {
    Attached,
    Visible,
    Enabled,
}

impl ReadyWhen {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadyWhen::Attached => "attached",
            ReadyWhen::Visible => "visible",
            ReadyWhen::Enabled => "enabled",
        }
    }
}

/// Final text-visibility assertion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expectation {
    pub text: String,

    #[serde(default, rename = "match")]
    pub mode: TextMatch,

    /// Overrides `timeouts.verify_ms`
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Reported verbatim when the text never shows up
    pub failure_message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextMatch {
    #[default]
    Contains,
    Exact,
}

impl Step {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            label: None,
            settle_ms: None,
            timeout_ms: None,
            navigates: false,
            ready: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn settle(mut self, ms: u64) -> Self {
        self.settle_ms = Some(ms);
        self
    }

    pub fn timeout(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn navigating(mut self) -> Self {
        self.navigates = true;
        self
    }

    pub fn ready(mut self, when: ReadyWhen) -> Self {
        self.ready = Some(when);
        self
    }

    /// Whether the step touches the page (and so pays the settle delay)
    pub fn is_interaction(&self) -> bool {
        matches!(
            self.action,
            Action::Fill { .. }
                | Action::Click { .. }
                | Action::Press { .. }
                | Action::Select { .. }
                | Action::Scroll { .. }
                | Action::Goto { .. }
        )
    }

    /// Short name used in logs and step records
    pub fn describe(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        match &self.action {
            Action::Fill { target, .. } => format!("fill:{}", target),
            Action::Click { target } => format!("click:{}", target),
            Action::Press { key, .. } => format!("press:{}", key),
            Action::Select { target, .. } => format!("select:{}", target),
            Action::Scroll { dx, dy } => format!("scroll:{},{}", dx, dy),
            Action::Goto { url } => format!("goto:{}", url),
            Action::Sleep { ms } => format!("sleep:{}ms", ms),
            Action::AssertVisible { text, .. } => format!("assert_visible:{}", text),
            Action::Checkpoint { name } => format!("checkpoint:{}", name),
            Action::RetryFrom { checkpoint, .. } => format!("retry_from:{}", checkpoint),
            Action::RepeatNavigation { last } => format!("repeat_navigation:{}", last),
            Action::Log { message } => {
                let end = message.char_indices().nth(30).map(|(i, _)| i).unwrap_or(message.len());
                format!("log:{}", &message[..end])
            }
        }
    }
}

impl Flow {
    /// Parse a flow from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let flow: Self = serde_yaml::from_str(yaml)?;
        flow.validate()?;
        Ok(flow)
    }

    /// Parse a flow from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::FlowParse(format!("{}: {}", path.display(), e)))
    }

    /// Flow files under `dir` (`.yaml`/`.yml`), sorted; a file path is
    /// returned as is
    pub fn discover(dir: &Path) -> Vec<PathBuf> {
        if dir.is_file() {
            return vec![dir.to_path_buf()];
        }

        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        paths.sort();
        paths
    }

    /// Load every flow under `dir`, sorted by file path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        if !dir.exists() {
            return Err(E2eError::FlowParse(format!("{} does not exist", dir.display())));
        }

        let paths = Self::discover(dir);
        let mut flows = Vec::with_capacity(paths.len());
        let mut names = HashSet::new();
        for path in paths {
            let mut flow = Self::from_file(&path)?;
            if !names.insert(flow.name.clone()) {
                return Err(E2eError::FlowParse(format!(
                    "duplicate flow name '{}' in {}",
                    flow.name,
                    path.display()
                )));
            }
            flow.source = Some(path);
            flows.push(flow);
        }

        Ok(flows)
    }

    /// Filter flows by tag
    pub fn filter_by_tag<'a>(flows: &'a [Self], tag: &str) -> Vec<&'a Self> {
        flows.iter().filter(|f| f.tags.iter().any(|t| t == tag)).collect()
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::FlowParse("flow name must not be empty".to_string()));
        }
        if self.verify.text.is_empty() {
            let msg = format!("{}: verify.text must not be empty", self.name);
            return Err(E2eError::FlowParse(msg));
        }

        let mut checkpoints = HashSet::new();
        let mut navigation_steps = 0usize;

        for (index, step) in self.steps.iter().enumerate() {
            let at = |msg: String| {
                E2eError::FlowParse(format!("{}: step {}: {}", self.name, index + 1, msg))
            };

            match &step.action {
                Action::Fill { target, .. }
                | Action::Click { target }
                | Action::Press { target, .. }
                | Action::Select { target, .. }
                    if target.is_empty() =>
                {
                    return Err(at("target needs at least one locator".to_string()));
                }
                Action::Checkpoint { name } => {
                    if !checkpoints.insert(name.as_str()) {
                        return Err(at(format!("checkpoint '{}' declared twice", name)));
                    }
                }
                Action::RetryFrom { checkpoint, until, attempts } => {
                    if !checkpoints.contains(checkpoint.as_str()) {
                        return Err(at(format!(
                            "retry_from refers to unknown checkpoint '{}'",
                            checkpoint
                        )));
                    }
                    if until.is_empty() {
                        return Err(at("retry_from needs an `until` locator".to_string()));
                    }
                    if *attempts == 0 {
                        return Err(at("retry_from attempts must be at least 1".to_string()));
                    }
                }
                Action::RepeatNavigation { last } => {
                    if *last == 0 {
                        return Err(at("repeat_navigation needs last >= 1".to_string()));
                    }
                    if *last > navigation_steps {
                        return Err(at(format!(
                            "repeat_navigation wants {} navigation steps, only {} precede it",
                            last, navigation_steps
                        )));
                    }
                }
                _ => {}
            }

            if step.navigates && step.is_interaction() {
                navigation_steps += 1;
            }
        }

        Ok(())
    }
}
