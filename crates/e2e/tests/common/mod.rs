//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::path::PathBuf;

use flowcheck_e2e::flow::{Action, Expectation, Step, TextMatch};
use flowcheck_e2e::locator::LocatorSet;
use flowcheck_e2e::{Flow, FlowcheckConfig};

/// Defaults with every wait shrunk so runs finish in milliseconds
pub fn fast_config() -> FlowcheckConfig {
    let mut config = FlowcheckConfig::default();
    config.timeouts.settle_ms = 0;
    config.timeouts.action_ms = 200;
    config.timeouts.verify_ms = 100;
    config.timeouts.poll_interval_ms = 5;
    config.timeouts.readiness_ms = 50;
    config.timeouts.navigation_ms = 500;
    config
}

pub fn flows_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../flows")
}

/// A flow from the repository's `flows/` directory
pub fn sample_flow(name: &str) -> Flow {
    Flow::from_file(&flows_dir().join(format!("{}.yaml", name))).unwrap()
}

pub fn flow(name: &str, steps: Vec<Step>, expect: &str) -> Flow {
    Flow {
        name: name.to_string(),
        description: String::new(),
        tags: Vec::new(),
        path: None,
        steps,
        verify: Expectation {
            text: expect.to_string(),
            mode: TextMatch::Contains,
            timeout_ms: None,
            failure_message: format!("{} not shown", expect),
        },
        hold_after_verify_ms: None,
        source: None,
    }
}

pub fn target(raw: &str) -> LocatorSet {
    LocatorSet::parse(raw).unwrap()
}

pub fn click(raw: &str) -> Step {
    Step::new(Action::Click { target: target(raw) })
}

pub fn fill(raw: &str, text: &str) -> Step {
    Step::new(Action::Fill {
        target: target(raw),
        text: text.to_string(),
    })
}

pub fn login_steps() -> Vec<Step> {
    vec![
        fill("role=textbox[name=\"Usuario\"]", "admin"),
        fill("role=textbox[name=\"Contraseña\"]", "admin123"),
        click("role=button[name=\"Iniciar Sesión\"]").navigating(),
    ]
}
