//! Flowcheck E2E engine
//!
//! This crate drives a real browser through scripted UI flows against a web
//! application and reports a pass/fail verdict per flow:
//! - Acquires and always releases a browser session (process, context, page)
//! - Re-resolves the active document before every step
//! - Executes (locate, wait, act) steps with bounded timeouts, accumulating
//!   failures instead of stopping
//! - Asserts one piece of text is visible at the end of the flow
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  FlowRunner (runner.rs)                     │
//! │    ├── start_target() -> TargetServer       (target.rs)     │
//! │    └── run_flow(flow) -> FlowResult                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  run_session (session.rs)                                   │
//! │    ├── Session::open   launch -> context -> page            │
//! │    ├── navigate        goto, wait for commit only           │
//! │    ├── await_frames_ready                  (frame.rs)       │
//! │    ├── StepExecutor::run(steps)            (executor.rs)    │
//! │    │     └── per step: resolve_active_frame, locate, act    │
//! │    ├── Verifier::verify -> Verdict         (verifier.rs)    │
//! │    └── Session::close  context, then browser, always        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BrowserDriver (driver.rs)                                  │
//! │    ├── PlaywrightBridge   node + JSON lines  (bridge.rs)    │
//! │    └── MockBrowser        scripted app       (mock.rs)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Flows are YAML documents ([`flow::Flow`]); see `flows/` at the repository
//! root for examples.

pub mod bridge;
pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod export;
pub mod flow;
pub mod frame;
pub mod locator;
pub mod mock;
pub mod runner;
pub mod session;
pub mod target;
pub mod verifier;

pub use bridge::{BridgeConfig, PlaywrightBridge};
pub use config::FlowcheckConfig;
pub use driver::BrowserDriver;
pub use error::{E2eError, E2eResult};
pub use export::export_playwright_script;
pub use flow::{Flow, Step};
pub use locator::{Locator, LocatorSet};
pub use runner::{FlowResult, FlowRunner, SuiteResult};
pub use session::{run_session, RunReport};
pub use verifier::Verdict;
