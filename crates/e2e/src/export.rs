//! Standalone Playwright script generation
//!
//! The exported script runs the same flow without this crate: same launch
//! flags, commit-only first navigation, last-page re-resolution before each
//! step, fallback locators, non-fatal step failures and the final text check.

use crate::config::{join_url, FlowcheckConfig};
use crate::flow::{Action, Flow, Step, TextMatch};
use crate::locator::{Locator, LocatorSet};

/// JS string literal for `s`
fn lit(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn selectors(set: &LocatorSet) -> String {
    let items: Vec<String> = set.candidates().iter().map(|l| lit(&l.to_playwright())).collect();
    format!("[{}]", items.join(", "))
}

const PRELUDE: &str = r#"
const failures = [];
const active = () => { const pages = context.pages(); return pages[pages.length - 1]; };
const sleep = (ms) => new Promise((r) => setTimeout(r, ms));

async function pick(selectors, state, timeout) {
  const deadline = Date.now() + timeout;
  for (;;) {
    const page = active();
    for (const sel of selectors) {
      const loc = page.locator(sel).first();
      if ((await loc.count()) === 0) continue;
      if (state === 'visible' && !(await loc.isVisible())) continue;
      const enabled = () => loc.isEnabled({ timeout: 1 }).catch(() => false);
      if (state === 'enabled' && !(await enabled())) continue;
      return loc;
    }
    if (Date.now() >= deadline) throw new Error(`no match for ${selectors.join(' | ')}`);
    await sleep(POLL_MS);
  }
}

async function step(name, body) {
  try {
    await body();
    console.log(`ok   ${name}`);
    return true;
  } catch (e) {
    failures.push(name);
    console.log(`FAIL ${name}: ${String(e && e.message || e).split('\n')[0]}`);
    return false;
  }
}
"#;

/// Render `flow` as a node script using the `playwright` package
pub fn export_playwright_script(flow: &Flow, config: &FlowcheckConfig) -> String {
    let timeouts = &config.timeouts;
    let options = config.launch.to_options();
    let args: Vec<String> = options.args.iter().map(|a| lit(a)).collect();
    let url = join_url(&config.target.url, flow.path.as_deref().unwrap_or(""));

    let mut script = String::new();
    script.push_str(&format!("// Flow: {}\n", flow.name.replace('\n', " ")));
    if !flow.description.is_empty() {
        script.push_str(&format!("// {}\n", flow.description.replace('\n', " ")));
    }
    script.push_str(&format!(
        r#"const {{ chromium }} = require('playwright');

const BASE_URL = {base};
const POLL_MS = {poll};

(async () => {{
  const browser = await chromium.launch({{ headless: {headless}, args: [{args}] }});
  const context = await browser.newContext();
  context.setDefaultTimeout({context_timeout});
  let code = 2;
  try {{
    await context.newPage();
"#,
        base = lit(&config.target.url),
        poll = timeouts.poll_interval_ms,
        headless = options.headless,
        args = args.join(", "),
        context_timeout = timeouts.context_default_ms,
    ));

    for line in PRELUDE.lines() {
        if line.is_empty() {
            script.push('\n');
        } else {
            script.push_str("    ");
            script.push_str(line);
            script.push('\n');
        }
    }

    script.push_str(&format!(
        "    await active().goto({}, {{ waitUntil: 'commit', timeout: {} }});\n",
        lit(&url),
        timeouts.navigation_ms
    ));
    script.push_str(&format!(
        concat!(
            "    for (const frame of active().frames()) {{\n",
            "      await frame.waitForLoadState('domcontentloaded', {{ timeout: {} }})",
            ".catch(() => {{}});\n",
            "    }}\n",
        ),
        timeouts.readiness_ms
    ));

    let mut navigations: Vec<usize> = Vec::new();
    for (index, step) in flow.steps.iter().enumerate() {
        script.push_str(&format!("\n    // Step {}: {}\n", index + 1, step.describe()));
        match &step.action {
            Action::RetryFrom { checkpoint, until, attempts } => {
                let from = flow
                    .steps
                    .iter()
                    .position(|s| {
                        matches!(&s.action, Action::Checkpoint { name } if name == checkpoint)
                    })
                    .unwrap_or(index);
                let bound = step.timeout_ms.unwrap_or(timeouts.verify_ms);
                script.push_str(&format!(
                    concat!(
                        "    for (let attempt = 0; attempt < {attempts}; attempt++) {{\n",
                        "      const done = await pick({sel}, 'visible', {bound})",
                        ".then(() => true, () => false);\n",
                        "      if (done) break;\n",
                    ),
                    attempts = attempts,
                    sel = selectors(until),
                    bound = bound,
                ));
                for replay in flow.steps[from + 1..index].iter().filter(|s| !is_control(s)) {
                    script.push_str(&indent(&step_to_js(replay, config), 2));
                }
                script.push_str("    }\n");
            }
            Action::RepeatNavigation { last } => {
                let start = navigations.len().saturating_sub(*last);
                for &nav in &navigations[start..] {
                    script.push_str(&step_to_js(&flow.steps[nav], config));
                }
            }
            _ => {
                script.push_str(&step_to_js(step, config));
                if step.navigates && step.is_interaction() {
                    navigations.push(index);
                }
            }
        }
    }

    let expected = match flow.verify.mode {
        TextMatch::Contains => Locator::text(flow.verify.text.as_str()),
        TextMatch::Exact => Locator::exact_text(flow.verify.text.as_str()),
    };
    let verify_ms = flow.verify.timeout_ms.unwrap_or(timeouts.verify_ms);
    let hold = flow.hold_after_verify_ms.unwrap_or(timeouts.hold_after_verify_ms);

    script.push_str(&format!(
        r#"
    const passed = await pick([{expected}], 'visible', {verify_ms}).then(() => true, () => false);
    if (passed) {{
      console.log('PASS');
      code = 0;
    }} else {{
      console.log('FAIL ' + {message});
      code = 1;
    }}
    if (failures.length > 0) console.log(`${{failures.length}} step(s) failed`);
"#,
        expected = lit(&expected.to_playwright()),
        verify_ms = verify_ms,
        message = lit(&flow.verify.failure_message),
    ));
    if hold > 0 {
        script.push_str(&format!("    await sleep({});\n", hold));
    }

    script.push_str(
        r#"  } catch (error) {
    console.error(error && error.message || error);
  } finally {
    await context.close().catch(() => {});
    await browser.close();
  }
  process.exit(code);
})();
"#,
    );

    script
}

fn is_control(step: &Step) -> bool {
    matches!(
        step.action,
        Action::Checkpoint { .. } | Action::RetryFrom { .. } | Action::RepeatNavigation { .. }
    )
}

fn indent(block: &str, levels: usize) -> String {
    let pad = "  ".repeat(levels);
    block
        .lines()
        .map(|l| format!("{}{}\n", pad, l))
        .collect()
}

/// JavaScript for one non-control step
fn step_to_js(step: &Step, config: &FlowcheckConfig) -> String {
    let timeouts = &config.timeouts;
    let action_ms = step.timeout_ms.unwrap_or(timeouts.action_ms);
    let settle = step.settle_ms.unwrap_or(timeouts.settle_ms);
    let state = step.ready.map(|r| r.as_str()).unwrap_or("attached");
    let name = lit(&step.describe());

    let settle_js = if step.is_interaction() && settle > 0 {
        format!("await sleep({}); ", settle)
    } else {
        String::new()
    };
    let target = |set: &LocatorSet| {
        format!("const el = await pick({}, '{}', {}); ", selectors(set), state, action_ms)
    };

    let body = match &step.action {
        Action::Fill { target: set, text } => {
            format!("{}await el.fill({}, {{ timeout: {} }});", target(set), lit(text), action_ms)
        }
        Action::Click { target: set } => {
            format!("{}await el.click({{ timeout: {} }});", target(set), action_ms)
        }
        Action::Press { target: set, key } => {
            format!("{}await el.press({}, {{ timeout: {} }});", target(set), lit(key), action_ms)
        }
        Action::Select { target: set, value } => {
            let value = lit(value);
            let select = format!("await el.selectOption({}, {{ timeout: {} }});", value, action_ms);
            format!("{}{}", target(set), select)
        }
        Action::Scroll { dx, dy } => format!("await active().mouse.wheel({}, {});", dx, dy),
        Action::Goto { url } => format!(
            "await active().goto({}, {{ waitUntil: 'commit', timeout: {} }});",
            lit(&join_url(&config.target.url, url)),
            timeouts.navigation_ms
        ),
        Action::Sleep { ms } => format!("await sleep({});", ms),
        Action::AssertVisible { text, exact } => {
            let locator = if *exact {
                Locator::exact_text(text.as_str())
            } else {
                Locator::text(text.as_str())
            };
            format!(
                "await pick([{}], 'visible', {});",
                lit(&locator.to_playwright()),
                timeouts.verify_ms
            )
        }
        Action::Log { message } => format!("console.log({});", lit(message)),
        Action::Checkpoint { .. } | Action::RetryFrom { .. } | Action::RepeatNavigation { .. } => {
            return String::new();
        }
    };

    format!("    await step({}, async () => {{ {}{} }});\n", name, settle_js, body)
}
