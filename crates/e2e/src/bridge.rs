//! Playwright-backed [`BrowserDriver`]
//!
//! A small node program (embedded below) owns the real Playwright objects and
//! speaks JSON lines on stdin/stdout. Every request carries an `id`; the reply
//! with the same `id` is either `{"ok":true,"result":...}` or
//! `{"ok":false,"error":"...","timeout":bool}`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::driver::{
    BrowserDriver, BrowserId, ContextId, ElementState, FrameId, LaunchOptions, PageId, WaitUntil,
};
use crate::error::{E2eError, E2eResult};
use crate::locator::Locator;

const DRIVER_SCRIPT: &str = r#"
const path = require('path');
const readline = require('readline');
const { createRequire } = require('module');

const load = createRequire(path.join(process.cwd(), 'flowcheck-driver.js'));
const { chromium } = load('playwright');

const objects = new Map();
const ids = new Map();
let nextId = 0;

function handle(obj) {
  if (ids.has(obj)) return ids.get(obj);
  const id = ++nextId;
  ids.set(obj, id);
  objects.set(id, obj);
  return id;
}

function forget(obj) {
  const id = ids.get(obj);
  if (id === undefined) return;
  ids.delete(obj);
  objects.delete(id);
}

function withPages(context) {
  return [context, ...context.pages().flatMap((page) => [page, ...page.frames()])];
}

function lookup(id) {
  const obj = objects.get(id);
  if (!obj) throw new Error(`unknown handle ${id}`);
  return obj;
}

function target(req) {
  return lookup(req.page).locator(req.selector).nth(req.nth || 0);
}

const ops = {
  async launch(req) {
    return handle(await chromium.launch({ headless: req.headless, args: req.args }));
  },
  async new_context(req) {
    const context = await lookup(req.browser).newContext();
    context.setDefaultTimeout(req.default_timeout_ms);
    return handle(context);
  },
  async new_page(req) {
    return handle(await lookup(req.context).newPage());
  },
  async pages(req) {
    return lookup(req.context).pages().map(handle);
  },
  async frames(req) {
    return lookup(req.page).frames().map(handle);
  },
  async goto(req) {
    const options = { waitUntil: req.wait_until, timeout: req.timeout_ms };
    await lookup(req.page).goto(req.url, options);
    return null;
  },
  async wait_for_dom_ready(req) {
    const frame = lookup(req.frame);
    await frame.waitForLoadState('domcontentloaded', { timeout: req.timeout_ms });
    return null;
  },
  async count(req) {
    return await lookup(req.page).locator(req.selector).count();
  },
  async element_state(req) {
    const all = lookup(req.page).locator(req.selector);
    if ((await all.count()) <= (req.nth || 0)) {
      return { attached: false, visible: false, enabled: false };
    }
    const el = all.nth(req.nth || 0);
    const visible = await el.isVisible();
    const enabled = await el.isEnabled({ timeout: 1 }).catch(() => false);
    return { attached: true, visible, enabled };
  },
  async fill(req) {
    await target(req).fill(req.text, { timeout: req.timeout_ms });
    return null;
  },
  async click(req) {
    await target(req).click({ timeout: req.timeout_ms });
    return null;
  },
  async press(req) {
    await target(req).press(req.key, { timeout: req.timeout_ms });
    return null;
  },
  async select_option(req) {
    await target(req).selectOption(req.value, { timeout: req.timeout_ms });
    return null;
  },
  async scroll(req) {
    await lookup(req.page).mouse.wheel(req.dx, req.dy);
    return null;
  },
  async close_context(req) {
    const context = lookup(req.context);
    const owned = withPages(context);
    await context.close();
    owned.forEach(forget);
    return null;
  },
  async close_browser(req) {
    const browser = lookup(req.browser);
    const owned = browser.contexts().flatMap(withPages);
    await browser.close();
    owned.forEach(forget);
    forget(browser);
    return null;
  },
  async is_running(req) {
    const browser = objects.get(req.browser);
    return !!browser && browser.isConnected();
  },
};

function reply(msg) {
  process.stdout.write(JSON.stringify(msg) + '\n');
}

const rl = readline.createInterface({ input: process.stdin });
rl.on('line', async (line) => {
  let req;
  try {
    req = JSON.parse(line);
  } catch (e) {
    const id = /"id"\s*:\s*(\d+)/.exec(line);
    const error = `unparseable request: ${e.message}`;
    reply({ id: id ? Number(id[1]) : null, ok: false, error, timeout: false });
    return;
  }
  if (req.op === 'shutdown') {
    process.exit(0);
  }
  const op = ops[req.op];
  try {
    if (!op) throw new Error(`unknown op ${req.op}`);
    const result = await op(req);
    reply({ id: req.id, ok: true, result });
  } catch (e) {
    const timeout = !!e && e.name === 'TimeoutError';
    reply({ id: req.id, ok: false, error: String(e && e.message || e), timeout });
  }
});
rl.on('close', () => process.exit(0));
"#;

#[derive(Debug, Serialize)]
struct Request<'a> {
    id: u64,
    op: &'a str,
    #[serde(flatten)]
    params: Value,
}

#[derive(Debug, Deserialize)]
struct Response {
    id: Option<u64>,
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    timeout: bool,
}

impl Response {
    /// Whether this reply answers request `id`. An error without an id is the
    /// driver rejecting a line it could not parse, which is the one in flight.
    fn answers(&self, id: u64) -> bool {
        self.id.map_or(!self.ok, |got| got == id)
    }

    fn into_result(self, op: &str, timeout_ms: u64) -> E2eResult<Value> {
        if self.ok {
            return Ok(self.result);
        }
        let message = self.error.unwrap_or_else(|| "unspecified failure".to_string());
        if self.timeout {
            Err(E2eError::Timeout {
                what: format!("{}: {}", op, first_line(&message)),
                timeout_ms,
            })
        } else {
            Err(E2eError::Driver(format!("{}: {}", op, first_line(&message))))
        }
    }
}

/// Playwright error messages carry a multi-line call log
fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or(message)
}

struct Channel {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

/// Launch settings for the node side
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub node: PathBuf,

    /// Directory whose `node_modules` provides `playwright`
    pub project_dir: PathBuf,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            node: PathBuf::from("node"),
            project_dir: PathBuf::from("."),
        }
    }
}

pub struct PlaywrightBridge {
    channel: Mutex<Channel>,
    child: Mutex<Child>,
    _script_dir: tempfile::TempDir,
}

impl PlaywrightBridge {
    /// Check that Playwright resolves, then start the driver process
    pub async fn start(config: &BridgeConfig) -> E2eResult<Self> {
        Self::check_playwright_installed(config).await?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("flowcheck-driver.js");
        std::fs::write(&script_path, DRIVER_SCRIPT)?;

        debug!("Starting Playwright driver: {}", script_path.display());

        let mut child = Command::new(&config.node)
            .arg(&script_path)
            .current_dir(&config.project_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                E2eError::Bridge(format!("failed to start {}: {}", config.node.display(), e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Bridge("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Bridge("driver stdout unavailable".to_string()))?;

        info!(pid = ?child.id(), "Playwright driver started");

        Ok(Self {
            channel: Mutex::new(Channel {
                stdin,
                stdout: BufReader::new(stdout).lines(),
                next_id: 0,
            }),
            child: Mutex::new(child),
            _script_dir: script_dir,
        })
    }

    async fn check_playwright_installed(config: &BridgeConfig) -> E2eResult<()> {
        let status = Command::new(&config.node)
            .args(["-e", "require.resolve('playwright')"])
            .current_dir(&config.project_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    /// Ask the driver to exit and reap it
    pub async fn shutdown(&self) {
        {
            let mut channel = self.channel.lock().await;
            let _ = channel.stdin.write_all(b"{\"op\":\"shutdown\"}\n").await;
            let _ = channel.stdin.flush().await;
        }
        let mut child = self.child.lock().await;
        match tokio::time::timeout(std::time::Duration::from_secs(5), child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "Playwright driver exited"),
            _ => {
                warn!("Playwright driver did not exit, killing");
                let _ = child.kill().await;
            }
        }
    }

    async fn call(&self, op: &str, params: Value) -> E2eResult<Value> {
        let timeout_ms = params.get("timeout_ms").and_then(Value::as_u64).unwrap_or(0);
        let mut channel = self.channel.lock().await;

        channel.next_id += 1;
        let id = channel.next_id;
        let mut line = serde_json::to_string(&Request { id, op, params })?;
        line.push('\n');

        channel
            .stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| E2eError::Bridge(format!("driver unreachable: {}", e)))?;
        channel.stdin.flush().await?;

        loop {
            let Some(line) = channel.stdout.next_line().await? else {
                return Err(E2eError::Bridge(format!("driver exited during {}", op)));
            };
            match serde_json::from_str::<Response>(&line) {
                Ok(response) if response.answers(id) => {
                    return response.into_result(op, timeout_ms)
                }
                Ok(response) => {
                    debug!(stale = ?response.id, expected = id, "discarding stale reply")
                }
                Err(_) => debug!(output = %line, "driver output"),
            }
        }
    }

    async fn call_into<T>(&self, op: &str, params: Value) -> E2eResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let value = self.call(op, params).await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[derive(Deserialize)]
struct WireElementState {
    attached: bool,
    visible: bool,
    enabled: bool,
}

#[async_trait]
impl BrowserDriver for PlaywrightBridge {
    async fn launch(&self, options: &LaunchOptions) -> E2eResult<BrowserId> {
        let id = self
            .call_into("launch", json!({ "headless": options.headless, "args": options.args }))
            .await
            .map_err(|e| E2eError::Launch(e.to_string()))?;
        Ok(BrowserId(id))
    }

    async fn new_context(
        &self,
        browser: BrowserId,
        default_timeout_ms: u64,
    ) -> E2eResult<ContextId> {
        let params = json!({ "browser": browser.0, "default_timeout_ms": default_timeout_ms });
        Ok(ContextId(self.call_into("new_context", params).await?))
    }

    async fn new_page(&self, context: ContextId) -> E2eResult<PageId> {
        Ok(PageId(self.call_into("new_page", json!({ "context": context.0 })).await?))
    }

    async fn pages(&self, context: ContextId) -> E2eResult<Vec<PageId>> {
        let ids: Vec<u64> = self.call_into("pages", json!({ "context": context.0 })).await?;
        Ok(ids.into_iter().map(PageId).collect())
    }

    async fn frames(&self, page: PageId) -> E2eResult<Vec<FrameId>> {
        let ids: Vec<u64> = self.call_into("frames", json!({ "page": page.0 })).await?;
        Ok(ids.into_iter().map(FrameId).collect())
    }

    async fn goto(
        &self,
        page: PageId,
        url: &str,
        wait_until: WaitUntil,
        timeout_ms: u64,
    ) -> E2eResult<()> {
        let params = json!({
            "page": page.0,
            "url": url,
            "wait_until": wait_until.as_str(),
            "timeout_ms": timeout_ms,
        });
        self.call("goto", params).await.map(drop)
    }

    async fn wait_for_dom_ready(&self, frame: FrameId, timeout_ms: u64) -> E2eResult<()> {
        let params = json!({ "frame": frame.0, "timeout_ms": timeout_ms });
        self.call("wait_for_dom_ready", params).await.map(drop)
    }

    async fn count(&self, page: PageId, locator: &Locator) -> E2eResult<usize> {
        let params = json!({ "page": page.0, "selector": locator.to_playwright() });
        self.call_into("count", params).await
    }

    async fn element_state(
        &self,
        page: PageId,
        locator: &Locator,
        nth: usize,
    ) -> E2eResult<ElementState> {
        let params = json!({ "page": page.0, "selector": locator.to_playwright(), "nth": nth });
        let state: WireElementState = self.call_into("element_state", params).await?;
        Ok(ElementState {
            attached: state.attached,
            visible: state.visible,
            enabled: state.enabled,
        })
    }

    async fn fill(
        &self,
        page: PageId,
        locator: &Locator,
        nth: usize,
        text: &str,
        timeout_ms: u64,
    ) -> E2eResult<()> {
        let params = json!({
            "page": page.0,
            "selector": locator.to_playwright(),
            "nth": nth,
            "text": text,
            "timeout_ms": timeout_ms,
        });
        self.call("fill", params).await.map(drop)
    }

    async fn click(
        &self,
        page: PageId,
        locator: &Locator,
        nth: usize,
        timeout_ms: u64,
    ) -> E2eResult<()> {
        let params = json!({
            "page": page.0,
            "selector": locator.to_playwright(),
            "nth": nth,
            "timeout_ms": timeout_ms,
        });
        self.call("click", params).await.map(drop)
    }

    async fn press(
        &self,
        page: PageId,
        locator: &Locator,
        nth: usize,
        key: &str,
        timeout_ms: u64,
    ) -> E2eResult<()> {
        let params = json!({
            "page": page.0,
            "selector": locator.to_playwright(),
            "nth": nth,
            "key": key,
            "timeout_ms": timeout_ms,
        });
        self.call("press", params).await.map(drop)
    }

    async fn select_option(
        &self,
        page: PageId,
        locator: &Locator,
        nth: usize,
        value: &str,
        timeout_ms: u64,
    ) -> E2eResult<()> {
        let params = json!({
            "page": page.0,
            "selector": locator.to_playwright(),
            "nth": nth,
            "value": value,
            "timeout_ms": timeout_ms,
        });
        self.call("select_option", params).await.map(drop)
    }

    async fn scroll(&self, page: PageId, delta_x: f64, delta_y: f64) -> E2eResult<()> {
        let params = json!({ "page": page.0, "dx": delta_x, "dy": delta_y });
        self.call("scroll", params).await.map(drop)
    }

    async fn close_context(&self, context: ContextId) -> E2eResult<()> {
        self.call("close_context", json!({ "context": context.0 })).await.map(drop)
    }

    async fn close_browser(&self, browser: BrowserId) -> E2eResult<()> {
        self.call("close_browser", json!({ "browser": browser.0 })).await.map(drop)
    }

    async fn is_running(&self, browser: BrowserId) -> bool {
        match self.call_into::<bool>("is_running", json!({ "browser": browser.0 })).await {
            Ok(running) => running,
            // A dead driver process cannot be holding a live browser
            Err(_) => false,
        }
    }
}

/// Resolve the project directory Playwright is installed in
pub fn project_dir(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_flattens_params() {
        let request = Request {
            id: 7,
            op: "click",
            params: json!({
                "page": 3,
                "selector": "text=Guardar",
                "nth": 0,
                "timeout_ms": 5000,
            }),
        };
        let value: Value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["op"], "click");
        assert_eq!(value["selector"], "text=Guardar");
        assert_eq!(value["timeout_ms"], 5000);
    }

    #[test]
    fn timeout_reply_maps_to_timeout_error() {
        let reply = json!({
            "id": 1,
            "ok": false,
            "error": "Timeout 5000ms exceeded.\n=========================== logs",
            "timeout": true,
        });
        let response: Response = serde_json::from_value(reply).unwrap();
        let err = response.into_result("click", 5000).unwrap_err();
        match err {
            E2eError::Timeout { what, timeout_ms } => {
                assert_eq!(timeout_ms, 5000);
                assert_eq!(what, "click: Timeout 5000ms exceeded.");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn hard_failure_maps_to_driver_error() {
        let reply = json!({
            "id": 2,
            "ok": false,
            "error": "Target page, context or browser has been closed",
        });
        let response: Response = serde_json::from_value(reply).unwrap();
        assert!(matches!(response.into_result("goto", 0), Err(E2eError::Driver(_))));
    }

    #[test]
    fn rejected_line_without_id_answers_the_request_in_flight() {
        let reply = json!({
            "id": null,
            "ok": false,
            "error": "unparseable request: Unexpected token",
            "timeout": false,
        });
        let response: Response = serde_json::from_value(reply).unwrap();
        assert!(response.answers(9));
        assert!(matches!(response.into_result("click", 0), Err(E2eError::Driver(_))));

        let stale: Response = serde_json::from_str(r#"{"id":4,"ok":true,"result":null}"#).unwrap();
        assert!(!stale.answers(9));
        let unnamed_ok: Response = serde_json::from_str(r#"{"id":null,"ok":true}"#).unwrap();
        assert!(!unnamed_ok.answers(9));
    }

    #[test]
    fn driver_answers_unparseable_lines_and_forgets_closed_handles() {
        assert!(DRIVER_SCRIPT.contains("unparseable request"));
        assert!(DRIVER_SCRIPT.contains("reply({ id: id ? Number(id[1]) : null, ok: false"));
        let close_context = DRIVER_SCRIPT.find("async close_context").unwrap();
        let close_browser = DRIVER_SCRIPT.find("async close_browser").unwrap();
        let is_running = DRIVER_SCRIPT.find("async is_running").unwrap();
        assert!(DRIVER_SCRIPT[close_context..close_browser].contains("owned.forEach(forget)"));
        assert!(DRIVER_SCRIPT[close_browser..is_running].contains("forget(browser)"));
    }

    #[test]
    fn success_reply_carries_result() {
        let response: Response =
            serde_json::from_str(r#"{"id":3,"ok":true,"result":[4,9]}"#).unwrap();
        let result = response.into_result("pages", 0).unwrap();
        let ids: Vec<u64> = serde_json::from_value(result).unwrap();
        assert_eq!(ids, vec![4, 9]);
    }

    #[test]
    fn driver_script_implements_every_op() {
        for op in [
            "launch",
            "new_context",
            "new_page",
            "pages",
            "frames",
            "goto",
            "wait_for_dom_ready",
            "count",
            "element_state",
            "fill",
            "click",
            "press",
            "select_option",
            "scroll",
            "close_context",
            "close_browser",
            "is_running",
        ] {
            assert!(DRIVER_SCRIPT.contains(&format!("async {}(req)", op)), "missing op {op}");
        }
    }
}
