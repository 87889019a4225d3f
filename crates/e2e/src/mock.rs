//! In-memory [`BrowserDriver`] backed by a scripted single-page app.
//!
//! A [`MockApp`] is a set of named views, each a flat list of elements. Clicks
//! can switch the page to another view (the document is replaced and gets new
//! frame ids), open a popup page, or submit the view's inputs. Elements can
//! mount late or swallow their first clicks, which is enough to reproduce the
//! rendering races real flows run into. [`Faults`] injects resource failures.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::driver::{
    BrowserDriver, BrowserId, ContextId, ElementState, FrameId, LaunchOptions, PageId, WaitUntil,
};
use crate::error::{E2eError, E2eResult};
use crate::locator::Locator;

/// What a click does besides being logged
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickEffect {
    /// Replace the current document with another view
    Navigate(String),
    /// Open the view in a new page of the same context
    Popup(String),
    /// Go to `ok` when every required input of the view is filled, else to
    /// `invalid` (or stay put)
    Submit { ok: String, invalid: Option<String> },
}

#[derive(Debug, Clone, Default)]
pub struct MockElement {
    pub path: String,
    pub text: String,
    pub role: Option<String>,
    pub name: Option<String>,
    pub test_id: Option<String>,
    pub css: Vec<String>,
    pub input: bool,
    pub required: bool,
    pub visible: bool,
    pub enabled: bool,
    /// Lookups on the view before the element is mounted
    pub mounts_after: u32,
    /// Clicks that are swallowed before the effect fires
    pub ignored_clicks: u32,
    pub on_click: Option<ClickEffect>,
}

impl MockElement {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            visible: true,
            enabled: true,
            ..Default::default()
        }
    }

    pub fn text(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::new(path)
        }
    }

    pub fn input(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: Some("textbox".to_string()),
            name: Some(name.into()),
            input: true,
            ..Self::new(path)
        }
    }

    pub fn button(path: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            role: Some("button".to_string()),
            ..Self::text(path, label)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn test_id(mut self, id: impl Into<String>) -> Self {
        self.test_id = Some(id.into());
        self
    }

    pub fn css(mut self, selector: impl Into<String>) -> Self {
        self.css.push(selector.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn mounts_after(mut self, lookups: u32) -> Self {
        self.mounts_after = lookups;
        self
    }

    pub fn ignores_first_clicks(mut self, clicks: u32) -> Self {
        self.ignored_clicks = clicks;
        self
    }

    pub fn on_click(mut self, effect: ClickEffect) -> Self {
        self.on_click = Some(effect);
        self
    }

    fn accessible_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.text)
    }

    fn matches(&self, locator: &Locator) -> bool {
        match locator {
            Locator::XPath(path) => normalize_path(path) == normalize_path(&self.path),
            Locator::Css(css) => self.css.iter().any(|c| c == css),
            Locator::Text { text, exact: true } => self.text.trim() == text.trim(),
            Locator::Text { text, exact: false } => {
                !self.text.is_empty() && self.text.to_lowercase().contains(&text.to_lowercase())
            }
            Locator::Role { role, name } => {
                self.role.as_deref() == Some(role.as_str())
                    && name.as_deref().map_or(true, |n| self.accessible_name() == n)
            }
            Locator::TestId(id) => self.test_id.as_deref() == Some(id.as_str()),
        }
    }
}

fn normalize_path(path: &str) -> &str {
    path.trim().trim_start_matches('/')
}

#[derive(Debug, Clone, Default)]
pub struct MockView {
    pub elements: Vec<MockElement>,
    /// Child frames attached alongside the main frame
    pub child_frames: usize,
}

/// The application under test
#[derive(Debug, Clone)]
pub struct MockApp {
    start: String,
    views: HashMap<String, MockView>,
    routes: HashMap<String, String>,
}

impl MockApp {
    pub fn new(start_view: impl Into<String>) -> Self {
        Self {
            start: start_view.into(),
            views: HashMap::new(),
            routes: HashMap::new(),
        }
    }

    pub fn view(mut self, name: impl Into<String>, elements: Vec<MockElement>) -> Self {
        self.views.insert(name.into(), MockView { elements, child_frames: 0 });
        self
    }

    pub fn view_with_frames(
        mut self,
        name: impl Into<String>,
        elements: Vec<MockElement>,
        child_frames: usize,
    ) -> Self {
        self.views.insert(name.into(), MockView { elements, child_frames });
        self
    }

    /// Serve `view` for `path`; unknown paths get the start view
    pub fn route(mut self, path: impl Into<String>, view: impl Into<String>) -> Self {
        self.routes.insert(path.into(), view.into());
        self
    }

    fn view_for_url(&self, url: &str) -> String {
        let path = url
            .split_once("://")
            .map(|(_, rest)| rest.find('/').map(|i| &rest[i..]).unwrap_or("/"))
            .unwrap_or(url);
        self.routes.get(path).cloned().unwrap_or_else(|| self.start.clone())
    }

    /// The rental admin panel the sample flows are written against: login,
    /// a dashboard of section tiles, the tenants list and the new-tenant dialog.
    pub fn rental_admin() -> Self {
        let login = "html/body/div/div/div/div/div/form";
        let tiles = "html/body/div/div/div/div/div[2]";
        let dialog = "html/body/div[2]/div[3]/div";
        let add_tenant = || {
            MockElement::button("html/body/div/div/div/div/button", "Agregar Inquilino")
                .on_click(ClickEffect::Navigate("tenant-dialog".to_string()))
        };
        let dialog_title = || {
            MockElement::text(format!("{dialog}/h2"), "Nuevo Inquilino").test_id("tenant-form")
        };

        MockApp::new("login")
            .view(
                "login",
                vec![
                    MockElement::input(format!("{login}/div/div/input"), "Usuario").required(),
                    MockElement::input(format!("{login}/div[2]/div/input"), "Contraseña")
                        .required(),
                    MockElement::button(format!("{login}/button"), "Iniciar Sesión").on_click(
                        ClickEffect::Submit { ok: "dashboard".to_string(), invalid: None },
                    ),
                ],
            )
            .view(
                "dashboard",
                vec![
                    MockElement::text(format!("{tiles}/div/div"), "Inquilinos")
                        .on_click(ClickEffect::Navigate("tenants".to_string())),
                    MockElement::text(format!("{tiles}/div[3]/div"), "Pagos")
                        .on_click(ClickEffect::Navigate("payments".to_string())),
                    MockElement::text(format!("{tiles}/div[4]/div"), "Contratos")
                        .on_click(ClickEffect::Navigate("contracts".to_string())),
                ],
            )
            .view(
                "tenants",
                vec![
                    MockElement::text("html/body/div/div/div/h4", "Inquilinos")
                        .test_id("tenants-page"),
                    add_tenant(),
                ],
            )
            .view(
                "tenant-dialog",
                vec![
                    dialog_title(),
                    MockElement::input(format!("{dialog}/div/form/div/div/input"), "Nombre")
                        .required(),
                    MockElement::input(format!("{dialog}/div/form/div[2]/div/input"), "Apellido")
                        .required(),
                    MockElement::input(format!("{dialog}/div/form/div[3]/div/input"), "Teléfono"),
                    MockElement::button(format!("{dialog}/div[2]/button[2]"), "Guardar").on_click(
                        ClickEffect::Submit {
                            ok: "tenant-created".to_string(),
                            invalid: Some("tenant-dialog-invalid".to_string()),
                        },
                    ),
                    MockElement::button(format!("{dialog}/div[2]/button"), "Cancelar")
                        .on_click(ClickEffect::Navigate("tenants".to_string())),
                ],
            )
            .view(
                "tenant-dialog-invalid",
                vec![
                    dialog_title(),
                    MockElement::text(
                        format!("{dialog}/div/form/div/p"),
                        "Este campo es requerido",
                    ),
                ],
            )
            .view(
                "tenant-created",
                vec![
                    MockElement::text("html/body/div[3]/div/div", "Tenant Creation Successful"),
                    add_tenant(),
                ],
            )
            .view(
                "payments",
                vec![MockElement::button("html/body/div/div/div/div/button", "Agregar Pago")],
            )
            .view(
                "contracts",
                vec![MockElement::text("html/body/div/div/div/h4", "Contratos")],
            )
    }
}

/// Resource failures to inject
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub fail_launch: bool,
    pub fail_context: bool,
    pub fail_page: bool,
    /// Every `goto` is refused as if nothing listened on the port
    pub unreachable: bool,
    /// `domcontentloaded` never fires
    pub never_ready: bool,
    /// Closing a context reports an error (and leaves it open)
    pub fail_close_context: bool,
    /// Clicking an element whose path or text equals this panics
    pub panic_on_click: Option<String>,
    /// Clicking an element whose path or text equals this never returns
    pub hang_on_click: Option<String>,
    /// Opening a page panics
    pub panic_on_acquire: bool,
    /// The first N element state reads fail as if the element detached
    pub element_state_errors: u32,
}

#[derive(Debug)]
struct PageState {
    context: u64,
    view: String,
    values: HashMap<String, String>,
    clicks: HashMap<String, u32>,
    lookups: u32,
    frames: Vec<u64>,
}

#[derive(Debug)]
struct ContextState {
    browser: u64,
    pages: Vec<u64>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    running: HashMap<u64, bool>,
    contexts: HashMap<u64, ContextState>,
    pages: HashMap<u64, PageState>,
    frames: HashMap<u64, u64>,
    log: Vec<String>,
    launches: usize,
    state_reads: u32,
}

impl State {
    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn page(&self, page: PageId) -> E2eResult<&PageState> {
        self.pages.get(&page.0).ok_or_else(|| E2eError::UnknownHandle(page.to_string()))
    }

    fn page_mut(&mut self, page: PageId) -> E2eResult<&mut PageState> {
        self.pages.get_mut(&page.0).ok_or_else(|| E2eError::UnknownHandle(page.to_string()))
    }

    fn open_page(&mut self, app: &MockApp, context: u64, view: String) -> u64 {
        let id = self.id();
        self.pages.insert(
            id,
            PageState {
                context,
                view: String::new(),
                values: HashMap::new(),
                clicks: HashMap::new(),
                lookups: 0,
                frames: Vec::new(),
            },
        );
        self.render(app, id, view);
        if let Some(ctx) = self.contexts.get_mut(&context) {
            ctx.pages.push(id);
        }
        id
    }

    /// Replace the page's document: fresh frames, fresh values
    fn render(&mut self, app: &MockApp, page: u64, view: String) {
        let child_frames = app.views.get(&view).map(|v| v.child_frames).unwrap_or(0);
        let mut frames = Vec::with_capacity(child_frames + 1);
        for _ in 0..=child_frames {
            let frame = self.id();
            self.frames.insert(frame, page);
            frames.push(frame);
        }

        if let Some(state) = self.pages.get_mut(&page) {
            for old in state.frames.drain(..) {
                self.frames.remove(&old);
            }
            state.view = view;
            state.values.clear();
            state.lookups = 0;
            state.frames = frames;
        }
    }

    fn close_context(&mut self, context: u64) {
        if let Some(ctx) = self.contexts.remove(&context) {
            for page in ctx.pages {
                if let Some(state) = self.pages.remove(&page) {
                    for frame in state.frames {
                        self.frames.remove(&frame);
                    }
                }
            }
        }
    }
}

/// Scripted browser for tests and dry runs
pub struct MockBrowser {
    app: MockApp,
    faults: Faults,
    state: Mutex<State>,
}

impl MockBrowser {
    pub fn new(app: MockApp) -> Self {
        Self::with_faults(app, Faults::default())
    }

    pub fn with_faults(app: MockApp, faults: Faults) -> Self {
        Self {
            app,
            faults,
            state: Mutex::new(State::default()),
        }
    }

    /// Browser processes still alive
    pub fn live_browsers(&self) -> usize {
        self.state.lock().running.values().filter(|r| **r).count()
    }

    pub fn launches(&self) -> usize {
        self.state.lock().launches
    }

    /// Every action the app received, in order
    pub fn actions(&self) -> Vec<String> {
        self.state.lock().log.clone()
    }

    /// Current view of the most recently opened page of any context
    pub fn current_view(&self) -> Option<String> {
        let state = self.state.lock();
        state.pages.keys().max().and_then(|id| state.pages.get(id)).map(|p| p.view.clone())
    }

    fn view(&self, name: &str) -> E2eResult<&MockView> {
        self.app
            .views
            .get(name)
            .ok_or_else(|| E2eError::Driver(format!("app has no view '{}'", name)))
    }

    /// Mounted elements of the page's view matching `locator`
    fn find(
        &self,
        state: &mut State,
        page: PageId,
        locator: &Locator,
    ) -> E2eResult<Vec<MockElement>> {
        let page_state = state.page_mut(page)?;
        page_state.lookups += 1;
        let lookups = page_state.lookups;
        let view = self.view(&page_state.view)?;

        Ok(view
            .elements
            .iter()
            .filter(|e| e.mounts_after < lookups && e.matches(locator))
            .cloned()
            .collect())
    }

    fn target(
        &self,
        state: &mut State,
        page: PageId,
        locator: &Locator,
        nth: usize,
        timeout_ms: u64,
    ) -> E2eResult<MockElement> {
        let element = self
            .find(state, page, locator)?
            .into_iter()
            .nth(nth)
            .ok_or_else(|| E2eError::Timeout {
                what: format!("{} to be attached", locator),
                timeout_ms,
            })?;

        if !element.visible || !element.enabled {
            return Err(E2eError::Timeout {
                what: format!("{} to be visible and enabled", locator),
                timeout_ms,
            });
        }
        Ok(element)
    }

    /// Whether the element a click would land on is the configured hang trigger
    fn hangs_on(&self, page: PageId, locator: &Locator, nth: usize) -> bool {
        let trigger = match &self.faults.hang_on_click {
            Some(trigger) => trigger,
            None => return false,
        };
        let mut state = self.state.lock();
        self.find(&mut state, page, locator)
            .ok()
            .and_then(|found| found.into_iter().nth(nth))
            .map_or(false, |e| e.path == *trigger || e.text == *trigger)
    }

    fn submit(
        &self,
        state: &mut State,
        page: PageId,
        ok: &str,
        invalid: Option<&str>,
    ) -> E2eResult<Option<String>> {
        let page_state = state.page(page)?;
        let view = self.view(&page_state.view)?;
        let complete = view
            .elements
            .iter()
            .filter(|e| e.input && e.required)
            .all(|e| page_state.values.get(&e.path).map_or(false, |v| !v.trim().is_empty()));

        Ok(if complete {
            Some(ok.to_string())
        } else {
            invalid.map(str::to_string)
        })
    }
}

#[async_trait]
impl BrowserDriver for MockBrowser {
    async fn launch(&self, options: &LaunchOptions) -> E2eResult<BrowserId> {
        if self.faults.fail_launch {
            return Err(E2eError::Launch("chromium exited during startup".to_string()));
        }
        let mut state = self.state.lock();
        let id = state.id();
        state.running.insert(id, true);
        state.launches += 1;
        state.log.push(format!("launch:{}", options.args.join(" ")));
        Ok(BrowserId(id))
    }

    async fn new_context(
        &self,
        browser: BrowserId,
        _default_timeout_ms: u64,
    ) -> E2eResult<ContextId> {
        if self.faults.fail_context {
            return Err(E2eError::Driver("target closed".to_string()));
        }
        let mut state = self.state.lock();
        if state.running.get(&browser.0) != Some(&true) {
            return Err(E2eError::UnknownHandle(browser.to_string()));
        }
        let id = state.id();
        state.contexts.insert(id, ContextState { browser: browser.0, pages: Vec::new() });
        Ok(ContextId(id))
    }

    async fn new_page(&self, context: ContextId) -> E2eResult<PageId> {
        if self.faults.panic_on_acquire {
            panic!("injected fault opening a page in {}", context);
        }
        if self.faults.fail_page {
            return Err(E2eError::Driver("page crashed".to_string()));
        }
        let mut state = self.state.lock();
        if !state.contexts.contains_key(&context.0) {
            return Err(E2eError::UnknownHandle(context.to_string()));
        }
        let id = state.open_page(&self.app, context.0, "about:blank".to_string());
        Ok(PageId(id))
    }

    async fn pages(&self, context: ContextId) -> E2eResult<Vec<PageId>> {
        let state = self.state.lock();
        let ctx = state
            .contexts
            .get(&context.0)
            .ok_or_else(|| E2eError::UnknownHandle(context.to_string()))?;
        Ok(ctx.pages.iter().copied().map(PageId).collect())
    }

    async fn frames(&self, page: PageId) -> E2eResult<Vec<FrameId>> {
        let state = self.state.lock();
        Ok(state.page(page)?.frames.iter().copied().map(FrameId).collect())
    }

    async fn goto(
        &self,
        page: PageId,
        url: &str,
        _wait_until: WaitUntil,
        timeout_ms: u64,
    ) -> E2eResult<()> {
        let mut state = self.state.lock();
        state.page(page)?;
        state.log.push(format!("goto:{}", url));
        if self.faults.unreachable {
            return Err(E2eError::Driver(format!(
                "net::ERR_CONNECTION_REFUSED at {} (timeout {} ms)",
                url, timeout_ms
            )));
        }
        let view = self.app.view_for_url(url);
        state.render(&self.app, page.0, view);
        Ok(())
    }

    async fn wait_for_dom_ready(&self, frame: FrameId, timeout_ms: u64) -> E2eResult<()> {
        let state = self.state.lock();
        if !state.frames.contains_key(&frame.0) {
            return Err(E2eError::UnknownHandle(frame.to_string()));
        }
        if self.faults.never_ready {
            return Err(E2eError::Timeout {
                what: format!("{} domcontentloaded", frame),
                timeout_ms,
            });
        }
        Ok(())
    }

    async fn count(&self, page: PageId, locator: &Locator) -> E2eResult<usize> {
        let mut state = self.state.lock();
        Ok(self.find(&mut state, page, locator)?.len())
    }

    async fn element_state(
        &self,
        page: PageId,
        locator: &Locator,
        nth: usize,
    ) -> E2eResult<ElementState> {
        let mut state = self.state.lock();
        state.state_reads += 1;
        if state.state_reads <= self.faults.element_state_errors {
            return Err(E2eError::Driver("Element is not attached to the DOM".to_string()));
        }
        Ok(self
            .find(&mut state, page, locator)?
            .get(nth)
            .map(|e| ElementState {
                attached: true,
                visible: e.visible,
                enabled: e.enabled,
            })
            .unwrap_or_default())
    }

    async fn fill(
        &self,
        page: PageId,
        locator: &Locator,
        nth: usize,
        text: &str,
        timeout_ms: u64,
    ) -> E2eResult<()> {
        let mut state = self.state.lock();
        let element = self.target(&mut state, page, locator, nth, timeout_ms)?;
        if !element.input {
            return Err(E2eError::Driver(format!("{} is not an input", element.path)));
        }
        state.page_mut(page)?.values.insert(element.path.clone(), text.to_string());
        state.log.push(format!("fill:{}={}", element.path, text));
        Ok(())
    }

    async fn click(
        &self,
        page: PageId,
        locator: &Locator,
        nth: usize,
        timeout_ms: u64,
    ) -> E2eResult<()> {
        if self.hangs_on(page, locator, nth) {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock();
        let element = self.target(&mut state, page, locator, nth, timeout_ms)?;

        if let Some(trigger) = &self.faults.panic_on_click {
            if *trigger == element.path || *trigger == element.text {
                drop(state);
                panic!("injected fault clicking {}", trigger);
            }
        }

        state.log.push(format!("click:{}", element.path));

        let page_state = state.page_mut(page)?;
        let clicks = page_state.clicks.entry(element.path.clone()).or_insert(0);
        *clicks += 1;
        if *clicks <= element.ignored_clicks {
            return Ok(());
        }

        match &element.on_click {
            Some(ClickEffect::Navigate(view)) => state.render(&self.app, page.0, view.clone()),
            Some(ClickEffect::Popup(view)) => {
                let context = state.page(page)?.context;
                state.open_page(&self.app, context, view.clone());
            }
            Some(ClickEffect::Submit { ok, invalid }) => {
                if let Some(next) = self.submit(&mut state, page, ok, invalid.as_deref())? {
                    state.render(&self.app, page.0, next);
                }
            }
            None => {}
        }
        Ok(())
    }

    async fn press(
        &self,
        page: PageId,
        locator: &Locator,
        nth: usize,
        key: &str,
        timeout_ms: u64,
    ) -> E2eResult<()> {
        let mut state = self.state.lock();
        let element = self.target(&mut state, page, locator, nth, timeout_ms)?;
        state.log.push(format!("press:{}:{}", element.path, key));
        Ok(())
    }

    async fn select_option(
        &self,
        page: PageId,
        locator: &Locator,
        nth: usize,
        value: &str,
        timeout_ms: u64,
    ) -> E2eResult<()> {
        let mut state = self.state.lock();
        let element = self.target(&mut state, page, locator, nth, timeout_ms)?;
        state.page_mut(page)?.values.insert(element.path.clone(), value.to_string());
        state.log.push(format!("select:{}={}", element.path, value));
        Ok(())
    }

    async fn scroll(&self, page: PageId, delta_x: f64, delta_y: f64) -> E2eResult<()> {
        let mut state = self.state.lock();
        state.page(page)?;
        state.log.push(format!("scroll:{},{}", delta_x, delta_y));
        Ok(())
    }

    async fn close_context(&self, context: ContextId) -> E2eResult<()> {
        if self.faults.fail_close_context {
            return Err(E2eError::Driver("context close rejected".to_string()));
        }
        self.state.lock().close_context(context.0);
        Ok(())
    }

    async fn close_browser(&self, browser: BrowserId) -> E2eResult<()> {
        let mut state = self.state.lock();
        let owned: Vec<u64> = state
            .contexts
            .iter()
            .filter(|(_, ctx)| ctx.browser == browser.0)
            .map(|(id, _)| *id)
            .collect();
        for context in owned {
            state.close_context(context);
        }
        match state.running.get_mut(&browser.0) {
            Some(running) => {
                *running = false;
                state.log.push("close_browser".to_string());
                Ok(())
            }
            None => Err(E2eError::UnknownHandle(browser.to_string())),
        }
    }

    async fn is_running(&self, browser: BrowserId) -> bool {
        self.state.lock().running.get(&browser.0) == Some(&true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open(browser: &MockBrowser) -> (ContextId, PageId) {
        let options = LaunchOptions { headless: true, args: vec![] };
        let id = browser.launch(&options).await.unwrap();
        let context = browser.new_context(id, 5000).await.unwrap();
        let page = browser.new_page(context).await.unwrap();
        browser.goto(page, "http://localhost:5173/", WaitUntil::Commit, 1000).await.unwrap();
        (context, page)
    }

    #[tokio::test]
    async fn login_submit_requires_inputs() {
        let browser = MockBrowser::new(MockApp::rental_admin());
        let (_, page) = open(&browser).await;
        let button = Locator::role("button", "Iniciar Sesión");

        browser.click(page, &button, 0, 100).await.unwrap();
        assert_eq!(browser.current_view().as_deref(), Some("login"));

        let user = Locator::XPath("html/body/div/div/div/div/div/form/div/div/input".into());
        let pass = Locator::XPath("/html/body/div/div/div/div/div/form/div[2]/div/input".into());
        browser.fill(page, &user, 0, "admin", 100).await.unwrap();
        browser.fill(page, &pass, 0, "admin123", 100).await.unwrap();
        browser.click(page, &button, 0, 100).await.unwrap();
        assert_eq!(browser.current_view().as_deref(), Some("dashboard"));
    }

    #[tokio::test]
    async fn navigation_replaces_frames() {
        let app = MockApp::new("home")
            .view_with_frames(
                "home",
                vec![MockElement::text("a", "Next").on_click(ClickEffect::Navigate("next".into()))],
                2,
            )
            .view("next", vec![]);
        let browser = MockBrowser::new(app);
        let (_, page) = open(&browser).await;

        let before = browser.frames(page).await.unwrap();
        assert_eq!(before.len(), 3);

        browser.click(page, &Locator::text("Next"), 0, 100).await.unwrap();
        let after = browser.frames(page).await.unwrap();
        assert_eq!(after.len(), 1);
        assert!(browser.wait_for_dom_ready(before[0], 100).await.is_err());
    }

    #[tokio::test]
    async fn late_mount_and_ignored_clicks() {
        let app = MockApp::new("home")
            .view(
                "home",
                vec![MockElement::text("b", "Agregar")
                    .mounts_after(2)
                    .ignores_first_clicks(1)
                    .on_click(ClickEffect::Navigate("form".into()))],
            )
            .view("form", vec![]);
        let browser = MockBrowser::new(app);
        let (_, page) = open(&browser).await;
        let add = Locator::text("Agregar");

        assert_eq!(browser.count(page, &add).await.unwrap(), 0);
        assert_eq!(browser.count(page, &add).await.unwrap(), 0);
        assert_eq!(browser.count(page, &add).await.unwrap(), 1);

        browser.click(page, &add, 0, 100).await.unwrap();
        assert_eq!(browser.current_view().as_deref(), Some("home"));
        browser.click(page, &add, 0, 100).await.unwrap();
        assert_eq!(browser.current_view().as_deref(), Some("form"));
    }

    #[tokio::test]
    async fn closing_browser_closes_contexts() {
        let browser = MockBrowser::new(MockApp::rental_admin());
        let (context, _) = open(&browser).await;
        assert_eq!(browser.live_browsers(), 1);

        browser.close_browser(BrowserId(1)).await.unwrap();
        assert_eq!(browser.live_browsers(), 0);
        assert!(browser.pages(context).await.is_err());
    }
}
