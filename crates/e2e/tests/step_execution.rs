//! Step execution against the scripted browser
//!
//! A failing step never stops the sequence, every step acts on the document
//! that is current when it starts, and retries replay known-good prefixes.

mod common;

use flowcheck_e2e::flow::{Action, ReadyWhen, Step};
use flowcheck_e2e::locator::{Locator, LocatorSet};
use flowcheck_e2e::mock::{ClickEffect, Faults, MockApp, MockBrowser, MockElement};
use flowcheck_e2e::run_session;

use common::{click, fast_config, fill, flow, login_steps, target};

const AGREGAR: &str = "html/body/div/div/div/div/button";

fn count_clicks(browser: &MockBrowser, path: &str) -> usize {
    let wanted = format!("click:{}", path);
    browser.actions().iter().filter(|a| **a == wanted).count()
}

/// Rental admin whose "Agregar Inquilino" swallows its first `ignored` clicks
fn flaky_tenants_app(ignored: u32) -> MockApp {
    MockApp::rental_admin().view(
        "tenants",
        vec![
            MockElement::text("html/body/div/div/div/h4", "Inquilinos").test_id("tenants-page"),
            MockElement::button(AGREGAR, "Agregar Inquilino")
                .ignores_first_clicks(ignored)
                .on_click(ClickEffect::Navigate("tenant-dialog".to_string())),
        ],
    )
}

fn tenant_steps(attempts: u32) -> Vec<Step> {
    let mut steps = login_steps();
    steps.extend([
        click("text=\"Inquilinos\"").navigating(),
        Step::new(Action::Checkpoint { name: "tenant-list".to_string() }),
        click("role=button[name=\"Agregar Inquilino\"]").ready(ReadyWhen::Enabled),
        Step::new(Action::RetryFrom {
            checkpoint: "tenant-list".to_string(),
            until: target("testid=tenant-form"),
            attempts,
        })
        .timeout(50),
        fill("role=textbox[name=\"Nombre\"]", "Carlos"),
        fill("role=textbox[name=\"Apellido\"]", "Ramirez"),
        click("role=button[name=\"Guardar\"]").navigating(),
    ]);
    steps
}

#[tokio::test]
async fn failed_step_does_not_stop_the_sequence() {
    let browser = MockBrowser::new(MockApp::rental_admin());
    let mut steps = vec![click("text=Este botón no existe")];
    steps.extend(login_steps());

    let report = run_session(&browser, &fast_config(), &flow("independent", steps, "Inquilinos"))
        .await
        .unwrap();

    assert!(!report.steps[0].success);
    assert!(report.steps[0].error.as_deref().unwrap().contains("No element matches"));
    assert!(report.steps[1..].iter().all(|s| s.success));
    assert_eq!(report.failed_steps(), 1);
    assert!(report.verdict.is_pass());
}

/// Steps after a popup act on the popup, steps after a navigation on the new
/// document
#[tokio::test]
async fn active_frame_follows_popups_and_navigation() {
    let app = MockApp::new("home")
        .view(
            "home",
            vec![MockElement::button("html/body/button", "Abrir")
                .on_click(ClickEffect::Popup("popup".into()))],
        )
        .view(
            "popup",
            vec![
                MockElement::input("html/body/form/input", "Comentario"),
                MockElement::button("html/body/form/button", "Enviar")
                    .on_click(ClickEffect::Navigate("sent".into())),
            ],
        )
        .view("sent", vec![MockElement::text("html/body/p", "Enviado")]);
    let browser = MockBrowser::new(app);

    let steps = vec![
        click("text=Abrir").navigating(),
        fill("role=textbox[name=\"Comentario\"]", "hola"),
        click("text=Enviar").navigating(),
    ];
    let report = run_session(&browser, &fast_config(), &flow("popup", steps, "Enviado"))
        .await
        .unwrap();

    assert!(report.steps.iter().all(|s| s.success), "{:?}", report.steps);
    assert!(browser.actions().contains(&"fill:html/body/form/input=hola".to_string()));
    assert!(report.verdict.is_pass());
}

#[tokio::test]
async fn structural_fallback_used_when_semantic_locator_misses() {
    let browser = MockBrowser::new(MockApp::rental_admin());
    let mut steps = login_steps();
    steps.pop();
    steps.push(
        Step::new(Action::Click {
            target: LocatorSet::new(vec![
                Locator::text("Ingresar"),
                Locator::XPath("/html/body/div/div/div/div/div/form/button".to_string()),
            ]),
        })
        .navigating(),
    );

    let report = run_session(&browser, &fast_config(), &flow("fallback", steps, "Inquilinos"))
        .await
        .unwrap();

    assert!(report.steps.iter().all(|s| s.success));
    assert_eq!(count_clicks(&browser, "html/body/div/div/div/div/div/form/button"), 1);
    assert!(report.verdict.is_pass());
}

/// A state read that fails once (element detached mid-render) is polled
/// again instead of failing the step
#[tokio::test]
async fn transient_state_read_error_is_polled_through() {
    let faults = Faults { element_state_errors: 1, ..Faults::default() };
    let browser = MockBrowser::with_faults(MockApp::rental_admin(), faults);
    let mut steps = login_steps();
    steps[0] = fill("role=textbox[name=\"Usuario\"]", "admin")
        .ready(ReadyWhen::Visible)
        .timeout(200);

    let report = run_session(&browser, &fast_config(), &flow("detached", steps, "Inquilinos"))
        .await
        .unwrap();

    assert!(report.steps[0].success, "{:?}", report.steps[0].error);
    assert_eq!(report.failed_steps(), 0);
    assert!(report.verdict.is_pass());
}

/// A target that mounts a few polls late is still found within the bound
#[tokio::test]
async fn late_mounting_target_is_awaited() {
    let app = MockApp::new("home")
        .view(
            "home",
            vec![MockElement::button("html/body/button", "Cargar")
                .mounts_after(5)
                .on_click(ClickEffect::Navigate("loaded".into()))],
        )
        .view("loaded", vec![MockElement::text("html/body/p", "Cargado")]);
    let browser = MockBrowser::new(app);

    let steps = vec![click("role=button[name=\"Cargar\"]")
        .ready(ReadyWhen::Visible)
        .navigating()];
    let report = run_session(&browser, &fast_config(), &flow("late", steps, "Cargado"))
        .await
        .unwrap();

    assert!(report.steps[0].success, "{:?}", report.steps[0].error);
    assert!(report.verdict.is_pass());
}

#[tokio::test]
async fn disabled_target_times_out_as_recoverable_failure() {
    let app = MockApp::new("home").view(
        "home",
        vec![
            MockElement::button("html/body/button", "Guardar").disabled(),
            MockElement::text("html/body/p", "Formulario"),
        ],
    );
    let browser = MockBrowser::new(app);

    let steps = vec![click("text=Guardar").ready(ReadyWhen::Enabled).timeout(30)];
    let report = run_session(&browser, &fast_config(), &flow("disabled", steps, "Formulario"))
        .await
        .unwrap();

    let error = report.steps[0].error.as_deref().unwrap();
    assert!(error.contains("to be enabled"), "{error}");
    assert!(report.verdict.is_pass());
}

/// The dialog opens on the second click, reached by replaying from the
/// checkpoint
#[tokio::test]
async fn retry_replays_from_checkpoint_until_marker_visible() {
    let browser = MockBrowser::new(flaky_tenants_app(1));
    let steps = tenant_steps(3);

    let retry = flow("retry", steps, "Tenant Creation Successful");

    let report = run_session(&browser, &fast_config(), &retry).await.unwrap();

    assert_eq!(count_clicks(&browser, AGREGAR), 2);
    let replays: Vec<_> = report.steps.iter().filter(|s| s.replay).collect();
    assert_eq!(replays.len(), 1);
    assert!(replays[0].step_name.starts_with("click:"));
    assert!(report.steps.iter().filter(|s| !s.replay).all(|s| s.success));
    assert!(report.verdict.is_pass());
}

#[tokio::test]
async fn exhausted_retry_is_recorded_and_verdict_fails() {
    let browser = MockBrowser::new(flaky_tenants_app(10));
    let steps = tenant_steps(2);

    let retry = flow("retry", steps, "Tenant Creation Successful");

    let report = run_session(&browser, &fast_config(), &retry).await.unwrap();

    assert_eq!(count_clicks(&browser, AGREGAR), 3);
    let retry = report
        .steps
        .iter()
        .find(|s| s.step_name == "retry_from:tenant-list")
        .unwrap();
    assert_eq!(retry.error.as_deref(), Some("testid=tenant-form not visible after 2 replay(s)"));
    assert_eq!(
        report.verdict.reason(),
        Some("Tenant Creation Successful not shown")
    );
}

#[tokio::test]
async fn retry_from_unknown_checkpoint_fails_that_step_only() {
    let browser = MockBrowser::new(MockApp::rental_admin());
    let mut steps = login_steps();
    steps.push(Step::new(Action::RetryFrom {
        checkpoint: "nowhere".to_string(),
        until: target("testid=tenant-form"),
        attempts: 1,
    }));

    let report = run_session(&browser, &fast_config(), &flow("unknown", steps, "Inquilinos"))
        .await
        .unwrap();

    assert_eq!(report.failed_steps(), 1);
    assert_eq!(
        report.steps.last().unwrap().error.as_deref(),
        Some("checkpoint 'nowhere' was not reached")
    );
    assert!(report.verdict.is_pass());
}

fn refresh_app() -> MockApp {
    MockApp::new("list").view(
        "list",
        vec![
            MockElement::button("html/body/header/button", "Refrescar")
                .on_click(ClickEffect::Navigate("list".into())),
            MockElement::text("html/body/main/h4", "Pagos"),
        ],
    )
}

#[tokio::test]
async fn repeat_navigation_replays_last_navigation_steps() {
    let browser = MockBrowser::new(refresh_app());
    let steps = vec![
        click("text=Refrescar").navigating(),
        Step::new(Action::RepeatNavigation { last: 1 }),
    ];

    let report = run_session(&browser, &fast_config(), &flow("repeat", steps, "Pagos"))
        .await
        .unwrap();

    assert_eq!(count_clicks(&browser, "html/body/header/button"), 2);
    assert_eq!(report.steps.iter().filter(|s| s.replay).count(), 1);
    assert_eq!(report.failed_steps(), 0);
    assert!(report.verdict.is_pass());
}

/// Only interactions count as navigation history; a flagged sleep is skipped
#[tokio::test]
async fn repeat_navigation_ignores_non_interaction_steps() {
    let browser = MockBrowser::new(refresh_app());
    let steps = vec![
        click("text=Refrescar").navigating(),
        Step::new(Action::Sleep { ms: 1 }).navigating(),
        Step::new(Action::RepeatNavigation { last: 1 }),
    ];

    let report = run_session(&browser, &fast_config(), &flow("repeat", steps, "Pagos"))
        .await
        .unwrap();

    assert_eq!(count_clicks(&browser, "html/body/header/button"), 2);
    let replayed: Vec<_> = report.steps.iter().filter(|s| s.replay).collect();
    assert_eq!(replayed.len(), 1);
    assert!(replayed[0].step_name.starts_with("click:"));
    assert_eq!(report.failed_steps(), 0);
}

#[tokio::test]
async fn repeat_navigation_reports_short_history() {
    let browser = MockBrowser::new(refresh_app());
    let steps = vec![
        click("text=Refrescar").navigating(),
        Step::new(Action::RepeatNavigation { last: 3 }),
    ];

    let report = run_session(&browser, &fast_config(), &flow("repeat", steps, "Pagos"))
        .await
        .unwrap();

    assert_eq!(count_clicks(&browser, "html/body/header/button"), 2);
    assert_eq!(
        report.steps.last().unwrap().error.as_deref(),
        Some("only 1 of 3 navigation steps available to repeat")
    );
}
