//! Locator language
//!
//! A locator is written the way Playwright selectors are written:
//!
//! | Form                          | Meaning                                   |
//! |-------------------------------|-------------------------------------------|
//! | `xpath=html/body/div/form`    | structural path (also bare `html/...`, `/...`) |
//! | `text=Guardar`                | visible text, case-insensitive substring  |
//! | `text="Guardar"`              | visible text, exact                       |
//! | `role=button[name="Guardar"]` | ARIA role plus accessible name            |
//! | `testid=tenant-form`          | `data-testid` attribute                   |
//! | `css=form > button`, `button` | CSS selector                              |
//!
//! Steps carry a [`LocatorSet`]: an ordered list of candidates where the first
//! one with at least one match wins. Structural paths belong at the end of the
//! list, after the semantic candidates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};

/// A single rule for finding candidate elements in a frame
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Locator {
    XPath(String),
    Css(String),
    Text { text: String, exact: bool },
    Role { role: String, name: Option<String> },
    TestId(String),
}

impl Locator {
    pub fn parse(raw: &str) -> E2eResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(E2eError::InvalidLocator("empty locator".to_string()));
        }

        let (engine, body) = match raw.split_once('=') {
            Some((engine, body)) if is_engine(engine) => (engine, body.trim()),
            _ => ("", raw),
        };

        if body.is_empty() {
            return Err(E2eError::InvalidLocator(format!("'{}' has an empty body", raw)));
        }

        let locator = match engine {
            "xpath" => Locator::XPath(body.to_string()),
            "css" => Locator::Css(body.to_string()),
            "text" => match unquote(body) {
                Some(inner) => Locator::Text { text: inner.to_string(), exact: true },
                None => Locator::Text { text: body.to_string(), exact: false },
            },
            "testid" => Locator::TestId(unquote(body).unwrap_or(body).to_string()),
            "role" => parse_role(body)?,
            _ if looks_like_xpath(body) => Locator::XPath(body.to_string()),
            _ => Locator::Css(body.to_string()),
        };

        Ok(locator)
    }

    /// Contains-match on visible text
    pub fn text(text: impl Into<String>) -> Self {
        Locator::Text { text: text.into(), exact: false }
    }

    /// Exact match on visible text
    pub fn exact_text(text: impl Into<String>) -> Self {
        Locator::Text { text: text.into(), exact: true }
    }

    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Locator::Role { role: role.into(), name: Some(name.into()) }
    }

    /// Positional locators break whenever the rendered tree reflows.
    pub fn is_structural(&self) -> bool {
        matches!(self, Locator::XPath(_))
    }

    /// Selector string understood by Playwright's `page.locator()`
    pub fn to_playwright(&self) -> String {
        match self {
            Locator::XPath(path) => format!("xpath={}", path),
            Locator::Css(css) => format!("css={}", css),
            Locator::Text { text, exact: true } => format!("text=\"{}\"", escape_quotes(text)),
            Locator::Text { text, exact: false } => format!("text={}", text),
            Locator::Role { role, name: Some(name) } => {
                format!("role={}[name=\"{}\"]", role, escape_quotes(name))
            }
            Locator::Role { role, name: None } => format!("role={}", role),
            Locator::TestId(id) => format!("[data-testid=\"{}\"]", escape_quotes(id)),
        }
    }
}

fn is_engine(prefix: &str) -> bool {
    matches!(prefix, "xpath" | "css" | "text" | "role" | "testid")
}

fn looks_like_xpath(body: &str) -> bool {
    ["/", "html/", "(//", ".."].iter().any(|prefix| body.starts_with(prefix))
}

fn unquote(body: &str) -> Option<&str> {
    body.strip_prefix('"').and_then(|b| b.strip_suffix('"'))
}

fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn parse_role(body: &str) -> E2eResult<Locator> {
    let Some((role, rest)) = body.split_once('[') else {
        return Ok(Locator::Role { role: body.to_string(), name: None });
    };

    let invalid = |what: &str| E2eError::InvalidLocator(format!("{}: '{}'", what, body));
    let attr = rest
        .strip_suffix(']')
        .ok_or_else(|| invalid("unterminated role filter"))?;
    let value = attr
        .trim()
        .strip_prefix("name=")
        .ok_or_else(|| invalid("role filter must be name=\"...\""))?;
    let name = unquote(value.trim()).unwrap_or(value.trim());

    Ok(Locator::Role {
        role: role.trim().to_string(),
        name: Some(name.to_string()),
    })
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::XPath(path) => write!(f, "xpath={}", path),
            Locator::Css(css) => write!(f, "css={}", css),
            Locator::Text { text, exact: true } => write!(f, "text=\"{}\"", text),
            Locator::Text { text, exact: false } => write!(f, "text={}", text),
            Locator::Role { role, name: Some(name) } => {
                write!(f, "role={}[name=\"{}\"]", role, name)
            }
            Locator::Role { role, name: None } => write!(f, "role={}", role),
            Locator::TestId(id) => write!(f, "testid={}", id),
        }
    }
}

impl TryFrom<String> for Locator {
    type Error = E2eError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Locator::parse(&value)
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.to_string()
    }
}

/// Ordered fallback candidates for one step target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "LocatorSetRepr", into = "Vec<Locator>")]
pub struct LocatorSet {
    candidates: Vec<Locator>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LocatorSetRepr {
    One(Locator),
    Many(Vec<Locator>),
}

impl From<LocatorSetRepr> for LocatorSet {
    fn from(repr: LocatorSetRepr) -> Self {
        match repr {
            LocatorSetRepr::One(locator) => LocatorSet { candidates: vec![locator] },
            LocatorSetRepr::Many(candidates) => LocatorSet { candidates },
        }
    }
}

impl From<LocatorSet> for Vec<Locator> {
    fn from(set: LocatorSet) -> Self {
        set.candidates
    }
}

impl From<Locator> for LocatorSet {
    fn from(locator: Locator) -> Self {
        LocatorSet { candidates: vec![locator] }
    }
}

impl LocatorSet {
    pub fn new(candidates: Vec<Locator>) -> Self {
        Self { candidates }
    }

    pub fn parse(raw: &str) -> E2eResult<Self> {
        Ok(Locator::parse(raw)?.into())
    }

    pub fn candidates(&self) -> &[Locator] {
        &self.candidates
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// The candidate shown in logs and step names
    pub fn primary(&self) -> Option<&Locator> {
        self.candidates.first()
    }
}

impl fmt::Display for LocatorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.candidates.as_slice() {
            [] => write!(f, "<none>"),
            [only] => write!(f, "{}", only),
            [first, rest @ ..] => write!(f, "{} (+{} fallback)", first, rest.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(
        "xpath=html/body/div/form/button",
        Locator::XPath("html/body/div/form/button".into())
        ; "prefixed xpath"
    )]
    #[test_case(
        "html/body/div[2]/div[3]",
        Locator::XPath("html/body/div[2]/div[3]".into())
        ; "bare structural path"
    )]
    #[test_case("//button", Locator::XPath("//button".into()) ; "descendant xpath")]
    #[test_case("text=Agregar Inquilino", Locator::text("Agregar Inquilino") ; "text contains")]
    #[test_case("text=\"Guardar\"", Locator::exact_text("Guardar") ; "text exact")]
    #[test_case(
        "role=button[name=\"Iniciar Sesión\"]",
        Locator::role("button", "Iniciar Sesión")
        ; "role with name"
    )]
    #[test_case("role=dialog", Locator::Role { role: "dialog".into(), name: None } ; "bare role")]
    #[test_case("testid=tenant-form", Locator::TestId("tenant-form".into()) ; "test id")]
    #[test_case("form > button", Locator::Css("form > button".into()) ; "bare css")]
    fn parses_locator_forms(raw: &str, expected: Locator) {
        assert_eq!(Locator::parse(raw).unwrap(), expected);
    }

    #[test]
    fn rejects_malformed_locators() {
        assert!(Locator::parse("   ").is_err());
        assert!(Locator::parse("xpath=").is_err());
        assert!(Locator::parse("role=button[name=\"Save\"").is_err());
        assert!(Locator::parse("role=button[label=\"Save\"]").is_err());
    }

    #[test]
    fn css_with_attribute_equals_stays_css() {
        let locator = Locator::parse("input[name=firstName]").unwrap();
        assert_eq!(locator, Locator::Css("input[name=firstName]".into()));
    }

    #[test]
    fn playwright_selector_strings() {
        assert_eq!(Locator::exact_text("Pagos").to_playwright(), "text=\"Pagos\"");
        assert_eq!(
            Locator::role("button", "Agregar Pago").to_playwright(),
            "role=button[name=\"Agregar Pago\"]"
        );
        assert_eq!(Locator::TestId("login".into()).to_playwright(), "[data-testid=\"login\"]");
    }

    #[test]
    fn locator_set_accepts_single_or_list() {
        let one: LocatorSet = serde_yaml::from_str("'text=Pagos'").unwrap();
        assert_eq!(one.candidates().len(), 1);

        let many: LocatorSet = serde_yaml::from_str(
            "- role=button[name=\"Pagos\"]\n- xpath=html/body/div/div/div/div/div[2]/div[3]/div\n",
        )
        .unwrap();
        assert_eq!(many.candidates().len(), 2);
        assert!(many.candidates()[1].is_structural());
        assert_eq!(many.to_string(), "role=button[name=\"Pagos\"] (+1 fallback)");
    }
}
