pub mod wait;
pub mod webdriver;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// How an element is located on the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    XPath(String),
    Css(String),
}

impl Locator {
    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::XPath(expr.into())
    }

    pub fn css(expr: impl Into<String>) -> Self {
        Locator::Css(expr.into())
    }

    pub fn strategy(&self) -> &'static str {
        match self {
            Locator::XPath(_) => "xpath",
            Locator::Css(_) => "css selector",
        }
    }

    pub fn expr(&self) -> &str {
        match self {
            Locator::XPath(e) | Locator::Css(e) => e,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} `{}`", self.strategy(), self.expr())
    }
}

/// Opaque handle to an element in the active browser context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Element(pub String);

/// Identity of a browser context (window or tab).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextId(pub String);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("no such element")]
    NoSuchElement,
    #[error("stale element reference")]
    StaleElement,
    #[error("no such browser context")]
    NoSuchContext,
    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout { waited: Duration, what: String },
    #[error("expected one new browser context, found {0}")]
    AmbiguousContext(usize),
    #[error("webdriver error `{error}`: {message}")]
    Protocol { error: String, message: String },
    #[error("webdriver transport error: {0}")]
    Http(#[from] reqwest::Error),
}

impl DriverError {
    /// Errors that a polling wait should treat as "not yet".
    pub fn is_transient(&self) -> bool {
        matches!(self, DriverError::NoSuchElement | DriverError::StaleElement)
    }
}

/// The browser session every stage works through.
///
/// A single session is shared by the whole run and handed to each stage
/// explicitly. `find` and `find_within` report a missing element as `Ok(None)`.
#[async_trait]
pub trait PageDriver: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    async fn find(&mut self, locator: &Locator) -> Result<Option<Element>, DriverError>;

    async fn find_all(&mut self, locator: &Locator) -> Result<Vec<Element>, DriverError>;

    async fn find_within(
        &mut self,
        parent: &Element,
        locator: &Locator,
    ) -> Result<Option<Element>, DriverError>;

    async fn click(&mut self, element: &Element) -> Result<(), DriverError>;

    async fn clear(&mut self, element: &Element) -> Result<(), DriverError>;

    async fn type_text(&mut self, element: &Element, text: &str) -> Result<(), DriverError>;

    async fn text(&mut self, element: &Element) -> Result<String, DriverError>;

    async fn attribute(
        &mut self,
        element: &Element,
        name: &str,
    ) -> Result<Option<String>, DriverError>;

    /// Displayed and enabled.
    async fn is_clickable(&mut self, element: &Element) -> Result<bool, DriverError>;

    async fn page_source(&mut self) -> Result<String, DriverError>;

    async fn current_context(&mut self) -> Result<ContextId, DriverError>;

    async fn contexts(&mut self) -> Result<Vec<ContextId>, DriverError>;

    async fn switch_to(&mut self, context: &ContextId) -> Result<(), DriverError>;

    /// Close the active context. Focus must be switched explicitly afterwards.
    async fn close_context(&mut self) -> Result<(), DriverError>;

    async fn quit(&mut self) -> Result<(), DriverError>;
}
