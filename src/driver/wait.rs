use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};

use super::{ContextId, DriverError, Element, Locator, PageDriver};

/// Poll interval schedule: doubles after every miss, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Backoff {
    fn next(&self, current: Duration) -> Duration {
        (current * 2).min(self.max)
    }
}

/// Timeouts for every kind of wait the stages perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waits {
    pub element: Duration,
    pub results: Duration,
    pub page: Duration,
    pub context: Duration,
    pub login: Duration,
    pub backoff: Backoff,
}

impl Default for Waits {
    fn default() -> Self {
        Waits {
            element: Duration::from_secs(10),
            results: Duration::from_secs(10),
            page: Duration::from_secs(10),
            context: Duration::from_secs(10),
            login: Duration::from_secs(300),
            backoff: Backoff {
                initial: Duration::from_millis(200),
                max: Duration::from_secs(2),
            },
        }
    }
}

/// Something a wait can poll for.
#[async_trait]
pub trait Condition: Send {
    type Output: Send;

    fn describe(&self) -> String;

    /// `Ok(None)` means "not yet".
    async fn check<D: PageDriver + ?Sized>(
        &mut self,
        driver: &mut D,
    ) -> Result<Option<Self::Output>, DriverError>;
}

/// A single element exists.
pub struct Present<'a>(pub &'a Locator);

/// A single element exists and can be clicked.
pub struct Clickable<'a>(pub &'a Locator);

/// What a list of rows shows: how many there are and the content of the
/// first and last one.
///
/// Pages may re-render rows in place and keep their element references, so
/// only content tells an old listing from a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowsSnapshot {
    count: usize,
    edges: Vec<(String, Option<String>)>,
}

impl RowsSnapshot {
    pub async fn take<D: PageDriver + ?Sized>(
        driver: &mut D,
        rows: &[Element],
    ) -> Result<Self, DriverError> {
        let mut edges = Vec::new();
        let ends = match rows {
            [] => vec![],
            [only] => vec![only],
            [first, .., last] => vec![first, last],
        };
        for row in ends {
            let text = driver.text(row).await?;
            let href = driver.attribute(row, "href").await?;
            edges.push((text, href));
        }
        Ok(RowsSnapshot {
            count: rows.len(),
            edges,
        })
    }

    pub async fn of<D: PageDriver + ?Sized>(
        driver: &mut D,
        locator: &Locator,
    ) -> Result<Self, DriverError> {
        let rows = driver.find_all(locator).await?;
        RowsSnapshot::take(driver, &rows).await
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// The rows matching `locator` differ from `previous` and look the same on
/// two consecutive polls.
///
/// An empty listing only counts when built with [`Refreshed::allow_empty`].
pub struct Refreshed<'a> {
    locator: &'a Locator,
    previous: &'a RowsSnapshot,
    allow_empty: bool,
    last: Option<RowsSnapshot>,
}

impl<'a> Refreshed<'a> {
    pub fn new(locator: &'a Locator, previous: &'a RowsSnapshot) -> Self {
        Refreshed {
            locator,
            previous,
            allow_empty: false,
            last: None,
        }
    }

    pub fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }
}

/// Exactly one context exists that is not in `before`.
pub struct NewContext<'a> {
    pub before: &'a [ContextId],
}

#[async_trait]
impl Condition for Present<'_> {
    type Output = Element;

    fn describe(&self) -> String {
        format!("presence of {}", self.0)
    }

    async fn check<D: PageDriver + ?Sized>(
        &mut self,
        driver: &mut D,
    ) -> Result<Option<Element>, DriverError> {
        driver.find(self.0).await
    }
}

#[async_trait]
impl Condition for Clickable<'_> {
    type Output = Element;

    fn describe(&self) -> String {
        format!("clickable {}", self.0)
    }

    async fn check<D: PageDriver + ?Sized>(
        &mut self,
        driver: &mut D,
    ) -> Result<Option<Element>, DriverError> {
        match driver.find(self.0).await? {
            Some(el) if driver.is_clickable(&el).await? => Ok(Some(el)),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl Condition for Refreshed<'_> {
    type Output = Vec<Element>;

    fn describe(&self) -> String {
        format!("fresh rows for {}", self.locator)
    }

    async fn check<D: PageDriver + ?Sized>(
        &mut self,
        driver: &mut D,
    ) -> Result<Option<Vec<Element>>, DriverError> {
        let rows = driver.find_all(self.locator).await?;
        let now = RowsSnapshot::take(driver, &rows).await?;

        if now == *self.previous || (now.is_empty() && !self.allow_empty) {
            self.last = None;
            return Ok(None);
        }
        if self.last.as_ref() == Some(&now) {
            return Ok(Some(rows));
        }
        self.last = Some(now);
        Ok(None)
    }
}

#[async_trait]
impl Condition for NewContext<'_> {
    type Output = ContextId;

    fn describe(&self) -> String {
        "a new browser context".to_string()
    }

    async fn check<D: PageDriver + ?Sized>(
        &mut self,
        driver: &mut D,
    ) -> Result<Option<ContextId>, DriverError> {
        let mut fresh: Vec<ContextId> = driver
            .contexts()
            .await?
            .into_iter()
            .filter(|c| !self.before.contains(c))
            .collect();
        match fresh.len() {
            0 => Ok(None),
            1 => Ok(fresh.pop()),
            n => Err(DriverError::AmbiguousContext(n)),
        }
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
///
/// Missing and stale elements count as "not yet"; any other driver error ends
/// the wait immediately.
pub async fn wait_until<D, C>(
    driver: &mut D,
    mut condition: C,
    timeout: Duration,
    backoff: Backoff,
) -> Result<C::Output, DriverError>
where
    D: PageDriver + ?Sized,
    C: Condition,
{
    let deadline = Instant::now() + timeout;
    let mut interval = backoff.initial;
    loop {
        match condition.check(driver).await {
            Ok(Some(done)) => return Ok(done),
            Ok(None) => {}
            Err(e) if e.is_transient() => {}
            Err(e) => return Err(e),
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(DriverError::Timeout {
                waited: timeout,
                what: condition.describe(),
            });
        }
        sleep(interval.min(deadline - now)).await;
        interval = backoff.next(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let b = Backoff {
            initial: Duration::from_millis(200),
            max: Duration::from_millis(500),
        };
        let second = b.next(b.initial);
        assert_eq!(second, Duration::from_millis(400));
        assert_eq!(b.next(second), Duration::from_millis(500));
    }

    #[test]
    fn default_waits_match_portal_timeouts() {
        let w = Waits::default();
        assert_eq!(w.element, Duration::from_secs(10));
        assert!(w.login > w.element);
    }
}
