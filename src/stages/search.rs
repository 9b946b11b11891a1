use tracing::{debug, warn};

use super::CandidateLink;
use crate::driver::wait::{wait_until, Clickable, Present, Refreshed, RowsSnapshot, Waits};
use crate::driver::{DriverError, Element, PageDriver};
use crate::portal::SearchSelectors;

/// Submit `token` through the search form and collect result links.
///
/// Never fails: a broken or missing form, or any driver error, is logged and
/// yields no candidates so the batch can move on.
pub async fn search<D: PageDriver + ?Sized>(
    driver: &mut D,
    selectors: &SearchSelectors,
    waits: &Waits,
    token: &str,
) -> Vec<CandidateLink> {
    match try_search(driver, selectors, waits, token).await {
        Ok(links) => {
            debug!("Search '{}' returned {} candidates", token, links.len());
            links
        }
        Err(e) => {
            warn!("Error searching keyword '{}': {}", token, e);
            Vec::new()
        }
    }
}

async fn try_search<D: PageDriver + ?Sized>(
    driver: &mut D,
    sel: &SearchSelectors,
    waits: &Waits,
    token: &str,
) -> Result<Vec<CandidateLink>, DriverError> {
    let input = wait_until(driver, Present(&sel.input), waits.element, waits.backoff).await?;
    let submit = wait_until(driver, Clickable(&sel.submit), waits.element, waits.backoff).await?;

    // Rows already on the page (default listings) must not be taken for results.
    let previous = RowsSnapshot::of(driver, &sel.results).await?;

    driver.clear(&input).await?;
    driver.type_text(&input, token).await?;
    driver.click(&submit).await?;

    let refreshed = Refreshed::new(&sel.results, &previous);
    let rows = match wait_until(driver, refreshed, waits.results, waits.backoff).await {
        Ok(rows) => rows,
        Err(DriverError::Timeout { .. }) => {
            debug!("Results for '{}' never changed, reading what is shown", token);
            driver.find_all(&sel.results).await?
        }
        Err(e) => return Err(e),
    };

    collect_links(driver, sel, rows).await
}

async fn collect_links<D: PageDriver + ?Sized>(
    driver: &mut D,
    sel: &SearchSelectors,
    rows: Vec<Element>,
) -> Result<Vec<CandidateLink>, DriverError> {
    let mut links = Vec::new();
    for row in rows {
        if sel.max_candidates.is_some_and(|max| links.len() >= max) {
            break;
        }

        if let Some(marker) = &sel.marker {
            let Some(cell) = driver.find_within(&row, &marker.locator).await? else {
                continue;
            };
            if driver.text(&cell).await?.trim() != marker.text {
                continue;
            }
        }

        let anchor = match &sel.link_within {
            Some(locator) => match driver.find_within(&row, locator).await? {
                Some(a) => a,
                None => continue,
            },
            None => row,
        };

        match driver.attribute(&anchor, "href").await? {
            Some(href) if !href.trim().is_empty() => links.push(href),
            _ => {}
        }
    }
    Ok(links)
}
