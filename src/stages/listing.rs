use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::driver::wait::{wait_until, Clickable, NewContext, Refreshed, RowsSnapshot, Waits};
use crate::driver::{ContextId, DriverError, PageDriver};
use crate::portal::ListingSelectors;
use crate::record::FundingRecord;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("invalid table selector `{0}`")]
    Selector(String),
    #[error("no element matches `{0}`")]
    MissingBody(String),
    #[error("results table has no header row")]
    MissingHeader,
    #[error("no `{column}` column among headers [{found}]")]
    MissingColumn { column: &'static str, found: String },
    #[error("row {row} has {found} cells, header has {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Error)]
enum ListingError {
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Header labels (lowercase, single-spaced) accepted for each listing column.
const COLUMNS: [(&str, &[&str]); 8] = [
    ("award_number", &["sub-award id", "subaward id"]),
    ("company_name", &["sub-recipient name", "sub-awardee name", "recipient name"]),
    ("amount", &["sub-award amount", "subaward amount"]),
    ("date", &["sub-award date", "subaward date", "action date"]),
    ("award_id", &["prime award id"]),
    ("recipient_name", &["prime recipient name"]),
    ("awarding_agency", &["awarding agency"]),
    ("awarding_sub_agency", &["awarding sub agency", "awarding subagency"]),
];

/// Open the award listing of the entity on the current page and scrape its
/// sub-award table.
///
/// The listing opens in a new context. Whatever happens, that context is
/// closed and focus returns to the context that was active on entry. Failures
/// are logged and yield an empty listing.
pub async fn get_related_listing<D: PageDriver + ?Sized>(
    driver: &mut D,
    selectors: &ListingSelectors,
    waits: &Waits,
    keyword: &str,
) -> Vec<FundingRecord> {
    let (origin, before) = match snapshot(driver).await {
        Ok(s) => s,
        Err(e) => {
            warn!("Error getting funding info for '{}': {}", keyword, e);
            return Vec::new();
        }
    };

    let mut opened = None;
    let result = traverse(driver, selectors, waits, keyword, &before, &mut opened).await;

    if let Some(ctx) = opened {
        if let Err(e) = close_and_return(driver, &ctx, &origin).await {
            error!("Could not return from listing context {}: {}", ctx, e);
        }
    }

    match result {
        Ok(records) => {
            info!("{} sub-award rows for '{}'", records.len(), keyword);
            records
        }
        Err(ListingError::Table(e)) => {
            error!("Sub-award table for '{}' has an unexpected shape: {}", keyword, e);
            Vec::new()
        }
        Err(ListingError::Driver(e)) => {
            warn!("Error getting funding info for '{}': {}", keyword, e);
            Vec::new()
        }
    }
}

async fn snapshot<D: PageDriver + ?Sized>(
    driver: &mut D,
) -> Result<(ContextId, Vec<ContextId>), DriverError> {
    let origin = driver.current_context().await?;
    let before = driver.contexts().await?;
    Ok((origin, before))
}

async fn traverse<D: PageDriver + ?Sized>(
    driver: &mut D,
    sel: &ListingSelectors,
    waits: &Waits,
    keyword: &str,
    before: &[ContextId],
    opened: &mut Option<ContextId>,
) -> Result<Vec<FundingRecord>, ListingError> {
    let link = wait_until(driver, Clickable(&sel.award_link), waits.element, waits.backoff).await?;
    driver.click(&link).await?;

    let ctx = wait_until(driver, NewContext { before }, waits.context, waits.backoff).await?;
    *opened = Some(ctx.clone());
    driver.switch_to(&ctx).await?;
    debug!("Switched to listing context {}", ctx);

    let dropdown =
        wait_until(driver, Clickable(&sel.filter_dropdown), waits.element, waits.backoff).await?;
    driver.click(&dropdown).await?;
    let option =
        wait_until(driver, Clickable(&sel.filter_option), waits.element, waits.backoff).await?;

    let previous = RowsSnapshot::of(driver, &sel.table_rows).await?;
    driver.click(&option).await?;
    // a filter that matches nothing leaves an empty table, which is a valid listing
    let refreshed = Refreshed::new(&sel.table_rows, &previous).allow_empty();
    match wait_until(driver, refreshed, waits.results, waits.backoff).await {
        Ok(_) => {}
        Err(DriverError::Timeout { .. }) => {
            debug!("Sub-award rows for '{}' never changed, reading what is shown", keyword);
        }
        Err(e) => return Err(e.into()),
    }

    let html = driver.page_source().await?;
    Ok(parse_listing(&html, &sel.table_body_css, keyword)?)
}

async fn close_and_return<D: PageDriver + ?Sized>(
    driver: &mut D,
    ctx: &ContextId,
    origin: &ContextId,
) -> Result<(), DriverError> {
    driver.switch_to(ctx).await?;
    driver.close_context().await?;
    driver.switch_to(origin).await
}

/// Element text with whitespace runs collapsed.
fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn selector(css: &str) -> Result<Selector, TableError> {
    Selector::parse(css).map_err(|_| TableError::Selector(css.to_string()))
}

/// Parse the sub-award table whose body matches `body_css`.
///
/// Columns are located by header text, and every row must be as wide as the
/// header; anything else is reported instead of being mapped by position.
pub fn parse_listing(
    html: &str,
    body_css: &str,
    keyword: &str,
) -> Result<Vec<FundingRecord>, TableError> {
    let doc = Html::parse_document(html);
    let body_sel = selector(body_css)?;
    let header_sel = selector("thead th")?;

    let body = doc
        .select(&body_sel)
        .next()
        .ok_or_else(|| TableError::MissingBody(body_css.to_string()))?;
    let table = body
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "table")
        .ok_or(TableError::MissingHeader)?;

    let headers: Vec<String> = table
        .select(&header_sel)
        .map(|th| cell_text(th).to_lowercase())
        .collect();
    if headers.is_empty() {
        return Err(TableError::MissingHeader);
    }

    let mut positions = [0usize; COLUMNS.len()];
    for (slot, (column, labels)) in positions.iter_mut().zip(COLUMNS.iter()) {
        *slot = headers
            .iter()
            .position(|h| labels.contains(&h.as_str()))
            .ok_or_else(|| TableError::MissingColumn {
                column: *column,
                found: headers.join(", "),
            })?;
    }

    let mut records = Vec::new();
    let rows = body
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "tr");
    for (i, row) in rows.enumerate() {
        let cells: Vec<String> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|e| matches!(e.value().name(), "td" | "th"))
            .map(cell_text)
            .collect();
        if cells.len() != headers.len() {
            return Err(TableError::RowWidth {
                row: i + 1,
                expected: headers.len(),
                found: cells.len(),
            });
        }
        let at = |n: usize| cells[positions[n]].clone();
        records.push(FundingRecord {
            keyword: keyword.to_string(),
            award_number: at(0),
            company_name: at(1),
            amount: at(2),
            date: at(3),
            award_id: at(4),
            recipient_name: at(5),
            awarding_agency: at(6),
            awarding_sub_agency: at(7),
        });
    }
    Ok(records)
}
