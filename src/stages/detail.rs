use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::driver::wait::{wait_until, Present, Waits};
use crate::driver::{DriverError, PageDriver};
use crate::portal::{DetailSelectors, FieldSpec, Read};
use crate::record::{EntityRecord, Field};

static ID_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(\s*(?:UEI|Legacy DUNS)\s*\)\s*$").unwrap());

/// Visit `link` and read every field of the record independently.
///
/// A field whose element is missing (or cannot be read) is `None`; only a
/// failed navigation drops the whole record.
pub async fn extract<D: PageDriver + ?Sized>(
    driver: &mut D,
    selectors: &DetailSelectors,
    waits: &Waits,
    keyword: &str,
    link: &str,
) -> Option<EntityRecord> {
    if let Err(e) = driver.navigate(link).await {
        warn!("Error scraping {}: {}", link, e);
        return None;
    }

    if let Some(ready) = &selectors.ready {
        if let Err(e) = wait_until(driver, Present(ready), waits.page, waits.backoff).await {
            debug!("Page {} not ready, reading what is there: {}", link, e);
        }
    }

    let mut record = EntityRecord::new(keyword);
    for spec in &selectors.fields {
        match read_field(driver, spec).await {
            Ok(values) => {
                for (field, value) in values {
                    record.set(field, value);
                }
            }
            Err(e) => debug!("Field {:?} unreadable on {}: {}", spec.field, link, e),
        }
    }
    Some(record)
}

type FieldValues = Vec<(Field, Option<String>)>;

async fn read_field<D: PageDriver + ?Sized>(
    driver: &mut D,
    spec: &FieldSpec,
) -> Result<FieldValues, DriverError> {
    let values = match spec.read {
        Read::Text => {
            let text = element_text(driver, spec).await?;
            vec![(spec.field, text.as_deref().and_then(trimmed))]
        }
        Read::FirstLine => {
            let text = element_text(driver, spec).await?;
            vec![(spec.field, text.as_deref().and_then(first_line))]
        }
        Read::Block => {
            let text = element_text(driver, spec).await?;
            vec![(spec.field, text.as_deref().and_then(flatten_block))]
        }
        Read::Attribute(name) => {
            let value = match driver.find(&spec.locator).await? {
                Some(el) => driver.attribute(&el, name).await?,
                None => None,
            };
            vec![(spec.field, value.as_deref().and_then(trimmed))]
        }
        Read::JoinAll => vec![(spec.field, join_all(driver, spec).await?)],
        Read::IdentifierPair => {
            let (uei, legacy) = match element_text(driver, spec).await? {
                Some(text) => split_identifiers(&text),
                None => (None, None),
            };
            vec![(Field::Uei, uei), (Field::LegacyDuns, legacy)]
        }
    };
    Ok(values)
}

async fn element_text<D: PageDriver + ?Sized>(
    driver: &mut D,
    spec: &FieldSpec,
) -> Result<Option<String>, DriverError> {
    match driver.find(&spec.locator).await? {
        Some(el) => driver.text(&el).await.map(Some),
        None => Ok(None),
    }
}

async fn join_all<D: PageDriver + ?Sized>(
    driver: &mut D,
    spec: &FieldSpec,
) -> Result<Option<String>, DriverError> {
    let mut parts = Vec::new();
    for el in driver.find_all(&spec.locator).await? {
        let text = driver.text(&el).await?;
        let text = text.trim();
        if !text.is_empty() {
            parts.push(text.to_string());
        }
    }
    Ok((!parts.is_empty()).then(|| parts.join(", ")))
}

/// Present but blank reads the same as absent.
fn trimmed(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// Address blocks arrive as one line per address part.
pub fn flatten_block(text: &str) -> Option<String> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    (!lines.is_empty()).then(|| lines.join(","))
}

/// Split "<uei> (UEI )\n<duns> (Legacy DUNS )" into its two identifiers.
///
/// The legacy value is dropped when it repeats the UEI.
pub fn split_identifiers(text: &str) -> (Option<String>, Option<String>) {
    let clean = |s: &str| -> Option<String> {
        let v = ID_LABEL_RE.replace(s.trim(), "").trim().to_string();
        (!v.is_empty()).then_some(v)
    };

    let (uei, legacy) = match text.trim().split_once('\n') {
        Some((a, b)) => (clean(a), clean(b)),
        None => (clean(text), None),
    };

    let legacy = match (&uei, legacy) {
        (Some(u), Some(l)) if u.eq_ignore_ascii_case(&l) => None,
        (_, l) => l,
    };
    (uei, legacy)
}
