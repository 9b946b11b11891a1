use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};

use crate::batch::{Batch, BatchPlan, ResumePoint};
use crate::driver::wait::{wait_until, Clickable, Waits};
use crate::driver::{ContextId, DriverError, PageDriver};
use crate::output::write_rows;
use crate::portal::{Profile, SetupStep, SetupWait};
use crate::record::{EntityRecord, FundingRecord};
use crate::stages::{detail, listing, search};

/// The primary browser context could not be re-established; every later
/// navigation would land in the wrong window.
#[derive(Debug, Error)]
#[error("lost the primary browser context {primary}: {source}")]
pub struct ContextError {
    pub primary: ContextId,
    #[source]
    pub source: DriverError,
}

/// Counts reported after a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub batches: usize,
    pub identifiers: usize,
    pub links: usize,
    pub records: usize,
    pub funding_rows: usize,
    pub failed_links: usize,
    pub files_written: Vec<PathBuf>,
}

impl RunSummary {
    pub fn print(&self) {
        println!(
            "Processed {} batches: {} identifiers searched, {} links visited ({} failed), {} records, {} funding rows.",
            self.batches,
            self.identifiers,
            self.links,
            self.failed_links,
            self.records,
            self.funding_rows,
        );
    }
}

#[derive(Default)]
struct BatchOutput {
    records: Vec<EntityRecord>,
    funding: Vec<FundingRecord>,
}

/// Batch orchestrator: search, extract and persist one batch at a time.
pub struct Pipeline<'a, D: PageDriver + ?Sized> {
    driver: &'a mut D,
    profile: &'a Profile,
    waits: Waits,
    out_root: PathBuf,
}

impl<'a, D: PageDriver + ?Sized> Pipeline<'a, D> {
    pub fn new(driver: &'a mut D, profile: &'a Profile, waits: Waits, out_root: &Path) -> Self {
        Pipeline {
            driver,
            profile,
            waits,
            out_root: out_root.to_path_buf(),
        }
    }

    /// Run every batch from `resume` on.
    ///
    /// A failing identifier or link only costs its own records. Output write
    /// errors and a lost primary context end the run; batches already written
    /// stay valid.
    pub async fn run(
        &mut self,
        identifiers: &[String],
        batch_size: NonZeroUsize,
        resume: ResumePoint,
    ) -> Result<RunSummary> {
        let plan = BatchPlan::new(identifiers.len(), batch_size);
        let total = plan.count();
        let mut summary = RunSummary::default();

        let batches: Vec<Batch> = plan.from(resume).collect();
        if batches.is_empty() {
            info!(
                "Nothing to do: starting batch {} but only {} batches",
                resume.index() + 1,
                total
            );
            return Ok(summary);
        }

        let primary = self.prepare().await?;

        let remaining: usize = batches.iter().map(|b| b.range.len()).sum();
        let pb = ProgressBar::new(remaining as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
                .progress_chars("=> "),
        );

        for batch in batches {
            let number = batch.number();
            info!(
                "Processing batch {}/{}, identifiers {} to {}",
                number,
                total,
                batch.range.start + 1,
                batch.range.end
            );
            pb.set_message(format!("batch {number}/{total}"));

            let span = info_span!("batch", number);
            let output = self
                .process_batch(&identifiers[batch.range.clone()], &primary, &pb, &mut summary)
                .instrument(span)
                .await?;

            self.write_batch(number, &output, &mut summary)?;
            summary.batches += 1;
        }

        pb.finish_and_clear();
        info!("Run complete: {} batches written", summary.batches);
        Ok(summary)
    }

    /// Run the profile's setup steps and remember the context they end in.
    async fn prepare(&mut self) -> Result<ContextId> {
        for step in &self.profile.setup {
            match step {
                SetupStep::Navigate(url) => {
                    info!("Opening {}", url);
                    self.driver
                        .navigate(url)
                        .await
                        .with_context(|| format!("Failed to open {url}"))?;
                }
                SetupStep::Click { locator, wait } => {
                    let timeout = match wait {
                        SetupWait::Element => self.waits.element,
                        SetupWait::Login => {
                            info!(
                                "Waiting up to {}s for sign-in to {}",
                                self.waits.login.as_secs(),
                                self.profile.name
                            );
                            self.waits.login
                        }
                    };
                    let el = wait_until(&mut *self.driver, Clickable(locator), timeout, self.waits.backoff)
                        .await
                        .with_context(|| format!("Setup step {locator} failed"))?;
                    self.driver.click(&el).await?;
                }
            }
        }
        Ok(self.driver.current_context().await?)
    }

    async fn process_batch(
        &mut self,
        slice: &[String],
        primary: &ContextId,
        pb: &ProgressBar,
        summary: &mut RunSummary,
    ) -> Result<BatchOutput> {
        let mut out = BatchOutput::default();
        for identifier in slice {
            let span = info_span!("identifier", %identifier);
            self.process_identifier(identifier, primary, &mut out, summary)
                .instrument(span)
                .await?;
            summary.identifiers += 1;
            pb.inc(1);
        }
        Ok(out)
    }

    async fn process_identifier(
        &mut self,
        identifier: &str,
        primary: &ContextId,
        out: &mut BatchOutput,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let token = self.profile.query.token(identifier);
        if token.is_empty() {
            warn!("'{}' normalizes to an empty search term, skipping", identifier);
            return Ok(());
        }

        ensure_primary(&mut *self.driver, primary).await?;

        if let Err(e) = self.driver.navigate(&self.profile.search_url).await {
            warn!("Could not open search page for '{}': {}", identifier, e);
            return Ok(());
        }

        let links = search::search(&mut *self.driver, &self.profile.search, &self.waits, &token).await;
        for link in links {
            summary.links += 1;
            let span = info_span!("link", %link);
            let found = self.visit_link(identifier, &link, primary, out).instrument(span).await?;
            if !found {
                summary.failed_links += 1;
            }
        }
        Ok(())
    }

    /// Extract one result page (and its listing); `false` when the page yielded no record.
    async fn visit_link(
        &mut self,
        identifier: &str,
        link: &str,
        primary: &ContextId,
        out: &mut BatchOutput,
    ) -> Result<bool> {
        let Some(record) =
            detail::extract(&mut *self.driver, &self.profile.detail, &self.waits, identifier, link).await
        else {
            return Ok(false);
        };
        out.records.push(record);

        if let Some(selectors) = &self.profile.listing {
            let rows =
                listing::get_related_listing(&mut *self.driver, selectors, &self.waits, identifier).await;
            out.funding.extend(rows);
            ensure_primary(&mut *self.driver, primary).await?;
        }
        Ok(true)
    }

    fn write_batch(
        &self,
        number: usize,
        output: &BatchOutput,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let layout = &self.profile.output;

        let path = layout.entity_path(&self.out_root, number);
        write_rows(&path, &output.records)?;
        info!("Batch {} completed and saved to {}", number, path.display());
        summary.records += output.records.len();
        summary.files_written.push(path);

        if !output.funding.is_empty() {
            let path = layout.funding_path(&self.out_root, number);
            write_rows(&path, &output.funding)?;
            info!("Funding info saved to {}", path.display());
            summary.funding_rows += output.funding.len();
            summary.files_written.push(path);
        }
        Ok(())
    }
}

/// Make `primary` the active and only context, closing anything else that is open.
pub async fn ensure_primary<D: PageDriver + ?Sized>(
    driver: &mut D,
    primary: &ContextId,
) -> Result<(), ContextError> {
    let lost = |source| ContextError {
        primary: primary.clone(),
        source,
    };

    let open = driver.contexts().await.map_err(lost)?;
    if !open.contains(primary) {
        return Err(lost(DriverError::NoSuchContext));
    }
    for ctx in open.iter().filter(|c| *c != primary) {
        warn!("Closing stray browser context {}", ctx);
        driver.switch_to(ctx).await.map_err(lost)?;
        driver.close_context().await.map_err(lost)?;
    }
    if open.len() > 1 || driver.current_context().await.ok().as_ref() != Some(primary) {
        driver.switch_to(primary).await.map_err(lost)?;
    }
    Ok(())
}
