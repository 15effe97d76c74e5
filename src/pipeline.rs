use crate::config::{Config, RunOptions};
use crate::errors::{AppError, ResultExt};
use crate::export;
use crate::importer::{ImportOutcome, LeadImporter};
use crate::models::{Homeowner, Priority};
use crate::phone_verify::PhoneVerificationClient;
use crate::progress::{address_dedup_key, ErrorEntry, ProgressStore, RunCounters};
use crate::region_filter::{AreaCodeCount, FilterStats, RegionPhoneFilter};
use crate::scoring::{self, ScoreDistribution};
use crate::search_client::{PropertySearchClient, SearchCriteria};
use crate::skip_trace::SkipTraceClient;
use serde::Serialize;
use sqlx::PgPool;
use std::fmt;
use std::path::PathBuf;

/// Imports between periodic checkpoint flushes.
const CHECKPOINT_EVERY: usize = 50;
/// Errors echoed to the operator at run end.
const TOP_ERRORS: usize = 5;

/// Pipeline stages, in execution order. Transitions are strictly
/// sequential; the error path is reachable from any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Search,
    Enrich,
    Filter,
    Score,
    Verify,
    Persist,
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Search => "search",
            Stage::Enrich => "enrich",
            Stage::Filter => "filter",
            Stage::Score => "score",
            Stage::Verify => "verify",
            Stage::Persist => "persist",
            Stage::Report => "report",
        };
        write!(f, "{name}")
    }
}

/// Structured result of a pipeline run. Rendering to human-readable text is
/// the binary's concern, not the orchestrator's.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub counters: RunCounters,
    pub filter_stats: FilterStats,
    pub score_distribution: ScoreDistribution,
    pub area_codes: Vec<AreaCodeCount>,
    pub top_errors: Vec<ErrorEntry>,
    pub records_exported: usize,
    pub export_path: PathBuf,
    pub dry_run: bool,
    /// Records that would have been imported, counted only on dry runs.
    pub would_import: usize,
}

/// Wires every stage into one linear pass, owns the configuration and the
/// progress store, and decides dry-run vs. commit.
pub struct Pipeline {
    options: RunOptions,
    search: PropertySearchClient,
    skip_trace: SkipTraceClient,
    region_filter: RegionPhoneFilter,
    verifier: PhoneVerificationClient,
    importer: Option<LeadImporter>,
    store: ProgressStore,
}

impl Pipeline {
    /// Build a pipeline from configuration. A database pool is required
    /// unless this is a dry run.
    pub fn new(
        config: &Config,
        options: RunOptions,
        pool: Option<PgPool>,
    ) -> Result<Self, AppError> {
        let importer = match pool {
            Some(pool) => Some(LeadImporter::new(pool, config)),
            None if options.dry_run => None,
            None => {
                return Err(AppError::Config(
                    "a database connection is required outside dry-run mode".to_string(),
                ))
            }
        };

        let store = ProgressStore::load(&options.checkpoint_path);

        Ok(Self {
            search: PropertySearchClient::new(config),
            skip_trace: SkipTraceClient::new(config),
            region_filter: RegionPhoneFilter::new(config.allowed_area_codes.clone()),
            verifier: PhoneVerificationClient::new(config),
            importer,
            store,
            options,
        })
    }

    /// Run the full pass. Progress is flushed after every stage and
    /// unconditionally on the error path before the error re-raises.
    pub async fn run(mut self) -> Result<PipelineReport, AppError> {
        let result = self.run_stages().await;

        if let Err(e) = &result {
            self.store.progress.record_error("pipeline", &e.to_string());
            if let Err(save_err) = self.store.save() {
                tracing::error!("Failed to flush checkpoint on error path: {}", save_err);
            }
        }

        result
    }

    async fn run_stages(&mut self) -> Result<PipelineReport, AppError> {
        // Search
        self.log_stage(Stage::Search);
        let criteria = SearchCriteria {
            city: self.options.city.clone(),
            state: self.options.state.clone(),
            min_lot_sqft: self.options.min_lot_sqft,
            min_value: self.options.min_value,
            max_results: self.options.max_results,
            resume_offset: self.options.resume_offset,
        };
        let properties = self.search.search(&criteria).await;
        {
            let counters = &mut self.store.progress.counters;
            counters.properties_found += properties.len() as u64;
            counters.api_requests += self.search.requests_made();
            counters.estimated_credits += self.search.estimated_credits() as f64;
        }
        self.checkpoint(Stage::Search)?;

        // Enrich
        self.log_stage(Stage::Enrich);
        let enriched = self.skip_trace.skip_trace(properties).await;
        {
            let counters = &mut self.store.progress.counters;
            counters.homeowners_found += enriched
                .iter()
                .filter(|h| !h.owner_name.trim().is_empty() || h.first_name.is_some())
                .count() as u64;
            counters.with_phone += enriched.iter().filter(|h| h.has_phone()).count() as u64;
        }
        self.checkpoint(Stage::Enrich)?;

        // Filter
        self.log_stage(Stage::Filter);
        let area_codes = self.region_filter.area_code_distribution(&enriched);
        for row in &area_codes {
            tracing::debug!(
                "Pre-filter area code {}: {} record(s){}",
                row.area_code,
                row.count,
                if row.allowed { " [allowed]" } else { "" }
            );
        }
        let filtered = if self.options.region_filter {
            let kept = self.region_filter.filter_all(enriched);
            for row in self.region_filter.area_code_distribution(&kept) {
                tracing::debug!(
                    "Post-filter area code {}: {} record(s)",
                    row.area_code,
                    row.count
                );
            }
            kept
        } else {
            tracing::info!("Region filter disabled, passing {} records through", enriched.len());
            enriched
        };
        self.checkpoint(Stage::Filter)?;

        // Score
        self.log_stage(Stage::Score);
        let mut scored: Vec<Homeowner> = filtered;
        for h in &mut scored {
            scoring::apply(h);
        }
        {
            let counters = &mut self.store.progress.counters;
            for h in &scored {
                match h.priority {
                    Some(Priority::High) => counters.high_priority += 1,
                    Some(Priority::Medium) => counters.medium_priority += 1,
                    Some(Priority::Low) | None => counters.low_priority += 1,
                }
            }
        }
        let mut scored = scoring::filter_by_score(scored, self.options.min_score);
        scoring::sort_by_score_desc(&mut scored);
        self.checkpoint(Stage::Score)?;

        // Verify
        self.log_stage(Stage::Verify);
        let verified = self.verifier.verify_all(scored).await;
        self.store.progress.counters.with_mobile +=
            verified.iter().filter(|h| h.has_mobile()).count() as u64;
        self.checkpoint(Stage::Verify)?;

        // Persist
        self.log_stage(Stage::Persist);
        let would_import = self.persist(&verified).await?;

        // Report
        self.log_stage(Stage::Report);
        let report = PipelineReport {
            counters: self.store.progress.counters.clone(),
            filter_stats: self.region_filter.stats(),
            score_distribution: scoring::score_distribution(&verified),
            area_codes,
            top_errors: self.store.progress.top_errors(TOP_ERRORS),
            records_exported: verified.len(),
            export_path: self.options.export_path.clone(),
            dry_run: self.options.dry_run,
            would_import,
        };

        // Done: CSV backup independent of the primary store.
        export::write_csv(&verified, &self.options.export_path)
            .context("CSV export of final record set")?;
        self.checkpoint(Stage::Report)?;
        tracing::info!("Pipeline done");

        Ok(report)
    }

    /// Import the final record set, skipping anything the ledger already
    /// covers. Returns the dry-run would-import count (0 on real runs).
    async fn persist(&mut self, records: &[Homeowner]) -> Result<usize, AppError> {
        let mut would_import = 0usize;
        let mut since_checkpoint = 0usize;

        for h in records {
            let dedup_key = address_dedup_key(&h.full_address);
            if self.store.is_already_imported(&dedup_key) {
                tracing::debug!("Ledger already covers {}, skipping", h.full_address);
                self.store.progress.counters.skipped += 1;
                continue;
            }

            if self.options.dry_run {
                tracing::info!(
                    "[dry-run] would import {} (score {:?})",
                    h.full_address,
                    h.score
                );
                would_import += 1;
                continue;
            }

            let Some(importer) = self.importer.as_ref() else {
                return Err(AppError::Config(
                    "importer unavailable outside dry-run mode".to_string(),
                ));
            };

            match importer.upsert(h).await {
                Ok(ImportOutcome::Imported(lead_id)) => {
                    self.store
                        .record_import(&h.property_id, &h.full_address, h.score.unwrap_or(0));
                    tracing::debug!("Recorded {} in ledger (lead {})", h.full_address, lead_id);
                    since_checkpoint += 1;
                    if since_checkpoint >= CHECKPOINT_EVERY {
                        self.store.save()?;
                        since_checkpoint = 0;
                    }
                }
                Ok(ImportOutcome::Skipped) => {
                    self.store.progress.counters.skipped += 1;
                }
                Err(e) => {
                    self.store.progress.counters.failed += 1;
                    self.store
                        .progress
                        .record_error("import", &format!("{}: {}", h.full_address, e));
                }
            }
        }

        self.checkpoint(Stage::Persist)?;
        Ok(would_import)
    }

    fn log_stage(&self, stage: Stage) {
        tracing::info!("=== Stage: {} ===", stage);
    }

    fn checkpoint(&mut self, stage: Stage) -> Result<(), AppError> {
        self.store
            .save()
            .with_context(|| format!("checkpoint after {stage} stage"))
    }
}
