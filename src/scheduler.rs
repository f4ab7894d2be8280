//! Concurrency model (spec.md §5): one long-lived task per periodic job,
//! cooperating over the shared `Buffer` and a channel that hands the poll
//! task a fresh live-callsign set for arena cleanup.
//!
//! Grounded on the teacher's `stream_manager.rs` (`tokio::select!` against a
//! `CancellationToken` so an in-progress unit of work finishes before a task
//! exits) and `flight_location_processor.rs` (`tokio::time::interval` +
//! `ticker.tick().await` loop, logging tick failures rather than panicking).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::archiver::Archiver;
use crate::batch_writer::BatchWriter;
use crate::buffer::Buffer;
use crate::config::Config;
use crate::controllers_repo::ControllersRepository;
use crate::db::PgPool;
use crate::error::CoreError;
use crate::filter_chain::{self, run_filter_chain, BoundaryPolygon, FilterStats};
use crate::flights_repo::FlightsRepository;
use crate::sector::engine::{AircraftTick, LastPosition, SectorEngine, SectorEngineConfig, SectorTickOutcome};
use crate::sector::loader::{self, SectorIndex};
use crate::sector::repo::SectorRepository;
use crate::session::detector::{CompletionCandidate, SessionDetector};
use crate::session::reconnect::{MergedSession, ReconnectionMerger};
use crate::summarizer::{ControllerSummarizer, FlightSummarizer};
use crate::transceivers_repo::TransceiversRepository;
use crate::upstream::client::UpstreamClient;

/// Degraded-state tracking for the `/api/status` and health endpoints
/// (spec.md §7: "health endpoint returns degraded state when the last poll
/// or the last flush failed"). Defaults to healthy before either tick has
/// run once.
#[derive(Debug, Clone)]
pub struct HealthState {
    pub last_poll_at: Option<chrono::DateTime<Utc>>,
    pub last_poll_ok: bool,
    pub last_flush_at: Option<chrono::DateTime<Utc>>,
    pub last_flush_ok: bool,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            last_poll_at: None,
            last_poll_ok: true,
            last_flush_at: None,
            last_flush_ok: true,
        }
    }
}

impl HealthState {
    pub fn healthy(&self) -> bool {
        self.last_poll_ok && self.last_flush_ok
    }
}

/// Everything the scheduler needs to build its four tasks, assembled once
/// at startup from `Config` and a connection pool.
pub struct Scheduler {
    config: Config,
    upstream: UpstreamClient,
    buffer: Buffer,
    polygons: Vec<BoundaryPolygon>,
    sector_index: Arc<SectorIndex>,
    sector_repo: SectorRepository,
    flights_repo: FlightsRepository,
    batch_writer: BatchWriter,
    detector: SessionDetector,
    merger: ReconnectionMerger,
    flight_summarizer: FlightSummarizer,
    controller_summarizer: ControllerSummarizer,
    archiver: Archiver,
    filter_stats: Arc<Mutex<FilterStats>>,
    health: Arc<Mutex<HealthState>>,
}

impl Scheduler {
    /// Assemble every component from `Config` and a pool. Loads the
    /// geographic-boundary and sector-definition JSON files, both
    /// startup-fatal on failure (spec.md §7).
    pub fn new(config: Config, pool: PgPool) -> Result<Self, CoreError> {
        let polygons = filter_chain::load_from_path(&config.geographic_polygons_path)?;
        let sector_index = Arc::new(loader::load_from_path(&config.sector_definitions_path)?);

        Ok(Self {
            upstream: UpstreamClient::new(&config),
            config: config.clone(),
            buffer: Buffer::new(),
            polygons,
            sector_index,
            sector_repo: SectorRepository::new(pool.clone()),
            flights_repo: FlightsRepository::new(pool.clone()),
            batch_writer: BatchWriter::new(pool.clone()),
            detector: SessionDetector::new(pool.clone()),
            merger: ReconnectionMerger::new(pool.clone()),
            flight_summarizer: FlightSummarizer::new(FlightsRepository::new(pool.clone()), pool.clone()),
            controller_summarizer: ControllerSummarizer::new(
                ControllersRepository::new(pool.clone()),
                TransceiversRepository::new(pool.clone()),
                pool.clone(),
                config.controller_interaction_radius_nm,
            ),
            archiver: Archiver::new(pool),
            filter_stats: Arc::new(Mutex::new(FilterStats::default())),
            health: Arc::new(Mutex::new(HealthState::default())),
        })
    }

    pub fn filter_stats(&self) -> Arc<Mutex<FilterStats>> {
        self.filter_stats.clone()
    }

    pub fn buffer(&self) -> Buffer {
        self.buffer.clone()
    }

    pub fn health(&self) -> Arc<Mutex<HealthState>> {
        self.health.clone()
    }

    /// Spawn the four periodic tasks and wait for all of them to finish.
    /// Returns once every task has observed `cancel` and run its in-flight
    /// unit of work to completion.
    pub async fn run(self, cancel: CancellationToken) {
        let (purge_tx, purge_rx) = mpsc::channel(1);

        let poll_handle = tokio::spawn(run_poll_task(
            self.upstream,
            self.buffer.clone(),
            self.polygons,
            self.config.excluded_callsign_patterns.clone(),
            self.config.callsign_pattern_case_sensitive,
            self.sector_index,
            self.sector_repo.clone(),
            SectorEngineConfig {
                enter_kts: self.config.sector_enter_kts,
                exit_kts: self.config.sector_exit_kts,
                exit_debounce_ticks: self.config.sector_exit_debounce_ticks,
            },
            self.filter_stats.clone(),
            self.health.clone(),
            self.config.poll_interval,
            purge_rx,
            cancel.clone(),
        ));

        let flush_handle = tokio::spawn(run_flush_task(
            self.batch_writer,
            self.buffer.clone(),
            self.health.clone(),
            self.config.write_interval,
            cancel.clone(),
        ));

        let cleanup_handle = tokio::spawn(run_sector_cleanup_task(
            self.sector_repo,
            self.flights_repo,
            self.config.flight_timeout,
            self.config.stale_sector_cleanup_interval,
            purge_tx,
            cancel.clone(),
        ));

        let session_handle = tokio::spawn(run_session_task(
            self.detector,
            self.merger,
            self.flight_summarizer,
            self.controller_summarizer,
            self.archiver,
            self.config.completion_minutes_flight,
            self.config.completion_minutes_controller,
            self.config.reconnection_threshold,
            self.config.summary_interval,
            cancel,
        ));

        let _ = tokio::join!(poll_handle, flush_handle, cleanup_handle, session_handle);
    }
}

// --- Poller -----------------------------------------------------------

#[allow(clippy::too_many_arguments)]
async fn run_poll_task(
    upstream: UpstreamClient,
    buffer: Buffer,
    polygons: Vec<BoundaryPolygon>,
    patterns: Vec<String>,
    case_sensitive: bool,
    sector_index: Arc<SectorIndex>,
    sector_repo: SectorRepository,
    sector_engine_config: SectorEngineConfig,
    stats: Arc<Mutex<FilterStats>>,
    health: Arc<Mutex<HealthState>>,
    interval: Duration,
    mut purge_rx: mpsc::Receiver<HashSet<String>>,
    cancel: CancellationToken,
) {
    // Owned exclusively by this task for its whole lifetime (spec.md §5:
    // "the per-flight sector state map is owned by the poll task; no other
    // task mutates it"); the cleanup task only ever hands it a live-callsign
    // set over `purge_rx`, never touches the arena directly.
    let mut engine = SectorEngine::new(sector_engine_config);
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("poll task shutting down");
                return;
            }
            _ = ticker.tick() => {
                poll_tick(
                    &upstream,
                    &buffer,
                    &polygons,
                    &patterns,
                    case_sensitive,
                    &sector_index,
                    &mut engine,
                    &sector_repo,
                    &stats,
                    &health,
                )
                .await;
            }
            Some(live_callsigns) = purge_rx.recv() => {
                engine.purge_absent(&live_callsigns);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
#[instrument(skip_all, name = "poll_tick")]
async fn poll_tick(
    upstream: &UpstreamClient,
    buffer: &Buffer,
    polygons: &[BoundaryPolygon],
    patterns: &[String],
    case_sensitive: bool,
    sector_index: &SectorIndex,
    engine: &mut SectorEngine,
    sector_repo: &SectorRepository,
    stats: &Mutex<FilterStats>,
    health: &Mutex<HealthState>,
) {
    metrics::counter!("pipeline.poll.ticks").increment(1);

    let snapshot = upstream.fetch_snapshot().await;

    let filtered = {
        let mut stats_guard = stats.lock().await;
        let filtered = run_filter_chain(snapshot, polygons, patterns, case_sensitive, &mut stats_guard);
        metrics::counter!("pipeline.filter.geo.admitted").absolute(stats_guard.geo_admitted);
        metrics::counter!("pipeline.filter.geo.rejected").absolute(stats_guard.geo_rejected);
        metrics::counter!("pipeline.filter.pattern.admitted").absolute(stats_guard.pattern_admitted);
        metrics::counter!("pipeline.filter.pattern.rejected").absolute(stats_guard.pattern_rejected);
        filtered
    };

    let mut tick_ok = true;
    for pilot in &filtered.pilots {
        let tick = AircraftTick {
            callsign: pilot.callsign.clone(),
            lat: pilot.latitude,
            lon: pilot.longitude,
            altitude: pilot.altitude,
            groundspeed: pilot.groundspeed,
            timestamp: pilot.last_updated,
        };
        let outcome = engine.process_tick(sector_index, &tick);
        if outcome.close_open_intervals || outcome.open_new_interval.is_some() {
            metrics::counter!("pipeline.sector.transitions").increment(1);
        }
        if let Err(e) = apply_sector_outcome(sector_repo, &tick.callsign, tick.timestamp, outcome).await {
            error!(callsign = %tick.callsign, error = %e, "sector occupancy update failed");
            tick_ok = false;
        }
    }

    buffer.ingest(filtered).await;
    let (pilots_depth, controllers_depth, transceivers_depth) = buffer.len().await;
    metrics::gauge!("pipeline.buffer.depth")
        .set((pilots_depth + controllers_depth + transceivers_depth) as f64);

    if !tick_ok {
        metrics::counter!("pipeline.poll.failures").increment(1);
    }

    let mut health_guard = health.lock().await;
    health_guard.last_poll_at = Some(Utc::now());
    health_guard.last_poll_ok = tick_ok;
}

async fn apply_sector_outcome(
    sector_repo: &SectorRepository,
    callsign: &str,
    timestamp: chrono::DateTime<Utc>,
    outcome: SectorTickOutcome,
) -> Result<(), CoreError> {
    if outcome.close_open_intervals {
        sector_repo
            .close_open_intervals(callsign.to_string(), timestamp, outcome.update_last_position)
            .await?;
    }
    if let Some(new_interval) = outcome.open_new_interval {
        sector_repo.open_interval(callsign.to_string(), new_interval).await?;
    } else if !outcome.close_open_intervals {
        if let Some(last) = outcome.update_last_position {
            sector_repo.update_last_position(callsign.to_string(), last).await?;
        }
    }
    Ok(())
}

// --- Flusher ------------------------------------------------------------

async fn run_flush_task(
    writer: BatchWriter,
    buffer: Buffer,
    health: Arc<Mutex<HealthState>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("flush task shutting down, running final flush");
                if let Err(e) = writer.flush(&buffer).await {
                    error!(error = %e, "final flush failed");
                }
                return;
            }
            _ = ticker.tick() => {
                flush_tick(&writer, &buffer, &health).await;
            }
        }
    }
}

#[instrument(skip_all, name = "flush_tick")]
async fn flush_tick(writer: &BatchWriter, buffer: &Buffer, health: &Mutex<HealthState>) {
    metrics::counter!("pipeline.flush.ticks").increment(1);
    let ok = match writer.flush(buffer).await {
        Ok(_) => true,
        Err(e) => {
            error!(error = %e, "flush tick failed");
            metrics::counter!("pipeline.flush.failures").increment(1);
            false
        }
    };
    let mut health_guard = health.lock().await;
    health_guard.last_flush_at = Some(Utc::now());
    health_guard.last_flush_ok = ok;
}

// --- Sector cleanup -------------------------------------------------------

async fn run_sector_cleanup_task(
    sector_repo: SectorRepository,
    flights_repo: FlightsRepository,
    flight_timeout: Duration,
    interval: Duration,
    purge_tx: mpsc::Sender<HashSet<String>>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("sector cleanup task shutting down");
                return;
            }
            _ = ticker.tick() => {
                sector_cleanup_tick(&sector_repo, &flights_repo, flight_timeout, &purge_tx).await;
            }
        }
    }
}

/// Close intervals whose callsign has had no sample in `flight_timeout`,
/// then hand the poll task the current set of live callsigns so it can
/// purge its own arena (spec.md §4.5, "Aperiodic cleanup").
#[instrument(skip_all, name = "sector_cleanup_tick")]
async fn sector_cleanup_tick(
    sector_repo: &SectorRepository,
    flights_repo: &FlightsRepository,
    flight_timeout: Duration,
    purge_tx: &mpsc::Sender<HashSet<String>>,
) {
    let cutoff = Utc::now() - chrono::Duration::from_std(flight_timeout).unwrap_or_default();

    let open_intervals = match sector_repo.open_intervals().await {
        Ok(rows) => rows,
        Err(e) => {
            error!(error = %e, "failed to list open sector intervals");
            return;
        }
    };

    for row in open_intervals {
        let stale = match flights_repo.find_by_callsign(&row.callsign).await {
            Ok(Some(flight)) => flight.last_updated < cutoff,
            Ok(None) => true,
            Err(e) => {
                error!(callsign = %row.callsign, error = %e, "failed to check flight staleness");
                continue;
            }
        };
        if !stale {
            continue;
        }
        let last = LastPosition {
            lat: row.last_lat,
            lon: row.last_lon,
            altitude: row.last_alt,
        };
        if let Err(e) = sector_repo
            .close_open_intervals(row.callsign.clone(), cutoff, Some(last))
            .await
        {
            error!(callsign = %row.callsign, error = %e, "failed to close stale sector interval");
        }
    }

    match flights_repo.list_all().await {
        Ok(flights) => {
            let live: HashSet<String> = flights.into_iter().map(|f| f.callsign).collect();
            let _ = purge_tx.send(live).await;
        }
        Err(e) => error!(error = %e, "failed to list live flights for arena purge"),
    }
}

// --- Session completion / summarize / archive ----------------------------

#[allow(clippy::too_many_arguments)]
async fn run_session_task(
    detector: SessionDetector,
    merger: ReconnectionMerger,
    flight_summarizer: FlightSummarizer,
    controller_summarizer: ControllerSummarizer,
    archiver: Archiver,
    completion_minutes_flight: i64,
    completion_minutes_controller: i64,
    reconnection_threshold: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("session task shutting down");
                return;
            }
            _ = ticker.tick() => {
                session_tick(
                    &detector,
                    &merger,
                    &flight_summarizer,
                    &controller_summarizer,
                    &archiver,
                    completion_minutes_flight,
                    completion_minutes_controller,
                    reconnection_threshold,
                )
                .await;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
#[instrument(skip_all, name = "session_tick")]
async fn session_tick(
    detector: &SessionDetector,
    merger: &ReconnectionMerger,
    flight_summarizer: &FlightSummarizer,
    controller_summarizer: &ControllerSummarizer,
    archiver: &Archiver,
    completion_minutes_flight: i64,
    completion_minutes_controller: i64,
    reconnection_threshold: Duration,
) {
    let flight_cutoff = Utc::now() - chrono::Duration::minutes(completion_minutes_flight);
    match detector.flight_candidates(flight_cutoff).await {
        Ok(candidates) => {
            for candidate in candidates {
                let identity = (candidate.callsign.clone(), candidate.cid, candidate.logon_time);
                match complete_flight_session(
                    merger,
                    flight_summarizer,
                    archiver,
                    candidate,
                    reconnection_threshold,
                )
                .await
                {
                    Ok(()) => metrics::counter!("pipeline.session.completed").increment(1),
                    Err(e) => {
                        error!(callsign = %identity.0, cid = identity.1, error = %e, "flight session completion failed");
                    }
                }
            }
        }
        Err(e) => error!(error = %e, "flight completion scan failed"),
    }

    let controller_cutoff = Utc::now() - chrono::Duration::minutes(completion_minutes_controller);
    match detector.controller_candidates(controller_cutoff).await {
        Ok(candidates) => {
            for candidate in candidates {
                let identity = (candidate.callsign.clone(), candidate.cid, candidate.logon_time);
                match complete_controller_session(
                    merger,
                    controller_summarizer,
                    archiver,
                    candidate,
                    reconnection_threshold,
                )
                .await
                {
                    Ok(()) => metrics::counter!("pipeline.session.completed").increment(1),
                    Err(e) => {
                        error!(callsign = %identity.0, cid = identity.1, error = %e, "controller session completion failed");
                    }
                }
            }
        }
        Err(e) => error!(error = %e, "controller completion scan failed"),
    }
}

/// Merge, summarize, and archive one completion candidate. A unique-
/// violation from the summarizer means a previous tick already summarized
/// this session (`CoreError::is_already_summarized`); the archive+delete
/// step still runs, since it is itself idempotent and this session's raw
/// rows may not have been archived yet if a prior attempt crashed between
/// the two steps.
async fn complete_flight_session(
    merger: &ReconnectionMerger,
    summarizer: &FlightSummarizer,
    archiver: &Archiver,
    candidate: CompletionCandidate,
    threshold: Duration,
) -> Result<(), CoreError> {
    let merged: MergedSession = merger.merge_flight_candidate(candidate, threshold).await?;
    match summarizer.summarize(&merged).await {
        Ok(()) => {}
        Err(e) if e.is_already_summarized() => {
            warn!(callsign = %merged.callsign, cid = merged.cid, "flight session already summarized");
        }
        Err(e) => return Err(e),
    }
    archiver.archive_flight_session(&merged).await?;
    Ok(())
}

async fn complete_controller_session(
    merger: &ReconnectionMerger,
    summarizer: &ControllerSummarizer,
    archiver: &Archiver,
    candidate: CompletionCandidate,
    threshold: Duration,
) -> Result<(), CoreError> {
    let merged: MergedSession = merger.merge_controller_candidate(candidate, threshold).await?;
    match summarizer.summarize(&merged).await {
        Ok(()) => {}
        Err(e) if e.is_already_summarized() => {
            warn!(callsign = %merged.callsign, cid = merged.cid, "controller session already summarized");
        }
        Err(e) => return Err(e),
    }
    archiver.archive_controller_session(&merged).await?;
    Ok(())
}
