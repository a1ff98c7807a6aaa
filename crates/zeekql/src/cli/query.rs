//! The query command: discover, scan, build views, stream results.

use crate::cli::error::HelpfulError;
use anyhow::Context;
use std::io::{self, BufWriter};
use std::time::Instant;
use tracing::{debug, info, warn};
use zeekql::catalog::{self, HeaderReader, ViewSynthesizer};
use zeekql::{Engine, FileDiscoverer, QueryConfig, ResultStreamer, StreamError};

/// Run one invocation. `discoverer` is built from `config.patterns` by the
/// caller so pattern errors can be reported as usage errors.
pub fn run(config: &QueryConfig, discoverer: &FileDiscoverer) -> anyhow::Result<()> {
    // Discovery and header scan
    let t0 = Instant::now();
    let discovery = discoverer.discover();
    for warning in &discovery.warnings {
        warn!("{}", warning);
    }
    debug!(
        candidates = discovery.candidates,
        matched = discovery.files.len(),
        "Discovery finished"
    );

    if discovery.files.is_empty() {
        info!("No files matched the given patterns; nothing to query");
        return Ok(());
    }

    let reader = HeaderReader::new(config.scan_lines, config.header_lines);
    let scan = catalog::scan(&discovery.files, &reader);
    let registry = scan.registry;
    info!(
        "Analyzed {} files. Identified {} log types ({} schemas) in {:.4}s",
        discovery.files.len(),
        registry.log_type_count(),
        registry.schema_count(),
        t0.elapsed().as_secs_f64()
    );
    if !scan.warnings.is_empty() {
        warn!(
            "Skipped {} of {} matched files",
            scan.warnings.len(),
            discovery.files.len()
        );
    }

    // Views
    let t0 = Instant::now();
    let engine = Engine::open().context("Failed to open query engine")?;
    let synthesizer = ViewSynthesizer::new(engine.capabilities(), config.header_lines);
    let views = synthesizer.register_all(engine.connection(), &registry);
    for view in &views.created {
        info!("View '{}' created ({} schemas)", view.name, view.group_count);
    }
    for warning in &views.warnings {
        warn!("{}", warning);
    }
    info!(
        "All views initialized in {:.4}s",
        t0.elapsed().as_secs_f64()
    );

    // Query
    info!("--- Streaming Results ---");
    let stdout = io::stdout();
    let out = BufWriter::new(stdout.lock());
    let streamer = ResultStreamer::new(engine.connection(), config.batch_size);

    let summary = match streamer.stream(&config.query, out) {
        Ok(summary) => summary,
        Err(StreamError::Query(err)) => {
            return Err(
                HelpfulError::query_failed(&err.to_string(), &config.query, views.names()).into(),
            );
        }
        Err(err @ StreamError::Io(_)) => return Err(err.into()),
    };

    if summary.truncated {
        debug!("Output closed by reader after {} rows", summary.rows);
    }
    info!(
        "Total rows: {} | Query time: {:.4}s",
        summary.rows,
        summary.elapsed.as_secs_f64()
    );
    Ok(())
}
