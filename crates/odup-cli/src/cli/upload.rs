//! `odup <path> <destination>`: discover files, then run the upload pool.

use anyhow::{Context, Result};
use odup_core::config;
use odup_core::dashboard::{self, Dashboard};
use odup_core::discover::{discover, MediaFilter};
use odup_core::graph::{ClientCredentials, GraphUploader};
use odup_core::render::ProgressRenderer;
use odup_core::retry::RetryPolicy;
use odup_core::scheduler::{self, PoolSummary};
use odup_core::size::format_size;
use odup_core::uploader::RetryingUploader;
use std::io::IsTerminal;
use std::sync::Arc;

use super::{Cli, EXIT_PARTIAL};

pub async fn run_upload(cli: &Cli) -> Result<i32> {
    let mut cfg = config::load(cli.config.as_deref())?;
    if let Some(jobs) = cli.jobs {
        cfg.upload.max_concurrent = jobs;
    }
    cfg.validate()?;
    let creds = cfg.credentials()?;
    tracing::debug!("loaded config: {:?}", cfg.upload);

    let files = discover(&cli.path, &MediaFilter::from_config(&cfg.upload))
        .with_context(|| format!("scan {}", cli.path.display()))?;
    if files.is_empty() {
        println!("No matching files found in {}.", cli.path.display());
        return Ok(0);
    }
    let total_bytes: u64 = files.iter().map(|f| f.size).sum();
    tracing::info!(
        files = files.len(),
        total = %format_size(total_bytes),
        destination = %cli.destination,
        "starting upload"
    );

    let tokens = Arc::new(ClientCredentials::new(&creds, &cfg.endpoints.login_base_url));
    let graph = Arc::new(GraphUploader::new(
        tokens,
        &cfg.endpoints.graph_base_url,
        &creds.user_id,
        cfg.upload.chunk_size,
    )?);

    let dashboard = if cli.no_dashboard || !std::io::stdout().is_terminal() {
        Arc::new(Dashboard::headless())
    } else {
        Arc::new(Dashboard::new(
            ProgressRenderer::from_terminal(),
            Box::new(std::io::stdout()),
        ))
    };
    let resize = dashboard::spawn_resize_listener(Arc::clone(&dashboard));

    let uploader = Arc::new(RetryingUploader::new(
        graph,
        Arc::clone(&dashboard),
        RetryPolicy::from(&cfg.retry),
        &cli.destination,
    ));
    let pool = scheduler::schedule(uploader, files, cfg.upload.max_concurrent);
    let summary = pool.join().await?;

    if let Some(handle) = resize {
        handle.abort();
    }
    report(&summary);
    Ok(if summary.all_succeeded() { 0 } else { EXIT_PARTIAL })
}

fn report(summary: &PoolSummary) {
    for failed in &summary.abandoned {
        eprintln!("failed: {} ({})", failed.file.relative_path, failed.reason);
    }
    println!(
        "uploaded {} file(s), failed {}",
        summary.completed.len(),
        summary.abandoned.len()
    );
    tracing::info!(
        completed = summary.completed.len(),
        abandoned = summary.abandoned.len(),
        "upload run finished"
    );
}
