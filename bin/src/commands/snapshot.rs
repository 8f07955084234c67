//! `sitesnap snapshot`: mirror one site from the command line.

use crate::args::SnapshotArgs;
use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use sitesnap_lib::{
    CrawlParameters, JobRegistry, JobState, Storage, Supervisor, WgetFetcher, artifact_file_name,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Runs one job in-process and copies its archive to the output path.
pub(crate) async fn snapshot(args: SnapshotArgs, quiet: bool) -> Result<()> {
    args.engine.resolve_wget()?;
    let config = args.engine.service_config();
    let defaults = config.sync_defaults;
    let params = CrawlParameters::new(
        &args.url,
        args.depth.unwrap_or(defaults.depth),
        args.wait.unwrap_or(defaults.wait_seconds),
        args.obey_robots,
    )?;

    // A one-off run gets its own scratch root unless one is configured
    let scratch;
    let storage = match &args.engine.storage_dir {
        Some(_) => args.engine.storage()?,
        None => {
            scratch = TempDir::new().context("Failed to create scratch directory")?;
            Storage::new(scratch.path().to_path_buf())?
        }
    };

    let fetcher = Arc::new(WgetFetcher::new(args.engine.fetcher_config()));
    let supervisor = Supervisor::new(JobRegistry::new(), storage, fetcher, config);

    let job = supervisor.submit(params).await?;
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(artifact_file_name(job.id)));

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    };

    let mut states = supervisor.registry().subscribe(job.id).await?;
    loop {
        let state = *states.borrow_and_update();
        progress.set_message(format!("{} ({state})", args.url));
        if state.is_terminal() || states.changed().await.is_err() {
            break;
        }
    }

    let job = supervisor.registry().get(job.id).await?;
    match (job.state, job.artifact_path.as_ref()) {
        (JobState::Done, Some(artifact)) => {
            tokio::fs::copy(artifact, &output)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            supervisor.reclaim(job.id).await?;

            progress.finish_with_message(format!(
                "Saved {} ({} bytes)",
                output.display(),
                job.artifact_bytes.unwrap_or_default()
            ));
            if quiet {
                println!("{}", output.display());
            }
            Ok(())
        }
        _ => {
            progress.abandon_with_message(format!("{} failed", args.url));
            match job.failure {
                Some(failure) => bail!("Snapshot failed: {failure}"),
                None => bail!("Snapshot failed"),
            }
        }
    }
}
