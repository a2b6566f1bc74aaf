use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::time::Duration;

use crate::cli::Commands;
use todd_api::ApiState;
use todd_core::{extract_error_summary, extract_summary, RunState, RunStatus, Settings, TestSummary};
use todd_github::{CiProvider, GitHubClient, Repository};
use todd_tracker::CancelError;

const WATCH_INTERVAL: Duration = Duration::from_secs(1);
const NUDGE_GRACE: Duration = Duration::from_secs(1);

pub async fn execute(command: Commands, settings: Settings) -> Result<()> {
    match command {
        Commands::Run { command, no_watch } => {
            let state = ApiState::from_settings(settings).await?;
            let outcome = state.run_command(&command).await?;

            for handle in &outcome.triggered {
                println!("✓ Triggered {} (run {})", handle.target.descriptive_label, handle.run_id);
            }
            for failure in &outcome.failures {
                println!("✗ {}", failure.error);
            }
            if outcome.triggered.is_empty() {
                return Err(anyhow!("No workflow could be triggered"));
            }

            if no_watch {
                println!();
                println!("⏳ Runs continue in GitHub Actions. Check them with `todd status`.");
            } else {
                watch(&state).await?;
            }
        }

        Commands::Preview { command } => {
            let state = ApiState::from_settings(settings).await?;
            state.tracker.stop().await;
            let preview = state.preview_command(&command).await?;

            println!("{} workflow(s) via {:?}", preview.total, preview.source);
            for target in &preview.targets {
                println!("  {} → {}", target.repository_full_name, target.workflow_name);
                for (key, value) in &target.input_parameters {
                    if key == "password" {
                        println!("      {}: ********", key);
                    } else {
                        println!("      {}: {}", key, value);
                    }
                }
            }
        }

        Commands::Status => {
            let state = ApiState::from_settings(settings).await?;
            state.tracker.stop().await;
            for handle in state.store.pending_handles().await {
                state.tracker.refresh(&handle).await;
            }
            state.persist().await;

            let runs = state.store.snapshot().await;
            if runs.is_empty() {
                println!("No tracked runs");
            }
            for run in runs.runs() {
                print_run(run);
            }
            println!("Phase: {}", state.tracker.phase().await);
        }

        Commands::Cancel { run_id } => {
            let state = ApiState::from_settings(settings).await?;
            state.tracker.stop().await;

            match state.tracker.cancel_run(run_id).await {
                Ok(()) => println!("✓ Cancellation requested for run {}", run_id),
                Err(e @ CancelError::AlreadyFinished(_)) => println!("{}", e),
                Err(e) => return Err(e.into()),
            }

            // The tracker re-fetches the run after the nudge delay and
            // caches the result; stay alive until that has happened.
            tokio::time::sleep(state.settings.cancel_refresh_delay() + NUDGE_GRACE).await;
            if let Some(run) = state.store.get_run(run_id).await {
                print_run(&run);
            }
        }

        Commands::Workflows { repository } => {
            let repo = Repository::parse(&repository)?;
            let token = settings
                .github_token
                .clone()
                .ok_or_else(|| anyhow!("GITHUB_TOKEN must be set"))?;
            let client = GitHubClient::with_api_url(token, &settings.github_api_url)?;

            let workflows = client.list_workflows(&repo).await?;
            println!("{} workflow(s) in {}", workflows.len(), repo);
            for workflow in workflows {
                let marker = if workflow.is_active() { "✓" } else { "✗" };
                println!("  {} {} ({})", marker, workflow.name, workflow.file_name());
            }
        }

        Commands::Summarize { log_file } => {
            let text = tokio::fs::read_to_string(&log_file)
                .await
                .with_context(|| format!("Failed to read {}", log_file))?;

            let summary = extract_summary(&text);
            if summary.is_empty() {
                println!("No test results found in {}", log_file);
            } else {
                print_summary(&summary);
            }
            if let Some(errors) = extract_error_summary(&text) {
                println!();
                println!("{}", errors);
            }
        }

        Commands::Clear => {
            let state = ApiState::from_settings(settings).await?;
            state.clear_history().await?;
            println!("✓ Cleared tracked runs and chat history");
        }

        Commands::Serve { port } => {
            let state = ApiState::from_settings(settings).await?;
            todd_api::serve(state, port).await?;
        }
    }

    Ok(())
}

/// Print status changes until the tracker settles or the user interrupts.
async fn watch(state: &ApiState) -> Result<()> {
    let mut seen: HashMap<u64, RunStatus> = HashMap::new();

    loop {
        for run in state.store.snapshot().await.runs() {
            if seen.insert(run.run_id(), run.status) != Some(run.status) {
                println!("  run {}: {}", run.run_id(), run.status);
            }
        }

        if !state.tracker.is_polling().await {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(WATCH_INTERVAL) => {}
            _ = tokio::signal::ctrl_c() => {
                state.tracker.stop().await;
                println!();
                println!("⏳ Stopped watching. Runs continue in GitHub Actions.");
                return Ok(());
            }
        }
    }

    println!();
    for run in state.store.snapshot().await.runs() {
        print_run(run);
    }
    println!("Phase: {}", state.tracker.phase().await);
    Ok(())
}

fn print_run(run: &RunState) {
    let label = &run.handle.target.descriptive_label;
    match run.status {
        RunStatus::Completed => println!("✓ {} (run {})", label, run.run_id()),
        RunStatus::Failed => println!("✗ {} (run {})", label, run.run_id()),
        status => println!("• {} (run {}): {}", label, run.run_id(), status),
    }

    let summary = run.test_summary();
    if !summary.is_empty() {
        print!("  ");
        print_summary(&summary);
    }
    if let Some(url) = &run.html_url {
        println!("  {}", url);
    }
    if let Some(report) = &run.report_artifact {
        if report.is_viewable {
            println!("  Report: {}", report.name);
        } else {
            println!("  Report: {} (too large to view, download it from the run)", report.name);
        }
    }
    if let Some(errors) = &run.ai_error_summary {
        for line in errors.lines().take(5) {
            println!("    {}", line);
        }
    }
}

fn print_summary(summary: &TestSummary) {
    println!(
        "{} passed, {} failed, {} skipped ({} total)",
        summary.passed_count, summary.failed_count, summary.skipped_count, summary.total_count
    );
    for name in &summary.failed_test_names {
        println!("    ✗ {}", name);
    }
}
