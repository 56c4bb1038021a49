//! CLI subcommand handlers.

use crate::report;
use crate::{Commands, ConfigAction};
use anyhow::Context;
use hypersweep_core::config::{SETTINGS_FILE, SweepSettings, load_settings};
use hypersweep_core::store::{RESULTS_FILE, ResultStore};
use hypersweep_core::summary::SweepSummary;
use hypersweep_core::sweep::{ConfigModel, expand};
use hypersweep_core::{ControllerOptions, ProcessExecutor, SweepController};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, settings_file: Option<&Path>) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            sweep,
            output,
            concurrency,
            resume,
            timeout,
            retries,
        } => {
            let mut settings = load_settings(settings_file)
                .map_err(|e| anyhow::anyhow!("Settings error: {}", e))?;
            apply_run_overrides(&mut settings, concurrency, timeout, retries);
            settings
                .validate()
                .map_err(|e| anyhow::anyhow!("Settings error: {}", e))?;
            handle_run(&sweep, &output, resume, &settings).await
        }
        Commands::Expand { sweep, json } => {
            let settings = load_settings(settings_file)
                .map_err(|e| anyhow::anyhow!("Settings error: {}", e))?;
            handle_expand(&sweep, json, &settings)
        }
        Commands::Summary { output } => handle_summary(&output),
        Commands::Config { action } => handle_config(action, settings_file),
    }
}

fn apply_run_overrides(
    settings: &mut SweepSettings,
    concurrency: Option<usize>,
    timeout: Option<u64>,
    retries: Option<u32>,
) {
    if let Some(k) = concurrency {
        settings.execution.concurrency = k;
    }
    if let Some(secs) = timeout {
        settings.execution.timeout_secs = Some(secs);
    }
    if let Some(n) = retries {
        settings.execution.max_retries = n;
    }
}

fn load_model(sweep: &Path, settings: &SweepSettings) -> anyhow::Result<ConfigModel> {
    let model = ConfigModel::from_path(sweep)
        .with_context(|| format!("Invalid sweep document {}", sweep.display()))?;
    model
        .validate_known(&settings.trainer.known_parameters)
        .with_context(|| format!("Invalid sweep document {}", sweep.display()))?;
    Ok(model)
}

async fn handle_run(
    sweep: &Path,
    output: &Path,
    resume: bool,
    settings: &SweepSettings,
) -> anyhow::Result<()> {
    let model = load_model(sweep, settings)?;
    let options = ControllerOptions {
        concurrency: settings.execution.concurrency,
        resume,
    };
    let executor = ProcessExecutor::new(settings);
    let mut controller = SweepController::new(executor, output, options)
        .with_context(|| format!("Cannot open output root {}", output.display()))?;

    info!(sweep = %sweep.display(), output = %output.display(), "Running sweep");

    let summary = tokio::select! {
        result = controller.run(&model) => result.context("Sweep aborted")?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; in-flight runs were stopped");
            anyhow::bail!(
                "Sweep interrupted. Re-run with --resume to continue from {}",
                output.display()
            );
        }
    };

    print!("{}", report::render_summary(&summary));
    Ok(())
}

fn handle_expand(sweep: &Path, json: bool, settings: &SweepSettings) -> anyhow::Result<()> {
    let model = load_model(sweep, settings)?;
    let expansion = expand(&model);

    if json {
        for run in &expansion.runs {
            let line = serde_json::json!({
                "id": run.short_id(),
                "group": run.group(),
                "params": run.to_json_object(),
            });
            println!("{line}");
        }
    } else {
        print!("{}", report::render_expansion(&expansion));
    }
    Ok(())
}

fn handle_summary(output: &Path) -> anyhow::Result<()> {
    if let Some(summary) = SweepSummary::load(output)
        .with_context(|| format!("Cannot read summary in {}", output.display()))?
    {
        print!("{}", report::render_summary(&summary));
        return Ok(());
    }

    if !output.join(RESULTS_FILE).exists() {
        anyhow::bail!("No sweep results found in {}", output.display());
    }
    let store = ResultStore::open(output)?;
    println!(
        "No summary file (sweep did not finish); {} recorded run(s):",
        store.len()
    );
    let mut records: Vec<_> = store.records().into_iter().cloned().collect();
    records.sort_by_key(|r| r.index);
    print!("{}", report::render_records(&records));
    Ok(())
}

fn handle_config(action: ConfigAction, settings_file: Option<&Path>) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init { path, force } => {
            let path = path.unwrap_or_else(|| PathBuf::from(SETTINGS_FILE));
            if path.exists() && !force {
                println!("Settings file already exists at: {}", path.display());
                return Ok(());
            }
            let toml_str = toml::to_string_pretty(&SweepSettings::default())?;
            std::fs::write(&path, &toml_str)?;
            println!("Created default settings at: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let settings = load_settings(settings_file)
                .map_err(|e| anyhow::anyhow!("Settings error: {}", e))?;
            print!("{}", toml::to_string_pretty(&settings)?);
            Ok(())
        }
    }
}
