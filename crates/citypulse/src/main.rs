mod bootstrap;
mod report;

use anyhow::{bail, Result};
use chrono::Utc;
use citypulse_core::actuator::{Actuator, ActuationRecord, SimulatedActuator};
use citypulse_core::alerts::Thresholds;
use citypulse_core::settings::Settings;
use citypulse_core::timestamp::resolve_timezone;
use citypulse_data::analysis::{AnalysisOptions, AnalysisResult};
use citypulse_data::fetcher::{Fetcher, Source};
use citypulse_runtime::orchestrator::RefreshOrchestrator;
use citypulse_runtime::session::DashboardSession;
use report::{Renderer, View};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("CityPulse v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "View: {}, Format: {}, Timezone: {}",
        settings.view,
        settings.format,
        settings.timezone
    );

    let source = match (&settings.source, bootstrap::discover_data_path()) {
        (Some(locator), _) => Source::parse(locator),
        (None, Some(path)) => Source::File(path),
        (None, None) => bail!(
            "no data source: pass --source or place {} in the working directory",
            bootstrap::DEFAULT_CSV_NAME
        ),
    };

    let tz = resolve_timezone(&settings.timezone);
    let options = AnalysisOptions {
        timestamps: settings.timestamp_parser(),
        window: settings.date_window(Utc::now())?,
        thresholds: Thresholds::default(),
        display_tz: tz,
        ..AnalysisOptions::default()
    };
    let renderer = Renderer::new(View::parse(&settings.view), tz);
    let fetcher = Fetcher::new();

    if settings.watch {
        tracing::info!("Watching {} every {}s", source, settings.refresh_secs);
        let orchestrator =
            RefreshOrchestrator::new(source, fetcher, options, settings.refresh_interval());
        let (mut rx, handle) = orchestrator.start();

        loop {
            tokio::select! {
                snapshot = rx.recv() => {
                    let Some(snapshot) = snapshot else { break };
                    match snapshot.result {
                        Ok(result) => emit(&settings, &renderer, &result)?,
                        Err(e) => eprintln!("Refresh #{} failed: {}", snapshot.sequence, e),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received; stopping refresh loop");
                    break;
                }
            }
        }
        handle.abort();
        return Ok(());
    }

    let mut session = DashboardSession::new(source, fetcher, options);
    let cancel = session.cancel_handle();
    tokio::select! {
        loaded = session.load() => {
            loaded?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received; cancelling load");
            cancel.cancel();
            return Ok(());
        }
    }

    match session.analysis() {
        Some(result) => emit(&settings, &renderer, &result)?,
        None => println!("No data available"),
    }

    Ok(())
}

/// Print one analysis, running its suggested commands through the simulator
/// first when `--simulate-actuation` is set.
fn emit(settings: &Settings, renderer: &Renderer, result: &AnalysisResult) -> Result<()> {
    let actuations = if settings.simulate_actuation {
        simulate(result)
    } else {
        Vec::new()
    };

    if settings.format == "json" {
        println!("{}", renderer.render_json(result, &actuations)?);
    } else {
        print!("{}", renderer.render_text(result, &actuations));
    }
    Ok(())
}

fn simulate(result: &AnalysisResult) -> Vec<ActuationRecord> {
    let mut actuator = SimulatedActuator::new();
    for alert in &result.alerts {
        actuator.apply_all(&alert.suggested_actions);
    }
    actuator.history().to_vec()
}
