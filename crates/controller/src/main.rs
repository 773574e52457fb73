mod config;
mod gpio;
mod status;

use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use std::{env, time::Duration};
use time::{OffsetDateTime, UtcOffset};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sprinkler_engine::{Clock, OutputDriver, Scheduler, WeatherAdjust};
use status::{ControllerState, StateLog, StatusWriter};

// ---------------------------------------------------------------------------
// Collaborator implementations
// ---------------------------------------------------------------------------

/// System wall clock shifted into the controller's local offset.
struct SystemClock {
    offset: UtcOffset,
}

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }
}

/// Weather scale from the config file. A live weather feed would slot in
/// here; the engine only ever asks for the current percentage.
struct FixedWeather(u8);

impl WeatherAdjust for FixedWeather {
    fn scale_percent(&self) -> u8 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::load(&config_path)?;
    cfg.validate()?;

    let settings = cfg.to_settings();
    let mode = cfg
        .controller
        .output_mode()
        .context("output mode missing after validation")?;

    info!(
        config = %config_path,
        zones = settings.zones.len(),
        schedules = settings.schedules.len(),
        ?mode,
        "config loaded"
    );

    // ── Shared state (ephemeral, for the status snapshot) ───────────
    let zone_names: Vec<String> = settings.zones.iter().map(|z| z.name.clone()).collect();
    let shared: status::SharedState = Arc::new(Mutex::new(ControllerState::new(zone_names)));
    if let Ok(mut st) = shared.lock() {
        st.record_system("controller started".to_string());
    }

    // ── Output driver + engine ──────────────────────────────────────
    let backend = gpio::build(&cfg)?;
    let output = OutputDriver::new(mode, cfg.output_pins(), settings.zones.len() as u8, backend);

    let offset = UtcOffset::from_hms(cfg.controller.utc_offset_hours, 0, 0)
        .context("invalid utc offset")?;
    let mut scheduler = Scheduler::new(
        SystemClock { offset },
        FixedWeather(cfg.controller.weather_percent),
        StateLog(Arc::clone(&shared)),
        output,
        cfg.controller.event_capacity,
    );
    scheduler.start(&settings);

    let mut status_writer = cfg.controller.status_path.as_deref().map(StatusWriter::new);

    // ── Tick loop ───────────────────────────────────────────────────
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                scheduler.tick(&settings);

                if let Some(writer) = status_writer.as_mut() {
                    let engine_status = scheduler.status();
                    if let Ok(st) = shared.lock() {
                        if let Err(e) = writer.write(&st.to_report(&engine_status)) {
                            warn!("status write failed: {e}");
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received, forcing all outputs off");
                scheduler.all_off();
                if let Ok(mut st) = shared.lock() {
                    st.record_system("controller stopped".to_string());
                }
                break;
            }
        }
    }

    Ok(())
}
