//! # Low Tide Finder Entry Point
//!
//! Fetches the forecast once at startup, then keeps two independent timers
//! running: a live-conditions refresh and a clock redraw. Filter changes are
//! typed on stdin as query strings (`days=14&depth=1.2`), `units` switches
//! between meters and feet, `refresh` refetches, and `quit` exits.
//!
//! `--once` prints a single forecast and live readout and exits, which is handy
//! for cron jobs and for checking a configuration.

use anyhow::Context;
use chrono::{Local, Utc};
use low_tide_lib::config::{Config, FilterConfig, FilterIntake};
use low_tide_lib::live::LiveMonitor;
use low_tide_lib::pipeline::{FetchSettings, ForecastPipeline};
use low_tide_lib::renderer;
use low_tide_lib::tide_data::IwlsClient;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Forecast = ForecastPipeline<IwlsClient, Local>;
type Live = LiveMonitor<IwlsClient>;

/// Command line options.
#[derive(Debug, Default)]
struct Args {
    once: bool,
    config_path: Option<String>,
    query: Option<String>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mut parsed = Args::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--once" => parsed.once = true,
                "--config" => {
                    parsed.config_path = Some(args.next().context("--config needs a path")?)
                }
                flag if flag.starts_with("--") => anyhow::bail!("unknown option {flag}"),
                _ => parsed.query = Some(arg),
            }
        }
        Ok(parsed)
    }
}

/// What a line typed on stdin asks for.
enum Command {
    Quit,
    SwitchUnits,
    Refresh,
    Submit(FilterIntake),
}

impl Command {
    fn parse(line: &str) -> Option<anyhow::Result<Self>> {
        let line = line.trim();
        match line {
            "" => None,
            "q" | "quit" | "exit" => Some(Ok(Command::Quit)),
            "u" | "units" => Some(Ok(Command::SwitchUnits)),
            "r" | "refresh" => Some(Ok(Command::Refresh)),
            query => Some(
                FilterIntake::parse_query(query)
                    .map(Command::Submit)
                    .map_err(anyhow::Error::from),
            ),
        }
    }
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().or_else(|_| {
                tracing_subscriber::EnvFilter::try_new("low_tide_finder=info,low_tide_lib=info")
            })?,
        )
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let args = Args::parse(std::env::args().skip(1))?;
    let config = match &args.config_path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };

    let intake = FilterIntake::parse_query(args.query.as_deref().unwrap_or_default())?;
    if intake.is_empty() {
        info!("No filter given, using the configured defaults");
    }
    let filter = intake.resolve(&config.forecast)?;
    info!(
        "Station {} ({}, {}), {} days, under {} {}, {}:00-{}:00",
        config.station.name,
        config.station.id,
        config.station.timezone_label,
        filter.window_days,
        filter.depth_ceiling,
        filter.unit,
        filter.hour_start,
        filter.hour_end
    );

    let client = IwlsClient::connect(&config)
        .await
        .context("could not reach the tide data service")?;

    let forecast: Arc<Forecast> = Arc::new(ForecastPipeline::new(
        client.clone(),
        Local,
        FetchSettings::from(&config.upstream),
        filter,
    ));
    let live: Arc<Live> = Arc::new(LiveMonitor::new(
        client,
        config.upstream.live_window(),
        filter.unit,
    ));

    if args.once {
        let now = Utc::now();
        // Failures are already recorded in the snapshots
        let _ = tokio::join!(forecast.refresh(now), live.refresh(now));
        renderer::draw_forecast(&forecast.snapshot(), &Local::now());
        println!("{}", renderer::format_live(&live.snapshot(), &Local::now()));
        return Ok(());
    }

    run(forecast, live, &config).await
}

async fn run(forecast: Arc<Forecast>, live: Arc<Live>, config: &Config) -> anyhow::Result<()> {
    let mut clock = interval(config.refresh.clock_period());
    clock.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut live_tick = interval(config.refresh.live_period());
    live_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut forecast_rx = forecast.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    spawn_forecast(&forecast, None);

    loop {
        tokio::select! {
            _ = clock.tick() => {
                print!("\r{}\x1b[K", renderer::format_live(&live.snapshot(), &Local::now()));
                let _ = std::io::stdout().flush();
            }
            _ = live_tick.tick() => {
                let live = Arc::clone(&live);
                tokio::spawn(async move {
                    let _ = live.refresh(Utc::now()).await;
                });
            }
            Ok(()) = forecast_rx.changed() => {
                let snapshot = forecast_rx.borrow_and_update().clone();
                renderer::draw_forecast(&snapshot, &Local::now());
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(err) => {
                        warn!("stdin closed: {}", err);
                        break;
                    }
                };
                match Command::parse(&line) {
                    None => {}
                    Some(Err(err)) => warn!("{}", err),
                    Some(Ok(Command::Quit)) => break,
                    Some(Ok(Command::Refresh)) => spawn_forecast(&forecast, None),
                    Some(Ok(Command::SwitchUnits)) => {
                        let unit = forecast.snapshot().config.unit.other();
                        forecast.switch_unit(unit);
                        live.switch_unit(unit);
                        info!("Switched to {}", unit);
                    }
                    Some(Ok(Command::Submit(intake))) => {
                        match intake.apply_to(&forecast.snapshot().config) {
                            Ok(filter) => {
                                live.switch_unit(filter.unit);
                                spawn_forecast(&forecast, Some(filter));
                            }
                            Err(err) => warn!("{}", err),
                        }
                    }
                }
            }
        }
    }

    println!();
    Ok(())
}

/// Run a forecast cycle without blocking the timers; a newer cycle supersedes it.
fn spawn_forecast(forecast: &Arc<Forecast>, filter: Option<FilterConfig>) {
    let forecast = Arc::clone(forecast);
    tokio::spawn(async move {
        let now = Utc::now();
        let _ = match filter {
            Some(filter) => forecast.submit(filter, now).await,
            None => forecast.refresh(now).await,
        };
    });
}
