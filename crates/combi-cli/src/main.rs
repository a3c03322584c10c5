//! combi-monitor: watch a combi device and log everything it reports.
//!
//! Opens every peripheral of one device, claims and enables it, then logs
//! events until Ctrl+C.
//!
//! # Usage
//!
//! With a configuration file:
//! ```bash
//! combi-monitor --config combi.toml
//! ```
//!
//! With jpos-style properties:
//! ```bash
//! combi-monitor --port 127.0.0.1:56789 -p PollDelay=100 -p MaxRetry=3
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`; `combi_transport=trace`
//! shows the wire traffic).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use combi_driver::peripherals::{DisplayAttribute, Repeat, Tone};
use combi_driver::{
    CashDrawer, Driver, DriverConfig, DriverRegistry, Keylock, LineDisplay, Msr, Peripheral,
    PosKeyboard, Scanner, ToneIndicator,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "combi-monitor")]
#[command(about = "Watch a combi device and log its events", long_about = None)]
struct Cli {
    /// Driver configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial port name or host:port, overrides the configuration file
    #[arg(long)]
    port: Option<String>,

    /// jpos-style property such as PollDelay=100, may be repeated.
    /// Only used without a configuration file
    #[arg(short = 'p', long = "property", value_parser = parse_property)]
    properties: Vec<(String, String)>,

    /// Text shown on the line display
    #[arg(long, default_value = "combi-monitor")]
    banner: String,

    /// Beep once after startup
    #[arg(long)]
    beep: bool,
}

fn parse_property(value: &str) -> std::result::Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| format!("expected Name=Value, got '{}'", value))
}

fn load_config(cli: &Cli) -> Result<DriverConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str::<DriverConfig>(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => {
            let Some(port) = &cli.port else {
                bail!("either --config or --port is required");
            };
            let properties: HashMap<String, String> = cli.properties.iter().cloned().collect();
            DriverConfig::from_properties(port, &properties)?
        }
    };
    if let Some(port) = &cli.port {
        config.com_port = port.clone();
    }
    Ok(config)
}

/// Every peripheral of one device.
struct Devices {
    drawer: CashDrawer,
    keylock: Keylock,
    electronic_key: Keylock,
    display: LineDisplay,
    msr: Msr,
    keyboard: PosKeyboard,
    scanner: Scanner,
    tone: ToneIndicator,
}

impl Devices {
    fn new(driver: Arc<Driver>) -> Self {
        Self {
            drawer: CashDrawer::new(driver.clone()),
            keylock: Keylock::new(driver.clone()),
            electronic_key: Keylock::electronic(driver.clone()),
            display: LineDisplay::new(driver.clone()),
            msr: Msr::new(driver.clone()),
            keyboard: PosKeyboard::new(driver.clone()),
            scanner: Scanner::new(driver.clone()),
            tone: ToneIndicator::new(driver),
        }
    }

    async fn start(&mut self, banner: &str, beep: bool) -> Result<()> {
        activate(&mut self.drawer).await?;
        activate(&mut self.keylock).await?;
        activate(&mut self.electronic_key).await?;
        activate(&mut self.display).await?;
        activate(&mut self.msr).await?;
        activate(&mut self.keyboard).await?;
        activate(&mut self.scanner).await?;
        activate(&mut self.tone).await?;

        info!("{}", self.drawer.check_health()?);
        if let Err(e) = self.scanner.set_data_event_enabled(true) {
            warn!(error = %e, "Scanner not enabled");
        }
        if let Err(e) = self
            .display
            .display_text(banner, DisplayAttribute::Normal)
            .await
        {
            warn!(error = %e, "Banner not shown");
        }
        if beep {
            let tone = Tone::new(Duration::from_millis(200));
            if let Err(e) = self
                .tone
                .sound(
                    tone,
                    Tone::silent(),
                    Duration::ZERO,
                    Duration::ZERO,
                    Repeat::Times(1),
                )
                .await
            {
                warn!(error = %e, "Beep failed");
            }
        }
        Ok(())
    }

    /// Log events until Ctrl+C.
    async fn watch(&mut self) {
        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!(error = %e, "Ctrl+C handler failed");
                    }
                    break;
                }
                Some(event) = self.drawer.next_event() => info!(event = ?event.kind, "Cash drawer"),
                Some(event) = self.keylock.next_event() => info!(event = ?event.kind, "Keylock"),
                Some(event) = self.electronic_key.next_event() => {
                    info!(event = ?event.kind, "Electronic key");
                }
                Some(event) = self.msr.next_event() => info!(?event, "MSR"),
                Some(event) = self.keyboard.next_event() => info!(?event, "Keyboard"),
                Some(event) = self.scanner.next_event() => info!(?event, "Scanner"),
            }
        }
    }

    async fn stop(&mut self) {
        for result in [
            self.drawer.close().await,
            self.keylock.close().await,
            self.electronic_key.close().await,
            self.display.close().await,
            self.msr.close().await,
            self.keyboard.close().await,
            self.scanner.close().await,
            self.tone.close().await,
        ] {
            if let Err(e) = result {
                warn!(error = %e, "Close failed");
            }
        }
    }
}

async fn activate<P: Peripheral>(peripheral: &mut P) -> Result<()> {
    peripheral.open().await?;
    peripheral.claim().await?;
    peripheral.set_enabled(true).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let registry = DriverRegistry::new();
    let driver = registry.acquire(&config)?;
    let target = driver.target().to_string();

    let mut devices = Devices::new(driver.clone());
    devices.start(&cli.banner, cli.beep).await?;
    info!(
        port = %target,
        state = %driver.connection_state(),
        "Monitoring, press Ctrl+C to stop"
    );

    devices.watch().await;
    info!("Shutting down");
    devices.stop().await;
    registry.release(&target);
    Ok(())
}
