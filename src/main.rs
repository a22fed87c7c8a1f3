use std::{fs, path::PathBuf, str::FromStr};

use anyhow::{Context, anyhow};
use clap::Parser;
use flexi_logger::{
    Age, Cleanup, Criterion, Duplicate, FileSpec, LogSpecBuilder, Logger, LoggerHandle, Naming,
};
use greetshell::{
    MonitorConfigs, SurfaceManager,
    config::{self, DEFAULT_CONFIG_PATH},
    display::{Geometry, MonitorInfo},
    offscreen::{OffscreenServer, OffscreenWidget},
};
use image::RgbaImage;
use log::{LevelFilter, info};

/// Renders the login backdrops of a configuration for a given monitor
/// layout, without a running display server.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Monitor as NAME=WIDTHxHEIGHT+X+Y, in index order. Use `-` as the
    /// name of an unnamed monitor
    #[arg(short, long = "monitor", value_parser = parse_monitor)]
    monitors: Vec<MonitorInfo>,

    /// Index of the primary monitor
    #[arg(long)]
    primary: Option<usize>,

    /// Pointer position as X,Y in virtual screen coordinates
    #[arg(long, value_parser = parse_pointer)]
    pointer: Option<(i32, i32)>,

    /// Directory the rendered backdrops are written to
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Overrides the log level of the configuration file
    #[arg(long)]
    log_level: Option<String>,
}

fn parse_monitor(value: &str) -> Result<MonitorInfo, String> {
    let (name, geometry) = value
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=WIDTHxHEIGHT+X+Y, got '{value}'"))?;

    let mut parts = geometry.splitn(3, '+');
    let size = parts.next().unwrap_or_default();
    let (width, height) = size
        .split_once('x')
        .ok_or_else(|| format!("invalid monitor size '{size}'"))?;

    let number = |value: Option<&str>| -> Result<i32, String> {
        value
            .unwrap_or("0")
            .trim()
            .parse()
            .map_err(|e| format!("invalid monitor position in '{geometry}': {e}"))
    };
    let dimension = |value: &str| -> Result<u32, String> {
        value
            .trim()
            .parse()
            .map_err(|e| format!("invalid monitor size '{size}': {e}"))
    };

    Ok(MonitorInfo {
        name: Some(name.trim())
            .filter(|name| !name.is_empty() && *name != "-")
            .map(str::to_owned),
        geometry: Geometry::new(
            number(parts.next())?,
            number(parts.next())?,
            dimension(width)?,
            dimension(height)?,
        ),
    })
}

fn parse_pointer(value: &str) -> Result<(i32, i32), String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got '{value}'"))?;

    let coordinate = |value: &str| {
        value
            .trim()
            .parse::<i32>()
            .map_err(|e| format!("invalid pointer coordinate '{value}': {e}"))
    };

    Ok((coordinate(x)?, coordinate(y)?))
}

fn init_logger(level: &str) -> anyhow::Result<LoggerHandle> {
    let level = LevelFilter::from_str(level).map_err(|_| anyhow!("Invalid log level '{level}'"))?;

    let logger = Logger::with(
        LogSpecBuilder::new()
            .module(
                "greetshell",
                if cfg!(debug_assertions) {
                    LevelFilter::Debug
                } else {
                    level
                },
            )
            .build(),
    )
    .log_to_file(FileSpec::default().directory("/tmp/greetshell"))
    .duplicate_to_stderr(Duplicate::All)
    .rotate(
        Criterion::Age(Age::Day),
        Naming::Timestamps,
        Cleanup::KeepLogFiles(7),
    )
    .start()?;

    Ok(logger)
}

fn login_panel() -> OffscreenWidget {
    OffscreenWidget::new()
        .with_entry("username", "")
        .with_entry("password", "")
        .with_button("login")
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = config::read_config(&args.config)?;
    let _logger = init_logger(args.log_level.as_deref().unwrap_or(&config.log_level))?;

    let monitors = if args.monitors.is_empty() {
        info!("No monitors given, assuming a single 1920x1080 monitor");
        vec![MonitorInfo {
            name: None,
            geometry: Geometry::new(0, 0, 1920, 1080),
        }]
    } else {
        args.monitors
    };

    let mut server = OffscreenServer::new(monitors).with_primary(args.primary.or(Some(0)));
    if let Some((x, y)) = args.pointer {
        server = server.with_pointer(x, y);
    }

    let mut manager =
        SurfaceManager::new(server, MonitorConfigs::from_config(&config), login_panel());
    manager.add_accel_group("a11y".to_owned());
    manager.add_accel_group("power".to_owned());
    manager
        .rebuild()
        .context("Failed to set up monitor backdrops")?;

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    for surface in manager.surfaces() {
        let geometry = surface.geometry();
        if !surface.is_enabled() {
            println!(
                "{} #{}: skipped",
                surface.printable_name(),
                surface.index()
            );
            continue;
        }

        let mut canvas = RgbaImage::new(geometry.width, geometry.height);
        surface.paint(&mut canvas);

        let path = args.output.join(format!("{}.png", surface.window_name()));
        canvas
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        println!(
            "{} #{}: {}x{}+{}+{} {}{} -> {}",
            surface.printable_name(),
            surface.index(),
            geometry.width,
            geometry.height,
            geometry.x,
            geometry.y,
            surface.spec(),
            if surface.is_primary() { " (primary)" } else { "" },
            path.display()
        );
    }

    if let Some(active) = manager.active() {
        println!(
            "login UI on {} #{}",
            active.printable_name(),
            active.index()
        );
    }

    Ok(())
}
