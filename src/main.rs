use anyhow::{anyhow, Context, Result};
use clap::Parser;
use diskguard::app::{build_guard, install_signal_handlers, ControlFlags, DEFAULT_EVENT_CAPACITY};
use diskguard::config::{DiskguardConfig, LogicMode};
use diskguard::events::{EventBus, EventFilter, EventReceiver};
use std::path::Path;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

const DEFAULT_CONFIG_PATH: &str = "/etc/diskguard.toml";

#[derive(Parser, Debug)]
#[command(name = "diskguard")]
#[command(about = "Hard disk shock protection driven by the laptop accelerometer")]
#[command(version)]
#[command(long_about = "Watches the built-in accelerometer of a portable computer and parks \
the disk heads when a shock or fall is detected. Supports hdaps, ams, hp3d, applesmc and the \
/dev/freefall hardware fall detector.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", help = "Path to TOML configuration file")]
    config: Option<String>,

    /// Block device to protect, repeatable
    #[arg(short = 'd', long = "device", value_name = "DEVICE", help = "Disk to protect (e.g. sda)")]
    devices: Vec<String>,

    /// Sensitivity threshold
    #[arg(short, long, help = "Motion threshold; lower is more sensitive")]
    sensitivity: Option<f64>,

    /// Adaptive threshold
    #[arg(short, long, help = "Raise the threshold while keyboard or mouse are in use")]
    adaptive: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable info level logging and per-sample diagnostics")]
    verbose: bool,

    /// Enable debug logging (most verbose)
    #[arg(long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Run in the background
    #[arg(short, long, help = "Detach from the terminal and run as a daemon")]
    background: bool,

    #[arg(short, long, value_name = "FILE", help = "Write the daemon's PID to FILE")]
    pidfile: Option<String>,

    /// Dry run mode
    #[arg(short = 't', long, help = "Analyze motion but never write protect attributes")]
    dry_run: bool,

    #[arg(short = 'y', long, help = "Poll the position from sysfs instead of the input device")]
    poll_sysfs: bool,

    #[arg(short = 'H', long, conflicts_with = "software_logic", help = "Use the hardware fall detector")]
    hardware_logic: bool,

    #[arg(short = 'S', long, help = "Use software motion analysis even with a hardware detector")]
    software_logic: bool,

    #[arg(short = 'L', long, help = "Do not blink the protection LED")]
    no_leds: bool,

    #[arg(short, long, help = "Force head unloading on drives that do not claim support")]
    force: bool,

    #[arg(short = 'r', long, help = "Autodetect non-rotational drives too")]
    force_rotational: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit without starting protection")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => DiskguardConfig::load_from_file(path, true),
        None => DiskguardConfig::load_from_file(DEFAULT_CONFIG_PATH, false),
    }
    .context("Failed to load configuration")?;
    apply_overrides(&mut config, &args);

    if let Err(e) = config.validate() {
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }
    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(());
    }

    // Forking kills threads, so detach before the log writer and runtime exist
    if config.system.background {
        daemonize()?;
    }

    let log_guard = init_logging(&args, config.system.log_file.as_deref())?;
    info!("Starting diskguard v{}", env!("CARGO_PKG_VERSION"));

    lock_memory();

    let pidfile = config.system.pidfile.clone();
    if let Some(path) = &pidfile {
        std::fs::write(path, format!("{}\n", std::process::id()))
            .with_context(|| format!("Could not write pidfile {}", path))?;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    let result = runtime.block_on(run(config, args.verbose, args.debug));

    if let Some(path) = &pidfile {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Could not remove pidfile {}: {}", path, e);
        }
    }

    let exit_code = result.map_err(|e| {
        error!("{}", e);
        e
    })?;
    info!("diskguard exited with code: {}", exit_code);
    drop(log_guard);
    std::process::exit(exit_code);
}

async fn run(config: DiskguardConfig, verbose: bool, debug: bool) -> diskguard::Result<i32> {
    let flags = ControlFlags::new();
    install_signal_handlers(&flags)?;

    let bus = if debug {
        EventBus::with_debug_logging(DEFAULT_EVENT_CAPACITY)
    } else {
        EventBus::new(DEFAULT_EVENT_CAPACITY)
    };
    if verbose {
        let mut diagnostics = EventReceiver::new(
            bus.subscribe(),
            EventFilter::diagnostics(),
            "verbose".to_string(),
        );
        tokio::spawn(async move {
            while let Ok(event) = diagnostics.recv().await {
                println!("{}", event.description());
            }
        });
    }

    let mut guard = build_guard(&config, bus, flags).await?;
    guard.run().await
}

fn apply_overrides(config: &mut DiskguardConfig, args: &Args) {
    let protection = &mut config.protection;
    if !args.devices.is_empty() {
        protection.devices = args.devices.clone();
    }
    if let Some(sensitivity) = args.sensitivity {
        protection.sensitivity = sensitivity;
    }
    protection.adaptive |= args.adaptive;
    protection.dry_run |= args.dry_run;
    protection.force_unload |= args.force;
    protection.force_rotational |= args.force_rotational;

    if args.hardware_logic {
        config.sensor.logic = LogicMode::Hardware;
    } else if args.software_logic {
        config.sensor.logic = LogicMode::Software;
    }
    config.sensor.poll_sysfs |= args.poll_sysfs;
    config.indicator.leds &= !args.no_leds;

    config.system.background |= args.background;
    if args.pidfile.is_some() {
        config.system.pidfile = args.pidfile.clone();
    }
}

fn daemonize() -> Result<()> {
    // SAFETY: called before any other thread exists
    if unsafe { libc::daemon(0, 0) } != 0 {
        return Err(anyhow!(
            "Failed to detach: {}",
            std::io::Error::last_os_error()
        ));
    }
    Ok(())
}

/// Keep future pages resident so parking never waits on swap
fn lock_memory() {
    // SAFETY: mlockall takes no pointers
    if unsafe { libc::mlockall(libc::MCL_FUTURE) } != 0 {
        warn!(
            "Could not lock memory: {}",
            std::io::Error::last_os_error()
        );
    }
}

fn init_logging(args: &Args, log_file: Option<&str>) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("diskguard={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("pretty") => fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some("compact") | None => fmt::layer()
            .compact()
            .with_target(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().compact().with_target(false).boxed()
        }
    };

    let mut worker = None;
    let file_layer = match log_file {
        Some(path) => {
            let path = Path::new(path);
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow!("Invalid log file path {}", path.display()))?;
            let dir = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
            worker = Some(guard);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(worker)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Diskguard Configuration File");
    println!("# This is the default configuration with all available options");
    println!("# Environment variables override it, e.g. DISKGUARD_PROTECTION__SENSITIVITY=20");
    println!();
    let rendered = toml::to_string_pretty(&DiskguardConfig::default())
        .context("Failed to serialize default configuration")?;
    println!("{}", rendered);
    Ok(())
}
