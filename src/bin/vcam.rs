//! VCam CLI - Command-line interface for the VCam bridge
//!
//! Commands:
//! - catalog: List the built-in input keys for a tracking mode
//! - defaults: Write a mapping document with the default mappings
//! - validate: Check a mapping document
//! - scale: Evaluate the scaling function for one sample
//! - process: Run one tracking frame through a mapping table
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use tracing::debug;
use tracing_subscriber::EnvFilter;

use vcam_bridge::catalog::TrackingCatalog;
use vcam_bridge::config::{find_config_file, BridgeConfig};
use vcam_bridge::store::{MappingDocument, MappingStore};
use vcam_bridge::{
    Bridge, BridgeError, TrackingEngine, TrackingFrame, TrackingKey, TrackingMode, PRODUCER_NAME,
    VCAM_VERSION,
};

/// VCam - tracking mapping and renderer bridge tools
#[derive(Parser)]
#[command(name = "vcam")]
#[command(version = VCAM_VERSION)]
#[command(about = "Inspect and validate avatar tracking mappings", long_about = None)]
struct Cli {
    /// Configuration file (defaults to $VCAM_CONFIG_PATH, then ./vcam.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in input keys for a tracking mode
    Catalog {
        /// Tracking mode (blendShape or perfectSync)
        #[arg(long, default_value = "blendShape")]
        mode: TrackingMode,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a mapping document containing the default mappings
    Defaults {
        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Check a mapping document
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Scale one raw sample onto [-1, 1]
    Scale {
        /// Raw sample
        #[arg(allow_negative_numbers = true)]
        raw: f32,

        /// Use the catalog range of this key
        #[arg(long, conflicts_with = "range")]
        key: Option<String>,

        /// Explicit range as MIN MAX
        #[arg(long, num_args = 2, allow_negative_numbers = true, value_names = ["MIN", "MAX"])]
        range: Option<Vec<f32>>,
    },

    /// Run one tracking frame through a mapping table
    Process {
        /// Tracking mode (blendShape or perfectSync)
        #[arg(long, default_value = "blendShape")]
        mode: TrackingMode,

        /// Frame as a JSON object of key to raw sample (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Mapping document (defaults to the configured mappings)
        #[arg(long)]
        mappings: Option<PathBuf>,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match BridgeConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            print_error(VcamCliError::from(e));
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.log_filter);

    match run(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn print_error(e: VcamCliError) {
    eprintln!(
        "{}",
        serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
    );
}

fn run(cli: Cli, config: &BridgeConfig) -> Result<(), VcamCliError> {
    match cli.command {
        Commands::Catalog { mode, json } => cmd_catalog(config, mode, json),
        Commands::Defaults { output } => cmd_defaults(config, &output),
        Commands::Validate { input, json } => cmd_validate(config, &input, json),
        Commands::Scale { raw, key, range } => cmd_scale(config, raw, key.as_deref(), range),
        Commands::Process {
            mode,
            input,
            mappings,
        } => cmd_process(config, mode, &input, mappings.as_deref()),
        Commands::Doctor { json } => cmd_doctor(cli.config.as_deref(), config, json),
    }
}

fn read_input(input: &Path) -> Result<String, VcamCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn cmd_catalog(config: &BridgeConfig, mode: TrackingMode, json: bool) -> Result<(), VcamCliError> {
    let keys: Vec<CatalogEntry> = config
        .catalog()
        .available_input_keys(mode)
        .into_iter()
        .map(|key| CatalogEntry {
            slot: TrackingCatalog::slot_index(mode, &key.key),
            key,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&keys)?);
        return Ok(());
    }

    println!("Catalog: {} ({:?})", mode, config.catalog);
    println!("{:<6} {:<22} {:>16} {:>16}", "slot", "key", "bounds", "range");
    for entry in &keys {
        let slot = entry.slot.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
        println!(
            "{:<6} {:<22} {:>16} {:>16}",
            slot,
            entry.key.key,
            format!("{}..{}", entry.key.bounds_min, entry.key.bounds_max),
            format!("{}..{}", entry.key.range_min, entry.key.range_max),
        );
    }
    Ok(())
}

fn cmd_defaults(config: &BridgeConfig, output: &Path) -> Result<(), VcamCliError> {
    let store = MappingStore::new(config.catalog());
    for mode in TrackingMode::ALL {
        store.reset_to_defaults(mode);
    }

    if output.to_string_lossy() == "-" {
        println!("{}", store.to_json()?);
    } else {
        store.save_file(output)?;
        eprintln!("Wrote default mappings to {}", output.display());
    }
    Ok(())
}

fn cmd_validate(config: &BridgeConfig, input: &Path, json: bool) -> Result<(), VcamCliError> {
    let document = MappingDocument::from_json(&read_input(input)?)?;
    let catalog = config.catalog();

    let mut issues = Vec::new();
    let mut seen = HashSet::new();
    let mut counts = BTreeMap::new();

    for mode in TrackingMode::ALL {
        let entries = document.mappings.get(mode);
        counts.insert(mode.to_string(), entries.len());

        for (index, entry) in entries.iter().enumerate() {
            let mut push = |severity: Severity, message: String| {
                issues.push(ValidationIssue {
                    mode: mode.to_string(),
                    index,
                    severity,
                    message,
                })
            };

            if !seen.insert(entry.id) {
                push(Severity::Error, format!("duplicate id {}", entry.id));
            }
            for (side, key) in [("input", &entry.input), ("output", &entry.output_key)] {
                if !key.range_within_bounds() {
                    push(
                        Severity::Warning,
                        format!(
                            "{} {} range {}..{} exceeds bounds {}..{}",
                            side, key.key, key.range_min, key.range_max, key.bounds_min, key.bounds_max
                        ),
                    );
                }
            }
            if !catalog.contains(&entry.input.key) {
                push(
                    Severity::Warning,
                    format!("input {} is not provided by the {:?} catalog", entry.input.key, catalog.variant()),
                );
            }
            if TrackingCatalog::slot_index(mode, &entry.output_key.key).is_none() {
                push(
                    Severity::Warning,
                    format!("output {} has no slot in the {} array", entry.output_key.key, mode),
                );
            }
        }
    }

    let errors = issues.iter().filter(|i| matches!(i.severity, Severity::Error)).count();
    let report = ValidationReport {
        version: document.version,
        saved_at: document.saved_at.to_rfc3339(),
        entries: counts,
        errors,
        warnings: issues.len() - errors,
        issues,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Version:  {}", report.version);
        println!("Saved at: {}", report.saved_at);
        for (mode, count) in &report.entries {
            println!("{:<12} {} entries", format!("{}:", mode), count);
        }

        if !report.issues.is_empty() {
            println!("\nIssues:");
            for issue in &report.issues {
                let tag = match issue.severity {
                    Severity::Warning => "[WARN]",
                    Severity::Error => "[ERR]",
                };
                println!("  {} {}[{}]: {}", tag, issue.mode, issue.index, issue.message);
            }
        }
    }

    if report.errors > 0 {
        Err(VcamCliError::ValidationFailed(report.errors))
    } else {
        Ok(())
    }
}

fn cmd_scale(
    config: &BridgeConfig,
    raw: f32,
    key: Option<&str>,
    range: Option<Vec<f32>>,
) -> Result<(), VcamCliError> {
    let tracking_key = match (key, range) {
        (Some(name), _) => config
            .catalog()
            .find(name)
            .ok_or_else(|| VcamCliError::InvalidArgument(format!("unknown key: {name}")))?,
        (None, Some(range)) => match range[..] {
            [min, max] => TrackingKey::new("", min..=max),
            _ => return Err(VcamCliError::InvalidArgument("--range takes MIN MAX".to_string())),
        },
        (None, None) => {
            return Err(VcamCliError::InvalidArgument(
                "one of --key or --range is required".to_string(),
            ))
        }
    };

    debug!(key = %tracking_key.key, range_min = tracking_key.range_min, range_max = tracking_key.range_max, "scaling");
    println!("{}", tracking_key.scale_value(raw));
    Ok(())
}

fn cmd_process(
    config: &BridgeConfig,
    mode: TrackingMode,
    input: &Path,
    mappings: Option<&Path>,
) -> Result<(), VcamCliError> {
    let samples: BTreeMap<String, f32> = serde_json::from_str(&read_input(input)?)?;
    let frame: TrackingFrame = samples.into_iter().collect();

    let store = match mappings {
        Some(path) => {
            let store = MappingStore::new(config.catalog())
                .with_range_enforcement(config.enforce_range_within_bounds);
            store.load_file(path)?;
            store
        }
        None => config.mapping_store()?,
    };

    let engine = TrackingEngine::new(Arc::new(store), Arc::new(Bridge::default()));
    let packed = engine.process(mode, &frame);
    println!("{}", serde_json::to_string(&packed)?);
    Ok(())
}

fn cmd_doctor(explicit: Option<&Path>, config: &BridgeConfig, json: bool) -> Result<(), VcamCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("vcam-bridge version {}", VCAM_VERSION),
    });

    let config_path = explicit.map(Path::to_path_buf).or_else(find_config_file);
    checks.push(match config_path {
        Some(path) => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: format!("Loaded {}", path.display()),
        },
        None => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "No config file, using defaults".to_string(),
        },
    });

    let catalog = config.catalog();
    checks.push(DoctorCheck {
        name: "catalog".to_string(),
        status: CheckStatus::Ok,
        message: format!(
            "{:?} catalog: {} blend-shape keys, {} perfect-sync keys",
            catalog.variant(),
            catalog.available_input_keys(TrackingMode::BlendShape).len(),
            catalog.available_input_keys(TrackingMode::PerfectSync).len()
        ),
    });

    if let Some(path) = &config.mappings_path {
        let check = if !path.exists() {
            DoctorCheck {
                name: "mappings".to_string(),
                status: CheckStatus::Warning,
                message: format!("{} does not exist, defaults will be used", path.display()),
            }
        } else {
            match fs::read_to_string(path)
                .map_err(BridgeError::from)
                .and_then(|content| MappingDocument::from_json(&content))
            {
                Ok(document) => DoctorCheck {
                    name: "mappings".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Mapping document v{} ({} blend-shape, {} perfect-sync entries)",
                        document.version,
                        document.mappings.blend_shape.len(),
                        document.mappings.perfect_sync.len()
                    ),
                },
                Err(e) => DoctorCheck {
                    name: "mappings".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot load mapping document: {}", e),
                },
            }
        };
        checks.push(check);
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (frames can be piped to 'vcam process -i -')".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: VCAM_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("VCam Doctor Report");
        println!("==================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(VcamCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
enum VcamCliError {
    Io(io::Error),
    Bridge(BridgeError),
    Json(serde_json::Error),
    InvalidArgument(String),
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for VcamCliError {
    fn from(e: io::Error) -> Self {
        VcamCliError::Io(e)
    }
}

impl From<BridgeError> for VcamCliError {
    fn from(e: BridgeError) -> Self {
        VcamCliError::Bridge(e)
    }
}

impl From<serde_json::Error> for VcamCliError {
    fn from(e: serde_json::Error) -> Self {
        VcamCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<VcamCliError> for CliError {
    fn from(e: VcamCliError) -> Self {
        match e {
            VcamCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            VcamCliError::Bridge(BridgeError::ConfigError(e)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the vcam.toml syntax and field names".to_string()),
            },
            VcamCliError::Bridge(e) => CliError {
                code: "BRIDGE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'vcam validate' on the mapping document".to_string()),
            },
            VcamCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            VcamCliError::InvalidArgument(message) => CliError {
                code: "INVALID_ARGUMENT".to_string(),
                message,
                hint: Some("Run 'vcam --help' for usage".to_string()),
            },
            VcamCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} mapping entries failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            VcamCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the failed checks above".to_string()),
            },
        }
    }
}

// ============================================================================
// Report Types
// ============================================================================

#[derive(serde::Serialize)]
struct CatalogEntry {
    slot: Option<usize>,
    #[serde(flatten)]
    key: TrackingKey,
}

#[derive(serde::Serialize)]
struct ValidationReport {
    version: u32,
    saved_at: String,
    entries: BTreeMap<String, usize>,
    errors: usize,
    warnings: usize,
    issues: Vec<ValidationIssue>,
}

#[derive(serde::Serialize)]
struct ValidationIssue {
    mode: String,
    index: usize,
    severity: Severity,
    message: String,
}

#[derive(serde::Serialize)]
enum Severity {
    Warning,
    Error,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
