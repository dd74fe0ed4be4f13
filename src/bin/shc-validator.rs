use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use shc_validator::{
    jwks, validate, ErrorCode, FileInfo, FileType, Level, Log, Report, ValidationContext,
    ValidationResult, ValidatorConfig,
};

#[derive(Parser)]
#[command(name = "shc-validator", version)]
#[command(about = "Validate SMART Health Card QR codes, tokens, health card files and key sets")]
struct Cli {
    /// Input file; repeat for the images or numeric chunks of a split QR code
    #[arg(short, long = "path", required = true)]
    paths: Vec<PathBuf>,

    /// Type of the input: qrnumeric, qr, jws, jwspayload, fhirbundle,
    /// healthcard, fhirhealthcard or jwkset
    #[arg(short = 't', long = "type")]
    file_type: FileType,

    /// Key set file whose keys are trusted before validation; repeatable
    #[arg(short = 'k', long = "jwkset")]
    jwksets: Vec<PathBuf>,

    /// Trusted issuer directory: VCI, an URL or a local file
    #[arg(short, long)]
    directory: Option<String>,

    /// Lowest level printed: debug, info, warning, error or fatal
    #[arg(short, long, default_value = "warning")]
    loglevel: Level,

    /// Print the result and full log tree as JSON
    #[arg(long)]
    json: bool,

    /// Show operational tracing on stderr
    #[arg(short, long)]
    verbose: bool,

    /// Timeout in seconds for key and directory downloads
    #[arg(long, default_value_t = 10)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let max_level = if cli.json {
        tracing::Level::ERROR
    } else if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("[FAILED] {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = ValidatorConfig {
        http_timeout: Duration::from_secs(cli.timeout),
        trusted_directory: cli.directory.clone(),
        ..ValidatorConfig::default()
    };
    let ctx = ValidationContext::new(config).context("Failed to set up the HTTP client")?;

    let mut setup_logs = Vec::new();
    if let Some(log) = ctx.load_trusted_directory().await {
        setup_logs.push(log);
    }
    for path in &cli.jwksets {
        let info = FileInfo::from_path(path)
            .await
            .with_context(|| format!("Failed to read key set {}", path.display()))?;
        let mut log = Log::new(format!("Key set {}", info.name));
        log.add_child(jwks::validate_text(&info.text(), &ctx.keys).log);
        setup_logs.push(log);
    }

    let mut files = Vec::with_capacity(cli.paths.len());
    for path in &cli.paths {
        match FileInfo::from_path(path).await {
            Ok(info) => files.push(info),
            Err(e) => {
                let mut log = Log::new(cli.file_type.name());
                log.fatal(
                    format!("Cannot read {}: {}", path.display(), e),
                    ErrorCode::DataFileNotFound,
                );
                setup_logs.push(log);
            }
        }
    }

    let result = if files.len() == cli.paths.len() {
        validate(&ctx, cli.file_type, &files).await
    } else {
        ValidationResult::failed(Log::new(cli.file_type.name()))
    };

    let worst = setup_logs
        .iter()
        .chain(std::iter::once(&result.log))
        .filter_map(Log::level)
        .max();

    if cli.json {
        let report = Report::new(cli.file_type, &files, &result);
        let output = json!({ "setup": setup_logs, "report": report });
        let text = serde_json::to_string_pretty(&output).context("Failed to serialize result")?;
        println!("{}", text);
    } else {
        for log in &setup_logs {
            print!("{}", log.render(cli.loglevel));
        }
        print!("{}", result.log.render(cli.loglevel));
        println!();
        match worst {
            Some(level) if level >= Level::Error => {
                println!("[FAILED] Validation finished with {} level entries", level)
            }
            Some(Level::Warning) => println!("[OK] Validation finished with warnings"),
            _ => println!("[OK] Validation complete"),
        }
    }

    Ok(match worst {
        Some(level) if level >= Level::Error => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}
