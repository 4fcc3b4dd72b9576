use anyhow::Result;
use clap::{Parser, Subcommand};
use regwatch_core::CheckConfig;
use regwatch_local::pipeline::{run_update_check, PipelineDeps};
use regwatch_local::process::CommandProcessor;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "regwatch")]
#[command(about = "Check compliance frameworks for published amendments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one update check for a framework (json).
    Check(CheckCmd),
    /// Diagnose configuration issues (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct CheckCmd {
    /// Framework name as it appears in the source documents, e.g. "NIST SP 800-53".
    #[arg(long)]
    framework: String,
    /// Last known update date (`YYYY-MM-DD`). Only updates after this date count.
    #[arg(long)]
    baseline: String,
    /// Where verified amendment PDFs are written.
    #[arg(long)]
    download_dir: Option<PathBuf>,
    /// Numeric framework id passed through to the amendment processor.
    #[arg(long)]
    framework_id: Option<i64>,
    /// Run the amendment processor after a verified download (needs --processor-cmd and --framework-id).
    #[arg(long, action = clap::ArgAction::Set, default_value_t = false)]
    process_amendment: bool,
    /// External processor command. Receives the request as JSON on stdin and
    /// must print a JSON outcome on stdout.
    #[arg(long)]
    processor_cmd: Option<PathBuf>,
    /// Download attempt budget per check.
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,
    /// Reject downloads larger than this (amendments are small documents).
    #[arg(long, default_value_t = 15)]
    max_size_mb: u64,
    /// Per-request download timeout (ms).
    #[arg(long, default_value_t = 60_000)]
    timeout_ms: u64,
    /// Oracle query timeout (ms).
    #[arg(long, default_value_t = 45_000)]
    oracle_timeout_ms: u64,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn default_download_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("regwatch")
        .join("downloads")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Optional env-file loader (opt-in via REGWATCH_ENV_FILE).
    //
    // Scheduled/cron environments often aren't interactive shells, so users
    // want one place to keep the oracle key without exporting it manually.
    // Sets vars only when not already present; never logs values.
    if let Ok(p) = std::env::var("REGWATCH_ENV_FILE") {
        let p = p.trim();
        if !p.is_empty() {
            if let Ok(txt) = std::fs::read_to_string(p) {
                for raw in txt.lines() {
                    let s = raw.trim();
                    if s.is_empty() || s.starts_with('#') {
                        continue;
                    }
                    let Some((k, v)) = s.split_once('=') else {
                        continue;
                    };
                    let k = k.trim();
                    if k.is_empty() {
                        continue;
                    }
                    if std::env::var_os(k).is_none() {
                        std::env::set_var(k, v.trim());
                    }
                }
            }
        }
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Check(args) => run_check(args).await?,
        Commands::Doctor(args) => run_doctor(args),
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "regwatch",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("regwatch {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
        }
    }
    Ok(())
}

async fn run_check(args: CheckCmd) -> Result<()> {
    let oracle_timeout = Duration::from_millis(args.oracle_timeout_ms);
    let api_client = regwatch_local::default_api_client(oracle_timeout)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let oracle =
        regwatch_local::perplexity::PerplexityClient::from_env(api_client, oracle_timeout)
            .map_err(|e| {
                anyhow::anyhow!(
                    "{e}. Set REGWATCH_PERPLEXITY_API_KEY (or PERPLEXITY_API_KEY), \
                     or point REGWATCH_ENV_FILE at a file that does."
                )
            })?;

    let mut cfg = CheckConfig::new(&args.framework, &args.baseline);
    cfg.framework_id = args.framework_id;
    cfg.download_dir = args.download_dir.unwrap_or_else(default_download_dir);
    cfg.process_amendment = args.process_amendment;
    cfg.max_attempts = args.max_attempts;
    cfg.max_amendment_bytes = args.max_size_mb.saturating_mul(1024 * 1024);
    cfg.request_timeout = Duration::from_millis(args.timeout_ms);
    cfg.oracle_timeout = oracle_timeout;

    let processor = args.processor_cmd.map(CommandProcessor::new);
    let deps = PipelineDeps {
        blob_store: None,
        processor: processor
            .as_ref()
            .map(|p| p as &dyn regwatch_core::AmendmentProcessor),
    };

    let result = run_update_check(&cfg, &oracle, deps)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    match args.output.to_ascii_lowercase().as_str() {
        "text" => {
            println!(
                "{}: {}",
                result.framework_name,
                if result.has_update {
                    "update found"
                } else {
                    "no update"
                }
            );
            if let Some(d) = &result.latest_update_date {
                println!("date: {d}");
            }
            if let Some(u) = &result.document_url {
                println!("url: {u}");
            }
            if let Some(p) = &result.downloaded_path {
                println!("downloaded: {p}");
            }
            for w in &result.warnings {
                println!("warning: {w}");
            }
        }
        _ => {
            let payload = serde_json::json!({
                "schema_version": 1,
                "kind": "update_check",
                "result": result,
            });
            println!("{payload}");
        }
    }
    Ok(())
}

fn run_doctor(args: DoctorCmd) {
    fn has_env(k: &str) -> bool {
        std::env::var(k).ok().is_some_and(|v| !v.trim().is_empty())
    }

    let t0 = std::time::Instant::now();

    // Env presence (booleans only; never print values).
    let perplexity_configured =
        has_env("REGWATCH_PERPLEXITY_API_KEY") || has_env("PERPLEXITY_API_KEY");
    let endpoint_overridden = has_env("REGWATCH_PERPLEXITY_ENDPOINT");
    let model_overridden = has_env("REGWATCH_PERPLEXITY_MODEL");

    let download_dir = default_download_dir();
    let mut checks: Vec<serde_json::Value> = Vec::new();

    // Check: download dir is creatable + writable.
    let dir_ok = (|| -> anyhow::Result<()> {
        std::fs::create_dir_all(&download_dir)?;
        let probe = download_dir.join(format!(
            "regwatch-doctor-{}.probe",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis()
        ));
        std::fs::write(&probe, b"ok")?;
        let _ = std::fs::remove_file(&probe);
        Ok(())
    })()
    .is_ok();
    checks.push(serde_json::json!({
        "name": "download_dir_writable",
        "ok": dir_ok,
        "message": if dir_ok { "download dir is writable" } else { "download dir is not writable" },
        "hint": if dir_ok { "" } else { "Pass --download-dir with a writable directory." },
    }));

    checks.push(serde_json::json!({
        "name": "oracle_configured",
        "ok": perplexity_configured,
        "message": if perplexity_configured {
            "oracle API key present"
        } else {
            "no oracle API key in the environment"
        },
        "hint": if perplexity_configured {
            ""
        } else {
            "Set REGWATCH_PERPLEXITY_API_KEY (or PERPLEXITY_API_KEY)."
        },
    }));

    let ok = checks
        .iter()
        .all(|c| c["ok"].as_bool().unwrap_or(false));

    let payload = serde_json::json!({
        "schema_version": 1,
        "kind": "doctor",
        "ok": ok,
        "name": "regwatch",
        "version": env!("CARGO_PKG_VERSION"),
        "elapsed_ms": t0.elapsed().as_millis() as u64,
        "configured": {
            "oracle": {
                "perplexity": perplexity_configured,
                "endpoint_overridden": endpoint_overridden,
                "model_overridden": model_overridden,
            },
            "download_dir": download_dir.to_string_lossy().to_string(),
        },
        "checks": checks,
    });

    match args.output.to_ascii_lowercase().as_str() {
        "text" => {
            println!("regwatch {} (ok={})", env!("CARGO_PKG_VERSION"), ok);
            println!(
                "download_dir: {}",
                payload["configured"]["download_dir"].as_str().unwrap_or("")
            );
            println!(
                "oracle: perplexity={}",
                payload["configured"]["oracle"]["perplexity"]
                    .as_bool()
                    .unwrap_or(false)
            );
            println!("checks:");
            if let Some(arr) = payload["checks"].as_array() {
                for c in arr {
                    let name = c["name"].as_str().unwrap_or("?");
                    let ok = c["ok"].as_bool().unwrap_or(false);
                    println!("- {}: {}", name, if ok { "ok" } else { "fail" });
                }
            }
        }
        _ => println!("{payload}"),
    }
}
