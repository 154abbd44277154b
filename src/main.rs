use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{ArgAction, Parser};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use ldap_sweep_rs::probe::LdapProber;
use ldap_sweep_rs::report::{self, Console, Tag};
use ldap_sweep_rs::{sweep, targets};

/// ldap-sweep-rs — Bulk LDAP anonymous-bind auditor.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ldap-sweep-rs",
    version,
    about = "Sweeps LDAP servers for directories that accept anonymous binds.",
    long_about = None
)]
struct Cli {
    /// Comma-separated target servers, or path to a file with one server per line.
    #[arg(short, long)]
    servers: Option<String>,

    /// LDAP port probed on every server.
    #[arg(short, long, default_value_t = 389)]
    port: u16,

    /// Use LDAPS transport encryption (pass `--tls false` for plain LDAP).
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    tls: bool,

    /// Per-probe connect/bind timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 10_000)]
    timeout_ms: u64,

    /// Worker count. Defaults to available hardware parallelism.
    #[arg(long)]
    workers: Option<usize>,

    /// CSV file listing authorized targets (default: timestamped filename).
    #[arg(short = 'w', long)]
    output: Option<PathBuf>,

    /// Directory receiving one raw RootDSE dump per authorized target.
    #[arg(long = "info-dir", default_value = "info")]
    info_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let console = Arc::new(Console::new());

    let Some(server_spec) = cli.servers.as_deref() else {
        // Missing target list is a friendly early exit, not a failure.
        console
            .line(Tag::Minus, "please specify target servers (-s)")
            .await;
        return Ok(());
    };

    let targets = targets::load_targets(server_spec)?;
    if targets.is_empty() {
        bail!("no targets found in {server_spec:?}");
    }

    let output = cli.output.clone().unwrap_or_else(report::default_output_path);
    println!("ldap-sweep-rs configuration:");
    println!("  targets    : {} server(s)", targets.len());
    println!("  port       : {}", cli.port);
    println!("  tls        : {}", cli.tls);
    println!("  timeout_ms : {}", cli.timeout_ms);
    println!(
        "  workers    : {}",
        cli.workers
            .map(|w| w.to_string())
            .unwrap_or_else(|| "<available parallelism>".to_string())
    );
    println!("  output     : {}", output.display());
    println!("  info_dir   : {}", cli.info_dir.display());

    let prober = Arc::new(LdapProber::new(
        cli.port,
        cli.tls,
        Duration::from_millis(cli.timeout_ms),
    ));
    let cancel = CancellationToken::new();
    let results = sweep::run_sweep(prober, &targets, cli.workers, console.clone(), cancel).await?;

    for target in &results.unattempted {
        console
            .line(Tag::Star, &format!("not attempted (outcome unknown): {target}"))
            .await;
    }
    for target in &results.aborted {
        console
            .line(Tag::Minus, &format!("shard aborted (outcome lost): {target}"))
            .await;
    }
    console
        .line(
            Tag::Plus,
            &format!(
                "{} of {} targets allow anonymous binds",
                results.authorized.len(),
                results.stats.total_targets
            ),
        )
        .await;
    console
        .line(
            Tag::Plus,
            &format!(
                "swept {} targets in {:.2}s ({:.2} targets/s)",
                results.stats.total_targets,
                results.stats.elapsed.as_secs_f64(),
                results.stats.rate()
            ),
        )
        .await;

    report::write_csv(&output, &results.authorized, &cli.info_dir)?;
    console
        .line(Tag::Plus, &format!("wrote results to {}", output.display()))
        .await;

    let written = report::write_info_files(&cli.info_dir, &results.authorized)?;
    if written > 0 {
        console
            .line(
                Tag::Plus,
                &format!("wrote {written} RootDSE dump(s) under {}", cli.info_dir.display()),
            )
            .await;
    }

    Ok(())
}
