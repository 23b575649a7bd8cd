extern crate clap;

use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colored::Colorize;
use log::{info, warn};
use reactor_speed::client::http_client::{Client, DEFAULT_SERVER};
use reactor_speed::engine::config::{RunConfig, ThroughputOverrides};
use reactor_speed::engine::controller::{RunController, RunOutcome, CANCELED_MESSAGE};
use reactor_speed::errors::{exit_codes, format_error_for_display, SpeedTestError};
use reactor_speed::measurements::MIB;
use reactor_speed::progress::{ProgressCallback, ProgressEvent};
use reactor_speed::report::{format_mib, phase_banner, render_text, OutputMode};
use reactor_speed::server::{self, DEFAULT_BIND};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version = reactor_speed::version(), about, long_about = None)]
struct Cli {
    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Measure latency, loss and sustained throughput against a server
    Run(RunArgs),
    /// Serve the speed test endpoints
    Serve(ServeArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Base URL of the speed test server
    #[arg(long, default_value = DEFAULT_SERVER)]
    server: String,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// JSON file with run settings; flags below override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write the JSON result to this file, or into this directory
    #[arg(long, value_name = "PATH")]
    export_json: Option<PathBuf>,

    /// Idle ping attempts
    #[arg(long)]
    ping_samples: Option<u32>,

    /// Pause between idle ping attempts
    #[arg(long, value_name = "MS")]
    ping_gap_ms: Option<u64>,

    /// Per-attempt ping timeout
    #[arg(long, value_name = "MS")]
    ping_timeout_ms: Option<u64>,

    /// Pause between loaded ping attempts
    #[arg(long, value_name = "MS")]
    loaded_interval_ms: Option<u64>,

    #[arg(long, value_name = "MS")]
    download_duration_ms: Option<u64>,

    #[arg(long, value_name = "MS")]
    download_warmup_ms: Option<u64>,

    #[arg(long, value_name = "N")]
    download_concurrency: Option<u32>,

    /// Size of each download request
    #[arg(long, value_name = "MIB")]
    download_mb: Option<u32>,

    /// Stop the download phase after this much data
    #[arg(long, value_name = "MIB")]
    download_max_mib: Option<u64>,

    #[arg(long, value_name = "MS")]
    upload_duration_ms: Option<u64>,

    #[arg(long, value_name = "MS")]
    upload_warmup_ms: Option<u64>,

    #[arg(long, value_name = "N")]
    upload_concurrency: Option<u32>,

    /// Size of each upload request
    #[arg(long, value_name = "MIB")]
    upload_mb: Option<u32>,

    /// Stop the upload phase after this much data
    #[arg(long, value_name = "MIB")]
    upload_max_mib: Option<u64>,
}

impl RunArgs {
    /// Defaults, then the config file, then flags.
    fn build_config(&self) -> Result<RunConfig, SpeedTestError> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_json_file(path)?,
            None => RunConfig::default(),
        };

        if let Some(samples) = self.ping_samples {
            config.ping.samples = samples;
        }
        if let Some(gap_ms) = self.ping_gap_ms {
            config.ping.gap_ms = gap_ms;
        }
        if let Some(timeout_ms) = self.ping_timeout_ms {
            config.ping.timeout_ms = timeout_ms;
        }
        if let Some(interval_ms) = self.loaded_interval_ms {
            config.loaded_ping.interval_ms = interval_ms;
        }

        ThroughputOverrides {
            duration_ms: self.download_duration_ms,
            warmup_ms: self.download_warmup_ms,
            concurrency: self.download_concurrency,
            mb_per_request: self.download_mb,
            max_bytes: self.download_max_mib.map(|mib| mib.saturating_mul(MIB)),
        }
        .apply_to(&mut config.download);

        ThroughputOverrides {
            duration_ms: self.upload_duration_ms,
            warmup_ms: self.upload_warmup_ms,
            concurrency: self.upload_concurrency,
            mb_per_request: self.upload_mb,
            max_bytes: self.upload_max_mib.map(|mib| mib.saturating_mul(MIB)),
        }
        .apply_to(&mut config.upload);

        config.validate()?;

        Ok(config)
    }
}

#[derive(Args)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = DEFAULT_BIND)]
    bind: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(cli.verbose.log_level_filter())
        .format_timestamp_millis()
        .init();

    let result = match cli.command {
        Command::Run(args) => run(args).await,
        Command::Serve(args) => serve(args).await,
    };

    let code = match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{}", format_error_for_display(&error).red());
            error.exit_code()
        }
    };

    std::process::exit(code);
}

async fn run(args: RunArgs) -> Result<i32, SpeedTestError> {
    let config = args.build_config()?;
    let mode = OutputMode::detect(args.json, std::io::stdout().is_terminal());

    if mode == OutputMode::Plain {
        colored::control::set_override(false);
    }

    let client = Client::new(&args.server)?;
    info!("Testing against {}", client.base_url());

    let mut controller = RunController::new(client, config)?;

    if mode.is_text() {
        eprintln!(
            "{} up to {}",
            "Data budget:".bold().white(),
            format_mib(controller.config().estimated_max_bytes())
        );

        let progress: Arc<dyn ProgressCallback> =
            Arc::new(|event: ProgressEvent| {
                let ProgressEvent::PhaseChange { to, .. } = event;
                eprintln!("{}", phase_banner(to));
            });
        controller = controller.with_progress(progress);
    }

    let outcome = {
        let run = controller.run();
        tokio::pin!(run);

        tokio::select! {
            outcome = &mut run => outcome,
            Ok(()) = tokio::signal::ctrl_c() => {
                controller.cancel();
                // Let the superseded run unwind before exiting.
                run.await
            }
        }
    };

    match outcome {
        RunOutcome::Completed(result) => {
            match mode {
                OutputMode::Json => println!("{}", result.to_json()?),
                OutputMode::Colored | OutputMode::Plain => {
                    print!("{}", render_text(&result))
                }
            }

            if let Some(target) = &args.export_json {
                let written = result.export_json(target)?;
                if mode.is_text() {
                    eprintln!("Saved {}", written.display());
                }
            }

            Ok(exit_codes::SUCCESS)
        }
        RunOutcome::Canceled | RunOutcome::Superseded => {
            eprintln!("{}", CANCELED_MESSAGE.yellow());
            Ok(exit_codes::CANCELED)
        }
        RunOutcome::Failed(error) => Err(error),
    }
}

async fn serve(args: ServeArgs) -> Result<i32, SpeedTestError> {
    let listener = server::bind(&args.bind).await?;
    server::serve(listener, shutdown_signal()).await?;

    Ok(exit_codes::SUCCESS)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C, serving until killed: {}", e);
        std::future::pending::<()>().await;
    }

    info!("Shutting down");
}
