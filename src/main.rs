use clap::Parser;
use seqtx::cli::{self, Cli, Commands};
use seqtx::config::{AppConfig, LoggingConfig};
use seqtx::engine::ExecutionEngine;
use seqtx::error::{Result, SeqError};
use seqtx::session::{
    HttpReporter, PaperPerpVenue, PaperSwapRouter, ResultReporter, SessionController, SessionDeps,
};
use seqtx::signing::{ApprovalSigner, KeypairSigner, Signer};
use seqtx::transport::{PaperLedger, PaperLedgerConfig, RpcTransport};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(&cli.config_dir)?;
    let _log_guard = init_logging(&config.logging);

    match cli.command {
        Commands::Plan => {
            check_config(&config)?;
            cli::print_plan(&config);
        }
        Commands::Run { dry_run, yes } => {
            if dry_run {
                config.dry_run.enabled = true;
            }
            check_config(&config)?;
            if !run(&config, yes).await? {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn check_config(config: &AppConfig) -> Result<()> {
    config.validate().map_err(|problems| {
        for problem in &problems {
            error!("Config: {}", problem);
        }
        SeqError::Validation(problems.join("; "))
    })
}

/// Execute the strategy once; returns whether every step confirmed
async fn run(config: &AppConfig, auto_approve: bool) -> Result<bool> {
    let deps = if config.dry_run.enabled {
        paper_deps(config)
    } else {
        live_deps(config)?
    };

    let keypair = match KeypairSigner::discover(config.signer.keypair_path.as_deref()) {
        Ok(keypair) => keypair,
        Err(e) if config.dry_run.enabled => {
            warn!("{}; using a throwaway keypair for the dry run", e);
            KeypairSigner::generate()
        }
        Err(e) => return Err(e),
    };

    let signer: Arc<dyn Signer> = if auto_approve {
        Arc::new(keypair)
    } else {
        let (signer, requests) = ApprovalSigner::new(keypair);
        cli::spawn_approval_prompt(requests);
        Arc::new(signer)
    };

    let reporter = HttpReporter::from_config(&config.reporting)?;
    let controller = SessionController::new(
        deps,
        ExecutionEngine::new(&config.execution),
        config.transfer_policy(),
    );
    controller.set_signer(signer).await;

    let printer = cli::spawn_progress_printer(controller.subscribe());
    cli::print_plan(config);

    let result = controller
        .execute(
            &config.strategy,
            reporter.as_ref().map(|r| r as &dyn ResultReporter),
        )
        .await;
    let _ = printer.await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.success)
}

fn paper_deps(config: &AppConfig) -> SessionDeps {
    info!(
        "Dry run: paper ledger, swap price {}, oracle price {}",
        config.dry_run.swap_price, config.dry_run.oracle_price
    );
    SessionDeps {
        transport: Arc::new(PaperLedger::new(PaperLedgerConfig::default())),
        swap: Arc::new(PaperSwapRouter::new(config.dry_run.swap_price)),
        perp: Arc::new(PaperPerpVenue::new(config.dry_run.oracle_price)),
    }
}

fn live_deps(config: &AppConfig) -> Result<SessionDeps> {
    let _transport = RpcTransport::new(&config.rpc)?;
    info!("RPC transport ready: {}", config.rpc.url);

    // Swap routing and perp trading need venue SDK adapters behind
    // SwapRouter / PerpVenue; none are linked into this binary.
    Err(SeqError::Validation(
        "no live swap or perp venue is available in this build; use --dry-run".to_string(),
    ))
}

fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},seqtx=debug", config.level)));

    // File logging only when SEQTX_LOG_DIR is set
    let mut guard = None;
    let file_layer = std::env::var("SEQTX_LOG_DIR").ok().and_then(|log_dir| {
        // rolling::daily panics if it can't create the file, so check first
        if let Err(e) = std::fs::create_dir_all(&log_dir) {
            eprintln!(
                "Warning: Could not create log directory {} ({}), file logging disabled",
                log_dir, e
            );
            return None;
        }
        let test_path = std::path::Path::new(&log_dir).join(".seqtx_write_test");
        if let Err(e) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            eprintln!(
                "Warning: Could not write to log directory {} ({}), file logging disabled",
                log_dir, e
            );
            return None;
        }
        let _ = std::fs::remove_file(&test_path);

        let appender = tracing_appender::rolling::daily(&log_dir, "seqtx.log");
        let (writer, worker) = tracing_appender::non_blocking(appender);
        guard = Some(worker);
        eprintln!("Logging to: {}/seqtx.log", log_dir);

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
    });

    let (json_layer, console_layer) = if config.json {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    guard
}
