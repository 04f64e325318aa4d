use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::projection::truncate_address;
use crate::session::{SessionEvent, SHORT_STEP, SWAP_STEP, TRANSFER_STEP};
use crate::signing::ApprovalRequest;

#[derive(Parser)]
#[command(name = "seqtx")]
#[command(version)]
#[command(about = "Swap, open a leveraged short and transfer, one confirmed transaction at a time", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and environment overrides
    #[arg(long, global = true, default_value = "config", env = "SEQTX_CONFIG_DIR")]
    pub config_dir: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute the swap → short → transfer sequence
    Run {
        /// Use the in-memory paper ledger and venues
        #[arg(long)]
        dry_run: bool,
        /// Sign without prompting for each transaction
        #[arg(short, long)]
        yes: bool,
    },
    /// Validate configuration and print the steps that would run
    Plan,
}

/// Print the resolved three-step plan
pub fn print_plan(config: &AppConfig) {
    let s = &config.strategy;
    let policy = config.transfer_policy();

    println!("\x1b[36m═══ Execution plan ═══\x1b[0m");
    println!(
        "  1. {:<12} {} {} → {} (slippage {} bps)",
        SWAP_STEP, s.swap_amount, s.source.symbol, s.target.symbol, s.slippage_bps
    );
    println!(
        "  2. {:<12} {} at {}x, collateral in {}",
        SHORT_STEP,
        s.market_name,
        s.leverage.normalize(),
        s.source.symbol
    );
    println!(
        "  3. {:<12} {} {} to {}",
        TRANSFER_STEP,
        s.transfer_amount,
        s.target.symbol,
        truncate_address(&s.destination)
    );
    println!(
        "  transfer profile: {} (minimum {} {})",
        policy.profile, policy.min_amount, s.target.symbol
    );
    println!(
        "  submit: skip_preflight={} max_retries={}",
        config.execution.skip_preflight, config.execution.max_retries
    );
    if config.dry_run.enabled {
        println!("  \x1b[33mdry run: paper ledger\x1b[0m");
    } else {
        println!("  rpc: {} ({})", config.rpc.url, config.rpc.commitment);
    }
}

/// Answer approval requests from the terminal.
///
/// Anything other than `y`/`yes` rejects; EOF on stdin rejects whatever is
/// still pending.
pub fn spawn_approval_prompt(mut requests: mpsc::Receiver<ApprovalRequest>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Some(request) = requests.recv().await {
            println!("\n\x1b[33m? Sign transaction:\x1b[0m {}", request.summary);
            println!("  Approve? [y/N]");

            match lines.next_line().await {
                Ok(Some(answer)) if matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") => {
                    request.approve()
                }
                _ => request.reject(),
            }
        }
    })
}

/// Print session progress as it happens
pub fn spawn_progress_printer(mut events: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last = String::new();
        loop {
            match events.recv().await {
                Ok(SessionEvent::Progress { message, .. }) if message != last => {
                    println!("  \x1b[36m→\x1b[0m {}", message);
                    last = message;
                }
                Ok(SessionEvent::Completed(outcome)) => {
                    if outcome.success {
                        println!("\x1b[32m✓ {}\x1b[0m", outcome.message);
                    } else {
                        println!("\x1b[31m✗ {}\x1b[0m", outcome.message);
                    }
                    break;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
