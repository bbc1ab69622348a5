use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Map, Value};
use std::time::Duration;
use swapbox::{
    config::Config,
    errors::BotError,
    logger::{self as logger, LogLevel, LogTag},
    swaps::validate_swap_payload,
    workers::{RunOptions, WorkerHarness, WorkerRegistry, SWAP_WORKER},
};

/// swapbox - Solana swap execution through isolated worker processes
///
/// Per-subsystem debug output uses `--debug-<tag>` (e.g. `--debug-quote`),
/// which the logger reads directly from the process arguments.
#[derive(Parser, Debug)]
#[command(name = "swapbox", version, about = "Execute Solana token swaps in isolated workers")]
struct Cli {
    /// Enable debug output for all subsystems
    #[arg(long, global = true)]
    debug: bool,

    #[arg(short, long, global = true)]
    verbose: bool,

    /// Errors and warnings only
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a swap through the swap worker
    Swap {
        #[command(flatten)]
        swap: SwapArgs,

        /// Lock tag guarding against duplicate runs (default: swap-<mint>)
        #[arg(long)]
        lock: Option<String>,

        /// Override the configured swap timeout
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Validate a swap payload and print the normalized instruction
    Validate {
        #[command(flatten)]
        swap: SwapArgs,
    },
}

#[derive(Args, Debug)]
struct SwapArgs {
    /// "buy" or "sell"
    #[arg(long)]
    side: String,

    #[arg(long)]
    mint: String,

    /// Decimal amount, percentage ("50%") or "auto"
    #[arg(long)]
    amount: String,

    /// Wallet alias resolved from config or SWAPBOX_WALLET_<ALIAS>
    #[arg(short, long)]
    wallet: Option<String>,

    /// Environment variable holding a raw private key
    #[arg(long)]
    private_key_env: Option<String>,

    #[arg(long)]
    slippage: Option<f64>,

    /// Priority fee in SOL, or "auto"
    #[arg(long)]
    priority_fee: Option<String>,

    /// low, medium, high, veryHigh
    #[arg(long)]
    priority_fee_level: Option<String>,

    /// "legacy" or "v0"
    #[arg(long)]
    tx_version: Option<String>,

    #[arg(long)]
    jito: bool,

    #[arg(long)]
    dry_run: bool,

    #[arg(long)]
    show_quote: bool,

    /// Verbose logging inside the swap worker
    #[arg(long)]
    worker_debug: bool,
}

impl SwapArgs {
    /// IPC payload in the shape the swap worker validates
    fn to_payload(&self) -> Result<Value> {
        let mut payload = Map::new();
        payload.insert("side".into(), json!(self.side));
        payload.insert("mint".into(), json!(self.mint));
        payload.insert("amount".into(), json!(self.amount));

        if let Some(alias) = &self.wallet {
            payload.insert("walletAlias".into(), json!(alias));
        }
        if let Some(var) = &self.private_key_env {
            let secret = std::env::var(var)
                .with_context(|| format!("environment variable {} is not set", var))?;
            payload.insert("walletPrivateKey".into(), json!(secret));
        }
        if let Some(slippage) = self.slippage {
            payload.insert("slippagePercent".into(), json!(slippage));
        }
        if let Some(fee) = &self.priority_fee {
            let value = fee
                .parse::<f64>()
                .map(|v| json!(v))
                .unwrap_or_else(|_| json!(fee));
            payload.insert("priorityFee".into(), value);
        }
        if let Some(level) = &self.priority_fee_level {
            payload.insert("priorityFeeLevel".into(), json!(level));
        }
        if let Some(version) = &self.tx_version {
            payload.insert("txVersion".into(), json!(version));
        }
        payload.insert("useJito".into(), json!(self.jito));
        payload.insert("dryRun".into(), json!(self.dry_run));
        payload.insert("showQuoteDetails".into(), json!(self.show_quote));
        payload.insert("debugLogging".into(), json!(self.worker_debug));

        Ok(Value::Object(payload))
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = swapbox::paths::ensure_all_directories() {
        eprintln!("❌ Failed to create required directories: {}", e);
        std::process::exit(1);
    }

    logger::init();

    // `--debug-<tag>` flags belong to the logger
    let cli = Cli::parse_from(std::env::args().filter(|arg| !arg.starts_with("--debug-")));

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            logger::error(LogTag::System, &format!("{:#}", e));
            if e.downcast_ref::<BotError>().map_or(false, BotError::is_unknown_outcome) {
                logger::warning(
                    LogTag::System,
                    "⚠️ The swap may still have landed; check the wallet before retrying",
                );
            }
            1
        }
    };

    logger::flush();
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<()> {
    if cli.verbose {
        logger::update_logger_config(|config| config.min_level = LogLevel::Verbose);
    }
    if cli.quiet {
        logger::update_logger_config(|config| config.min_level = LogLevel::Warning);
    }
    if cli.debug {
        logger::enable_debug_all();
    }

    match cli.command {
        Command::Validate { swap } => {
            let instruction = validate_swap_payload(&swap.to_payload()?)?;
            println!("{}", serde_json::to_string_pretty(&instruction)?);
            Ok(())
        }
        Command::Swap {
            swap,
            lock,
            timeout_ms,
        } => run_swap(swap, lock, timeout_ms).await,
    }
}

async fn run_swap(swap: SwapArgs, lock: Option<String>, timeout_ms: Option<u64>) -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    let payload = swap.to_payload()?;

    // Reject bad input before paying for a process spawn
    validate_swap_payload(&payload)?;

    let workers = WorkerRegistry::from_config(&config.workers)?;
    let command = workers.get(SWAP_WORKER)?;
    let harness = WorkerHarness::new(config.lock_dir());

    let lock_tag = lock.unwrap_or_else(|| format!("swap-{}", swap.mint));
    let timeout = Duration::from_millis(timeout_ms.unwrap_or(config.harness.swap_timeout_ms));

    logger::info(
        LogTag::System,
        &format!(
            "🚀 {} {} {} via '{}' worker",
            swap.side,
            swap.amount,
            swap.mint,
            command.name
        ),
    );

    let options = RunOptions::from_config(&config.harness, payload)
        .with_timeout(timeout)
        .with_env(config.child_env())
        .with_lock(lock_tag)
        .with_progress(|event| {
            logger::info(
                LogTag::Worker,
                &format!("⏳ {} {}", event.event, event.data),
            );
        })
        .with_wait_for_exit(true);

    let outcome = harness.run(command, options).await?;
    println!("{}", serde_json::to_string_pretty(&outcome.result)?);
    Ok(())
}
