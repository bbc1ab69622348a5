/// Configuration schemas - all config sections defined once with defaults
///
/// Each struct is defined using the config_struct! macro which provides
/// single-source definitions with embedded defaults and serde support.
use crate::config_struct;
use std::collections::HashMap;

// ============================================================================
// RPC CONFIGURATION
// ============================================================================

config_struct! {
    /// Transaction submission endpoints
    pub struct RpcConfig {
        /// JSON-RPC endpoint used for submission, simulation and ledger reads
        url: String = "https://api.mainnet-beta.solana.com".to_string(),
        /// Block-engine endpoint used when a swap sets `useJito`
        jito_url: String = "https://mainnet.block-engine.jito.wtf/api/v1/transactions".to_string(),
        request_timeout_secs: u64 = 30,
    }
}

// ============================================================================
// QUOTE SERVICE CONFIGURATION
// ============================================================================

config_struct! {
    /// Quote/swap-building services
    pub struct QuotesConfig {
        v3_base_url: String = "https://swap-v2.solanatracker.io".to_string(),
        raptor_base_url: String = "https://raptor.solanatracker.io".to_string(),
        /// Sent as `x-api-key` when non-empty
        api_key: String = String::new(),
        request_timeout_secs: u64 = 20,

        // Retry policy applied around quote requests
        retry_attempts: u32 = 3,
        retry_base_ms: u64 = 200,
        retry_max_ms: u64 = 2_000,
    }
}

// ============================================================================
// SWAP CONFIGURATION
// ============================================================================

config_struct! {
    /// Swap execution behavior
    pub struct SwapsConfig {
        /// Executor name: "v3" or "raptor"
        executor: String = "v3".to_string(),
        /// Simulate before submitting when the submitter supports it
        preflight: bool = true,
        price_impact_warn_pct: f64 = 2.0,
        /// Hard ceiling; execution fails before signing when exceeded
        max_price_impact_pct: Option<f64> = None,
        default_slippage_pct: f64 = 15.0,
        /// Interactive/HUD context: price-impact warnings drop to debug
        interactive: bool = false,
    }
}

// ============================================================================
// WORKER HARNESS CONFIGURATION
// ============================================================================

config_struct! {
    pub struct HarnessConfig {
        timeout_ms: u64 = 30_000,
        /// Timeout used for swap jobs (quote + submit round trips)
        swap_timeout_ms: u64 = 120_000,
        exit_grace_ms: u64 = 5_000,
        /// Lock directory; empty means `<data dir>/locks`
        lock_dir: String = String::new(),
    }
}

config_struct! {
    /// Post-swap confirmation monitor
    pub struct MonitorConfig {
        enabled: bool = true,
        timeout_ms: u64 = 60_000,
        poll_interval_ms: u64 = 1_000,
        /// "processed", "confirmed" or "finalized"
        commitment: String = "confirmed".to_string(),
    }
}

config_struct! {
    /// Worker executables; empty means a sibling of the current executable
    pub struct WorkersConfig {
        swap_worker: String = String::new(),
        monitor_worker: String = String::new(),
    }
}

config_struct! {
    /// Wallet alias -> secret (base58 or `[1,2,...]` array format)
    pub struct WalletsConfig {
        aliases: HashMap<String, String> = HashMap::new(),
    }
}

// ============================================================================
// MAIN CONFIGURATION
// ============================================================================

config_struct! {
    pub struct Config {
        rpc: RpcConfig = RpcConfig::default(),
        quotes: QuotesConfig = QuotesConfig::default(),
        swaps: SwapsConfig = SwapsConfig::default(),
        harness: HarnessConfig = HarnessConfig::default(),
        monitor: MonitorConfig = MonitorConfig::default(),
        workers: WorkersConfig = WorkersConfig::default(),
        wallets: WalletsConfig = WalletsConfig::default(),
    }
}
