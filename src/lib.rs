pub mod config;
pub mod errors; // Structured error handling
pub mod logger;
pub mod paths;
pub mod process_lock; // Advisory tag-file locks
pub mod retry;
pub mod rpc;
pub mod swaps;
pub mod wallets;
pub mod workers; // Isolated worker processes (harness + runtime)
