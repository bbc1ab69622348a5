/// Log tags identifying the subsystem that produced a line
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Config,
    Swap,
    Quote,
    Rpc,
    Wallet,
    Worker,
    Harness,
    Lock,
    Retry,
    Monitor,
}

impl LogTag {
    /// Key used by debug flags (`--debug-<key>`) and the enabled tag set
    pub fn to_debug_key(&self) -> String {
        self.to_plain_string().to_lowercase()
    }

    /// Uncolored tag name for file output
    pub fn to_plain_string(&self) -> String {
        match self {
            LogTag::System => "SYSTEM",
            LogTag::Config => "CONFIG",
            LogTag::Swap => "SWAP",
            LogTag::Quote => "QUOTE",
            LogTag::Rpc => "RPC",
            LogTag::Wallet => "WALLET",
            LogTag::Worker => "WORKER",
            LogTag::Harness => "HARNESS",
            LogTag::Lock => "LOCK",
            LogTag::Retry => "RETRY",
            LogTag::Monitor => "MONITOR",
        }
        .to_string()
    }

    pub fn all() -> &'static [LogTag] {
        &[
            LogTag::System,
            LogTag::Config,
            LogTag::Swap,
            LogTag::Quote,
            LogTag::Rpc,
            LogTag::Wallet,
            LogTag::Worker,
            LogTag::Harness,
            LogTag::Lock,
            LogTag::Retry,
            LogTag::Monitor,
        ]
    }
}

impl fmt::Display for LogTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_plain_string())
    }
}
