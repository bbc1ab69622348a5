/// Error taxonomy for swapbox
///
/// Every failure surfaced by the swap pipeline and the worker harness maps to
/// one `BotError` variant. Callers branch on the variant (or on
/// [`BotError::is_transient`]) instead of parsing messages.
use std::fmt;
use thiserror::Error;

// =============================================================================
// SWAP STAGES
// =============================================================================

/// Pipeline stage a swap failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStage {
    Build,
    Sign,
    Simulate,
    Send,
    Confirm,
}

impl SwapStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapStage::Build => "build",
            SwapStage::Sign => "sign",
            SwapStage::Simulate => "simulate",
            SwapStage::Send => "send",
            SwapStage::Confirm => "confirm",
        }
    }
}

impl fmt::Display for SwapStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// NETWORK ERRORS
// =============================================================================

/// Fault class of a network failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFaultKind {
    ConnectionReset,
    ConnectionRefused,
    Timeout,
    DnsRetry,
    NetworkUnreachable,
    HttpStatus,
    Other,
}

impl NetworkFaultKind {
    /// Short code used in log lines
    pub fn code(&self) -> &'static str {
        match self {
            NetworkFaultKind::ConnectionReset => "ECONNRESET",
            NetworkFaultKind::ConnectionRefused => "ECONNREFUSED",
            NetworkFaultKind::Timeout => "ETIMEDOUT",
            NetworkFaultKind::DnsRetry => "EAI_AGAIN",
            NetworkFaultKind::NetworkUnreachable => "ENETUNREACH",
            NetworkFaultKind::HttpStatus => "HTTP_STATUS",
            NetworkFaultKind::Other => "NETWORK",
        }
    }

    /// Map an I/O error kind onto a fault class
    pub fn from_io_kind(kind: std::io::ErrorKind) -> Option<Self> {
        use std::io::ErrorKind;
        match kind {
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                Some(NetworkFaultKind::ConnectionReset)
            }
            ErrorKind::ConnectionRefused => Some(NetworkFaultKind::ConnectionRefused),
            ErrorKind::TimedOut => Some(NetworkFaultKind::Timeout),
            _ => None,
        }
    }

    /// Best-effort classification from an error message
    fn from_message(message: &str) -> Option<Self> {
        let lower = message.to_lowercase();
        if lower.contains("connection reset") || lower.contains("reset by peer") {
            Some(NetworkFaultKind::ConnectionReset)
        } else if lower.contains("connection refused") {
            Some(NetworkFaultKind::ConnectionRefused)
        } else if lower.contains("timed out") || lower.contains("timeout") {
            Some(NetworkFaultKind::Timeout)
        } else if lower.contains("dns")
            || lower.contains("failed to lookup")
            || lower.contains("name resolution")
        {
            Some(NetworkFaultKind::DnsRetry)
        } else if lower.contains("unreachable") {
            Some(NetworkFaultKind::NetworkUnreachable)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkError {
    pub kind: NetworkFaultKind,
    pub endpoint: String,
    pub status: Option<u16>,
    pub message: String,
}

impl NetworkError {
    pub fn new(kind: NetworkFaultKind, endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            endpoint: endpoint.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Non-2xx HTTP response; the body is truncated to a short snippet
    pub fn http_status(endpoint: impl Into<String>, status: u16, body: &str) -> Self {
        Self {
            kind: NetworkFaultKind::HttpStatus,
            endpoint: endpoint.into(),
            status: Some(status),
            message: body_snippet(body),
        }
    }

    /// Classify a reqwest failure
    pub fn from_reqwest(endpoint: impl Into<String>, err: &reqwest::Error) -> Self {
        let endpoint = endpoint.into();

        if let Some(status) = err.status() {
            return Self {
                kind: NetworkFaultKind::HttpStatus,
                endpoint,
                status: Some(status.as_u16()),
                message: err.to_string(),
            };
        }

        let kind = if err.is_timeout() {
            NetworkFaultKind::Timeout
        } else {
            classify_error_chain(err).unwrap_or(if err.is_connect() {
                NetworkFaultKind::ConnectionRefused
            } else {
                NetworkFaultKind::Other
            })
        };

        Self {
            kind,
            endpoint,
            status: None,
            message: err.to_string(),
        }
    }

    /// Default retry predicate: transient fault codes, 5xx and 429
    pub fn is_transient(&self) -> bool {
        if let Some(status) = self.status {
            if status >= 500 || status == 429 {
                return true;
            }
        }
        matches!(
            self.kind,
            NetworkFaultKind::ConnectionReset
                | NetworkFaultKind::ConnectionRefused
                | NetworkFaultKind::Timeout
                | NetworkFaultKind::DnsRetry
                | NetworkFaultKind::NetworkUnreachable
        )
    }
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(
                f,
                "{} {} from {}: {}",
                self.kind.code(),
                status,
                self.endpoint,
                self.message
            ),
            None => write!(f, "{} on {}: {}", self.kind.code(), self.endpoint, self.message),
        }
    }
}

impl std::error::Error for NetworkError {}

fn classify_error_chain(err: &(dyn std::error::Error + 'static)) -> Option<NetworkFaultKind> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if let Some(kind) = NetworkFaultKind::from_io_kind(io.kind()) {
                return Some(kind);
            }
        }
        if let Some(kind) = NetworkFaultKind::from_message(&e.to_string()) {
            return Some(kind);
        }
        current = e.source();
    }
    None
}

/// Maximum characters of a response body carried in error messages
pub const BODY_SNIPPET_CHARS: usize = 300;

pub fn body_snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_SNIPPET_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(BODY_SNIPPET_CHARS).collect();
    format!("{}…", cut)
}

// =============================================================================
// MAIN ERROR TYPE
// =============================================================================

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Network error: {0}")]
    Network(NetworkError),

    #[error("{stage} failed: {message}")]
    Api { stage: SwapStage, message: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("{stage} failed: {message}")]
    Stage { stage: SwapStage, message: String },

    #[error("simulate failed: {error}")]
    Simulation { error: String, logs: Vec<String> },

    #[error("Price impact {impact_pct:.2}% exceeds maximum {max_pct:.2}%")]
    PriceImpact { impact_pct: f64, max_pct: f64 },

    #[error("Failed after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: Box<BotError> },

    #[error("Worker timed out after {timeout_ms}ms (request {request_id}); outcome unknown")]
    Timeout { request_id: String, timeout_ms: u64 },

    #[error(
        "Worker exited before responding (code: {}, signal: {})",
        display_opt(.code),
        display_opt(.signal)
    )]
    ExitedBeforeResponse { code: Option<i32>, signal: Option<i32> },

    #[error("Worker responded but did not exit within {grace_ms}ms")]
    ExitGraceExceeded { grace_ms: u64 },

    #[error("{message}")]
    Worker { message: String, stack: Option<String> },

    #[error("Lock '{tag}' is already held: {holder}")]
    Lock { tag: String, holder: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn display_opt(value: &Option<i32>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "none".to_string(),
    }
}

impl BotError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        BotError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn api(stage: SwapStage, message: impl Into<String>) -> Self {
        BotError::Api {
            stage,
            message: message.into(),
        }
    }

    pub fn stage(stage: SwapStage, message: impl Into<String>) -> Self {
        BotError::Stage {
            stage,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        BotError::Config(message.into())
    }

    pub fn wallet(message: impl Into<String>) -> Self {
        BotError::Wallet(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        BotError::Parse(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        BotError::Internal(message.into())
    }

    /// Default retry predicate
    pub fn is_transient(&self) -> bool {
        match self {
            BotError::Network(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Harness timeouts leave the remote side in an unknown state
    pub fn is_unknown_outcome(&self) -> bool {
        matches!(self, BotError::Timeout { .. })
    }

    /// Stage the failure belongs to, when it comes from the swap pipeline
    pub fn swap_stage(&self) -> Option<SwapStage> {
        match self {
            BotError::Api { stage, .. } | BotError::Stage { stage, .. } => Some(*stage),
            BotError::Simulation { .. } => Some(SwapStage::Simulate),
            BotError::PriceImpact { .. } => Some(SwapStage::Build),
            BotError::RetryExhausted { last, .. } => last.swap_stage(),
            _ => None,
        }
    }

    /// Attribute a failure to a stage unless it already names one
    pub fn at_stage(self, stage: SwapStage) -> Self {
        match self {
            BotError::Network(e) => BotError::stage(stage, e.to_string()),
            BotError::Rpc { code, message } => {
                BotError::stage(stage, format!("RPC error {}: {}", code, message))
            }
            BotError::Parse(message) | BotError::Internal(message) => BotError::stage(stage, message),
            BotError::RetryExhausted { attempts, last } => BotError::RetryExhausted {
                attempts,
                last: Box::new((*last).at_stage(stage)),
            },
            other => other,
        }
    }

    /// Diagnostic trace sent across the process boundary next to the message
    pub fn stack(&self) -> String {
        match self {
            BotError::Worker {
                stack: Some(stack), ..
            } => stack.clone(),
            BotError::Simulation { logs, .. } if !logs.is_empty() => {
                format!("{:?}\nsimulation logs:\n{}", self, logs.join("\n"))
            }
            _ => {
                let mut out = format!("{:?}", self);
                let mut source = std::error::Error::source(self);
                while let Some(cause) = source {
                    out.push_str(&format!("\ncaused by: {}", cause));
                    source = cause.source();
                }
                out
            }
        }
    }
}

impl From<NetworkError> for BotError {
    fn from(err: NetworkError) -> Self {
        BotError::Network(err)
    }
}

pub type BotResult<T> = Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn net(kind: NetworkFaultKind, status: Option<u16>) -> BotError {
        BotError::Network(NetworkError {
            kind,
            endpoint: "https://quote.example".to_string(),
            status,
            message: "boom".to_string(),
        })
    }

    #[test]
    fn test_transient_fault_codes() {
        assert!(net(NetworkFaultKind::ConnectionReset, None).is_transient());
        assert!(net(NetworkFaultKind::ConnectionRefused, None).is_transient());
        assert!(net(NetworkFaultKind::Timeout, None).is_transient());
        assert!(net(NetworkFaultKind::DnsRetry, None).is_transient());
        assert!(net(NetworkFaultKind::NetworkUnreachable, None).is_transient());
        assert!(!net(NetworkFaultKind::Other, None).is_transient());
    }

    #[test]
    fn test_transient_http_status() {
        assert!(net(NetworkFaultKind::HttpStatus, Some(500)).is_transient());
        assert!(net(NetworkFaultKind::HttpStatus, Some(503)).is_transient());
        assert!(net(NetworkFaultKind::HttpStatus, Some(429)).is_transient());
        assert!(!net(NetworkFaultKind::HttpStatus, Some(400)).is_transient());
        assert!(!net(NetworkFaultKind::HttpStatus, Some(404)).is_transient());
    }

    #[test]
    fn test_validation_never_transient() {
        assert!(!BotError::validation("amount", "must be positive").is_transient());
        assert!(!BotError::Simulation {
            error: "InstructionError".to_string(),
            logs: vec![],
        }
        .is_transient());
    }

    #[test]
    fn test_stage_named_in_message() {
        let err = BotError::api(SwapStage::Build, "missing `txn` in response");
        assert_eq!(err.to_string(), "build failed: missing `txn` in response");
        assert_eq!(err.swap_stage(), Some(SwapStage::Build));

        let err = BotError::stage(SwapStage::Send, "blockhash not found");
        assert!(err.to_string().starts_with("send failed"));
    }

    #[test]
    fn test_exhausted_retries_keep_stage() {
        let err = BotError::RetryExhausted {
            attempts: 3,
            last: Box::new(BotError::internal("connection reset")),
        }
        .at_stage(SwapStage::Build);

        assert_eq!(err.swap_stage(), Some(SwapStage::Build));
        let message = err.to_string();
        assert!(message.contains("build"), "{}", message);
        assert!(message.contains("3 attempts"), "{}", message);
        assert!(message.contains("connection reset"), "{}", message);

        let err = BotError::RetryExhausted {
            attempts: 2,
            last: Box::new(net(NetworkFaultKind::Timeout, None)),
        }
        .at_stage(SwapStage::Build);
        assert_eq!(err.swap_stage(), Some(SwapStage::Build));
    }

    #[test]
    fn test_at_stage_keeps_existing_stage() {
        let err = BotError::stage(SwapStage::Sign, "signer missing").at_stage(SwapStage::Send);
        assert_eq!(err.swap_stage(), Some(SwapStage::Sign));
    }

    #[test]
    fn test_exit_error_message() {
        let err = BotError::ExitedBeforeResponse {
            code: Some(3),
            signal: None,
        };
        assert_eq!(
            err.to_string(),
            "Worker exited before responding (code: 3, signal: none)"
        );
    }

    #[test]
    fn test_body_snippet_truncates() {
        let body = "x".repeat(BODY_SNIPPET_CHARS + 50);
        let snippet = body_snippet(&body);
        assert_eq!(snippet.chars().count(), BODY_SNIPPET_CHARS + 1);
        assert_eq!(body_snippet("  short  "), "short");
    }

    #[test]
    fn test_message_classification() {
        assert_eq!(
            NetworkFaultKind::from_message("error trying to connect: Connection refused (os error 111)"),
            Some(NetworkFaultKind::ConnectionRefused)
        );
        assert_eq!(
            NetworkFaultKind::from_message("dns error: failed to lookup address information"),
            Some(NetworkFaultKind::DnsRetry)
        );
        assert_eq!(NetworkFaultKind::from_message("bad request"), None);
    }
}
