/// Swap execution
///
/// Payload validation, the two quote/swap transports, the shared
/// sign-and-submit pipeline, and the worker-side composition that ties them
/// together.
pub mod monitor;
pub mod normalize;
pub mod pipeline;
pub mod raptor;
pub mod router;
pub mod types;
pub mod v3;
pub mod validator;
pub mod worker;

pub use monitor::{MonitorHandler, MonitorReport, MonitorRequest};
pub use normalize::{Amount, PriorityFee, PriorityFeeLevel, Side, TxVersion, SOL_MINT};
pub use router::{ExecutorDeps, ExecutorRegistry, SwapExecutor, SwapRequest};
pub use types::{ExecutionResult, QuoteSummary, Timing};
pub use validator::{validate_swap_payload, SwapInstruction};
pub use worker::SwapWorker;
