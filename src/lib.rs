pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod projection;
pub mod session;
pub mod signing;
pub mod transport;

pub use config::AppConfig;
pub use domain::{ExecutionResult, SessionState, StepProgress, StepStatus};
pub use engine::{ExecutionEngine, StepDescriptor};
pub use error::{Result, SeqError};
pub use session::{SessionController, SessionDeps, SessionEvent};
pub use signing::Signer;
pub use transport::Transport;
