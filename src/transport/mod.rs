pub mod paper;
pub mod rpc;
mod traits;

pub use paper::{PaperLedger, PaperLedgerConfig};
pub use rpc::RpcTransport;
pub use traits::{
    Commitment, ConfirmationBound, ConfirmationOutcome, ConfirmationRequest, SimulationOutcome,
    SubmitOptions, Transport,
};

#[cfg(test)]
pub use traits::MockTransport;
