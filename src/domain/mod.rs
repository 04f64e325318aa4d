pub mod progress;
pub mod state;
pub mod transaction;

pub use progress::*;
pub use state::*;
pub use transaction::*;
