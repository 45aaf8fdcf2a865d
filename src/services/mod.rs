pub mod net_value;
pub mod reconciliation;

pub use net_value::{split_net_value, NetValueSplit};
pub use reconciliation::ReconciliationCoordinator;
