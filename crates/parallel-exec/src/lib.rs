pub mod executor;
pub mod partition;

pub use executor::*;
pub use partition::*;
