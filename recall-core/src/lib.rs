pub mod errors;
pub mod filters;
pub mod models;
pub mod scheduler;
pub mod stats;

pub use errors::*;
pub use filters::*;
pub use models::*;
pub use scheduler::*;
pub use stats::*;
