pub mod constants;
pub mod duration;
pub mod encoding;
pub mod error;
pub mod types;

pub use constants::*;
pub use duration::parse_duration;
pub use error::CustodiaError;
pub use types::*;
