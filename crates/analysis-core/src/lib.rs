pub mod error;
pub mod fingerprint;
pub mod types;

pub use error::*;
pub use fingerprint::*;
pub use types::*;
