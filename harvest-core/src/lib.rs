pub mod config;
pub mod error;
pub mod error_utils;
pub mod normalize;
pub mod signals;
pub mod types;

pub use config::*;
pub use error::*;
pub use error_utils::*;
pub use signals::*;
pub use types::*;
