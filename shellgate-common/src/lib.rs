mod config;
mod error;
mod target;
mod types;

pub use config::*;
pub use error::*;
pub use target::*;
pub use types::*;
