mod admission;
mod auth;
mod services;
mod state;
mod store;

pub use admission::*;
pub use auth::*;
pub use services::*;
pub use state::*;
pub use store::*;
