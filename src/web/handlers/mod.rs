//! API handlers.

pub mod file;
pub mod folder;
pub mod state;

pub use file::*;
pub use folder::*;
pub use state::AppState;
