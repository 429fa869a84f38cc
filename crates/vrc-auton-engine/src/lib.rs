pub mod actions;
pub mod editing;
pub mod io;
pub mod models;
pub mod parsing;
pub mod session;

#[cfg(test)]
pub mod tests;

// Re-export key types for easier usage
pub use actions::*;
pub use editing::*;
pub use io::*;
pub use models::*;
pub use parsing::{PatternLibrary, scan, scan_with_offset};
pub use session::*;
