//! Execution driver, REPL session, Import API, and the ambient
//! configuration/prologue layer that ties the lower crates together
//! into a runnable process.

pub mod builtins;
pub mod config;
pub mod context;
pub mod driver;
mod error;
pub mod ffi_api;
pub mod import_api;
pub mod prologue;
pub mod repl;

pub use config::Config;
pub use context::RuntimeContext;
pub use error::RuntimeError;
