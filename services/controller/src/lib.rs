//! StaticPage controller library.
//!
//! This crate primarily ships a `staticpage-controller` binary, but we expose
//! the converger, dispatcher and in-memory store as a library surface to
//! enable integration testing and reuse.

pub mod api;
pub mod config;
pub mod controller;
pub mod converger;
pub mod derive;
pub mod manifest;
pub mod store;

pub use controller::{Controller, ControllerConfig};
pub use converger::{CancelSignal, ConvergeError, Converger, Outcome};
pub use store::{MemoryStore, StateStore, StoreError};
