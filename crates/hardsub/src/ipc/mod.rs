//! IPC (Inter-Process Communication) Module
//!
//! The boundary a frontend talks to: JSON commands in, queue events out.

pub mod commands;
pub mod events;

pub use commands::*;
pub use events::*;
