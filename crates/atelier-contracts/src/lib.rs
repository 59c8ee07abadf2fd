//! Shared domain contracts for the editing studio: session state machine,
//! operation requests and directives, error taxonomy, event log, model
//! catalog, and the REPL command grammar. No network or raster work here.

pub mod commands;
pub mod directive;
pub mod error;
pub mod events;
pub mod image;
pub mod models;
pub mod request;
pub mod session;
