//! Command schema registry for multiplexed module channels.
//!
//! Some ports carry many distinct command types under one module identifier
//! (the generic plugin port, for instance). This crate validates an
//! envelope's shape against the module's declared schemas before the bound
//! handler runs, and distinguishes "right path, wrong fields" from "no such
//! command" in its error taxonomy.

pub mod config;
pub mod error;
pub mod registry;

pub use config::RegistryConfig;
pub use error::{Result, SchemaError};
pub use registry::{CommandHandler, CommandRegistry};
