//! Command handlers -- one module per subcommand group

pub mod analyze;
pub mod config;
pub mod decode;
pub mod rules;
pub mod tasks;
