//! CLI subcommand implementations.

pub mod gateway;
pub mod listen;
pub mod send;
