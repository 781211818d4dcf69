//! CLI commands

pub mod repo;
