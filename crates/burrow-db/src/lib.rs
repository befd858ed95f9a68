//! Postgres persistence for burrow: projects, conversations and their
//! message transcripts.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
