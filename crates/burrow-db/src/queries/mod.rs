//! Query functions, one module per table.

pub mod conversations;
pub mod messages;
pub mod projects;
