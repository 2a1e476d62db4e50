//! CLI commands

pub mod keyboard;
pub mod run;
pub mod scan;
pub mod serve;
