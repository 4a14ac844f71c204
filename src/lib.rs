//! Cli/daemon that watches desktop activity and attaches labels to every
//! observation it records. Labels are either applied manually or through
//! condition trees evaluated against each observation's attributes, and
//! everything is stored as plain files that are easy to inspect.

pub mod cli;
pub mod daemon;
pub mod engine;
pub mod labels;
pub mod utils;
pub mod window_api;
