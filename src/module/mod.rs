//! Runnable modules, each bundling a piece of functionality with its configuration

pub mod options;

pub mod client;
pub mod directory;
