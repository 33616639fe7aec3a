//! Various options usable by modules
//!
//! The structs in this module allow other modules to flatten them into
//! their own options struct. This allows for a unified yet non-cluttered
//! option set.

use structopt::StructOpt;

/// Options shared by every command
#[derive(Debug, StructOpt)]
pub struct SharedOptions {
    /// Log level, scopable to different modules
    ///
    /// Levels: trace, debug, info, warn, error
    #[structopt(
        short,
        long,
        global = true,
        default_value = "warn",
        env = "RUST_LOG",
        value_name = "level"
    )]
    pub log: String,
}

/// Options for reaching a directory node
#[derive(Debug, StructOpt)]
pub struct DirectoryNodeOptions {
    /// Address of the directory node
    #[structopt(
        short = "d",
        long = "directory",
        env = "EXECGRID_DIRECTORY",
        global = true,
        default_value = "127.0.0.1:47100",
        value_name = "host:port"
    )]
    pub address: String,
}
