//! Side-effecting adapters: child processes, the perception command, config files.

pub mod config;
pub mod oracle;
pub mod process;
pub mod shutdown;
