//! CLI command implementations.
//!
//! - `start`: start a server and keep it up until stdin closes
//! - `init`: initialize a cluster without starting it
//! - `port`: allocate a free port
//! - `clean`: sweep stale internal data directories
//! - `show_config`: print the merged configuration
//! - `completions`: generate shell completion scripts

pub mod clean;
pub mod completions;
pub mod init;
pub mod instance_args;
pub mod port;
pub mod show_config;
pub mod start;

pub use clean::CleanCommand;
pub use completions::CompletionsCommand;
pub use init::InitCommand;
pub use instance_args::InstanceArgs;
pub use port::PortCommand;
pub use show_config::ShowConfigCommand;
pub use start::StartCommand;
