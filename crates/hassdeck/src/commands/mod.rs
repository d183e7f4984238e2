//! Command dispatch: bridges CLI args -> core operations -> output formatting.

pub mod config_cmd;
pub mod control;
pub mod devices;
pub mod log;
pub mod map;
pub mod remote;
pub mod util;
pub mod watch;

use hassdeck_config::Config;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a command that works on devices, persisted state, or the hub.
pub async fn dispatch(cmd: Command, global: &GlobalOpts, cfg: &Config) -> Result<(), CliError> {
    match cmd {
        Command::Devices(args) => devices::handle(args, global, cfg).await,
        Command::Map(args) => map::handle(args, global, cfg),
        Command::Control(args) => control::handle(args, global, cfg).await,
        Command::Remote(args) => remote::handle(args, global, cfg).await,
        Command::Watch(args) => watch::handle(args, global, cfg).await,
        Command::Log(args) => log::handle(args, global, cfg),
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "config and completions are handled before dispatch".into(),
        )),
    }
}
