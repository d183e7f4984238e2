//! `log`: the persisted activity log, newest first.

use chrono::Local;
use tabled::Tabled;

use hassdeck_config::{Config, LOGS_KEY};
use hassdeck_core::ActivityEntry;

use crate::cli::{GlobalOpts, LogArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct LogRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Activity")]
    message: String,
}

fn row(entry: &ActivityEntry) -> LogRow {
    LogRow {
        time: entry
            .time
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        message: entry.message.clone(),
    }
}

pub fn handle(args: LogArgs, global: &GlobalOpts, cfg: &Config) -> Result<(), CliError> {
    let store = config::open_store(global, cfg)?;

    if args.clear {
        store.remove(LOGS_KEY)?;
        output::print_output(&output::success("Activity log cleared"), global.quiet);
        return Ok(());
    }

    let mut entries = store.load_activity();
    entries.truncate(args.limit);
    let out = output::render_list(&global.output, &entries, row, |e| e.message.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
