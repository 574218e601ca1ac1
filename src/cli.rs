//! CLI domain: parse, route, output, and presentation only.
//! No domain orchestration; a single route table dispatches to the janitor facade.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands};
pub use presentation::{
    format_progress_json, format_progress_text, format_purge_outcome, format_room_report_json,
    format_room_report_text, format_verify_result,
};
pub use route::RunContext;
