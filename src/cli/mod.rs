pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{AuditArgs, CliArgs, Commands, CrawlArgs, OutputFormatArg, ResumeArgs};
pub use output::{OutputFormat, OutputFormatter};
