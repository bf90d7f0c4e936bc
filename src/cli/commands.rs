use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Exploratory testing engine for running web applications
#[derive(Parser, Debug)]
#[command(
    name = "siteprobe",
    about = "Exploratory testing engine for running web applications",
    version,
    author,
    long_about = "siteprobe crawls a running web application, tracks logical route \
                  coverage, orchestrates a multi-phase audit pipeline with budgets and \
                  crash-safe resume, and verifies candidate findings by repeated \
                  reproduction."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(
        short = 'v',
        long,
        global = true,
        help = "Increase verbosity (can be used multiple times)"
    )]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Run a full audit against a target application",
        long_about = "Runs the full audit pipeline: preflight, code analysis, \
                      exploration, interaction testing, aggregation, verification and \
                      summary. State is checkpointed after every phase.\n\n\
                      Examples:\n  \
                      siteprobe audit https://staging.example.com\n  \
                      siteprobe audit https://staging.example.com --max-pages 100\n  \
                      siteprobe audit https://staging.example.com --format json"
    )]
    Audit(AuditArgs),

    #[command(
        about = "Resume an interrupted audit from its last checkpoint",
        long_about = "Loads the checkpoint from the state directory and continues at \
                      the phase after the last completed one. A missing or corrupt \
                      checkpoint starts a fresh run.\n\n\
                      Examples:\n  \
                      siteprobe resume\n  \
                      siteprobe resume --state-dir ./audit-state"
    )]
    Resume(ResumeArgs),

    #[command(
        about = "Crawl a target without running the full pipeline",
        long_about = "Runs exploration only: breadth-first crawl with route-pattern \
                      coverage tracking and a persistent queue.\n\n\
                      Examples:\n  \
                      siteprobe crawl https://staging.example.com\n  \
                      siteprobe crawl https://staging.example.com --max-pages 20"
    )]
    Crawl(CrawlArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct AuditArgs {
    #[arg(value_name = "URL", help = "Base URL of the application under test")]
    pub target: String,

    #[arg(
        long,
        value_name = "DIR",
        help = "Directory for checkpoints, queue state and findings"
    )]
    pub state_dir: Option<PathBuf>,

    #[arg(
        long,
        value_name = "DIR",
        help = "Local codebase path for the code-analysis phase"
    )]
    pub codebase: Option<PathBuf>,

    #[arg(long, value_name = "N", help = "Maximum pages to visit while crawling")]
    pub max_pages: Option<usize>,

    #[arg(
        long,
        value_name = "UNITS",
        help = "Total executor cost budget across delegated phases"
    )]
    pub budget: Option<f64>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct ResumeArgs {
    #[arg(
        long,
        value_name = "DIR",
        help = "State directory of the interrupted audit"
    )]
    pub state_dir: Option<PathBuf>,

    #[arg(
        long,
        value_name = "URL",
        help = "Target URL (defaults to the one recorded in the checkpoint)"
    )]
    pub target: Option<String>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct CrawlArgs {
    #[arg(value_name = "URL", help = "Base URL to crawl")]
    pub target: String,

    #[arg(long, value_name = "N", help = "Maximum pages to visit")]
    pub max_pages: Option<usize>,

    #[arg(long, value_name = "N", help = "Maximum crawl depth")]
    pub max_depth: Option<u32>,

    #[arg(
        long,
        value_name = "MS",
        help = "Delay between page visits in milliseconds"
    )]
    pub rate_limit_ms: Option<u64>,

    #[arg(
        long,
        value_name = "DIR",
        help = "Directory for the persistent crawl queue"
    )]
    pub state_dir: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormatArg {
    Human,
    Json,
}
