use clap::Parser;
use std::path::PathBuf;

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Node-graph pipeline runner
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Project JSON to load (a demo pipeline is built when omitted)
    #[arg(value_name = "PROJECT")]
    pub project: Option<PathBuf>,

    /// Initial credit balance
    #[arg(long = "credits", value_name = "N", default_value_t = crate::config::DEFAULT_CREDITS)]
    pub credits: u32,

    /// Print the cost estimate and exit without running
    #[arg(long = "estimate")]
    pub estimate_only: bool,

    /// Worker threads (default: 3/4 of cores)
    #[arg(long = "threads", value_name = "N")]
    pub threads: Option<usize>,

    /// Save the project back to this path after the run
    #[arg(short = 's', long = "save", value_name = "FILE")]
    pub save: Option<PathBuf>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}
