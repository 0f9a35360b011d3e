use clap::Parser;

use fabrika::cli::Args;
use fabrika::runner;

fn main() {
    let args = Args::parse();
    if let Err(e) = runner::run_app(args) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
