use clap::Parser;
use std::process::ExitCode;

use bidsget::app::{run, Outcome};
use bidsget::cli::Args;
use bidsget::error::QueryError;
use bidsget::logging;

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.verbose);

    match run(&args) {
        Ok(Outcome::Match(path)) => {
            println!("{}", path.display());
            ExitCode::SUCCESS
        }
        Ok(Outcome::ConfigShown(text)) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            match e.downcast_ref::<QueryError>() {
                Some(q) => eprintln!("{q}"),
                None => eprintln!("Error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
