//! resourceql CLI entry point
//!
//! Parses arguments and dispatches through `cli::run`. Errors are printed
//! to stderr with their code and the process exits non-zero.

use resourceql::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}: {}", e.code(), e);
        std::process::exit(1);
    }
}
