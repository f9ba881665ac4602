use std::env;
use std::io;

use clap::Parser;
use runfile::app::{run_cli, setup_logging};
use runfile::cli::Cli;
use runfile::cli::completion::bash_script;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if !atty::is(atty::Stream::Stdout) {
        colored::control::set_override(false);
    }

    if cli.completion {
        print!("{}", bash_script("run"));
        return;
    }

    let logger = match setup_logging(cli.log_file.as_deref()) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("{e:#}");
            std::process::exit(1);
        }
    };
    logger.info(format_args!("Starting run"));

    let cwd = match env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            eprintln!("Cannot read the current directory: {e}");
            std::process::exit(1);
        }
    };

    let code = match run_cli(&cli, &cwd, &logger, &mut io::stdout()).await {
        Ok(code) => code,
        Err(e) => {
            logger.error(format_args!("{e:#}"));
            eprintln!("{e:#}");
            1
        }
    };
    logger.flush();
    std::process::exit(code);
}
