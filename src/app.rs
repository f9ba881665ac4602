use std::env;
use std::io::{self, Write};
use std::path::Path;

use eyre::{Result, WrapErr};

use crate::cfg::{Runfile, divine_runfile, find_runfile};
use crate::cli::{Cli, Dispatcher, scaffold};
use crate::executor::Shell;
use crate::logger::{LogSink, Logger};
use crate::script::Script;

/// Environment variable naming the log sink for [`run_main`]
pub const LOG_FILE_ENV: &str = "RUN_LOG_FILE";

/// Build the logger: `log_file` if given (`-` for stderr), else the data dir file
pub fn setup_logging(log_file: Option<&Path>) -> Result<Logger> {
    let sink = match log_file {
        Some(path) => LogSink::parse(&path.to_string_lossy()),
        None => LogSink::default_file()?,
    };
    Logger::new(&sink).wrap_err("Failed to setup logging")
}

/// What the front-end resolved to run against
#[derive(Debug)]
enum Target {
    Loaded { script: Script, shell: Shell },
    Scaffold,
    Bare,
}

fn resolve_target(cli: &Cli, cwd: &Path, logger: &Logger) -> Result<Target> {
    let path = match &cli.runfile {
        Some(value) => Some(divine_runfile(value)?),
        None => find_runfile(cwd),
    };

    match path {
        Some(path) => {
            logger.info(format_args!("loading {}", path.display()));
            let runfile = Runfile::load(&path)?;
            let script = runfile.script(logger)?;
            let shell = runfile.shell(logger.clone());
            Ok(Target::Loaded { script, shell })
        }
        None if cli.argv.is_empty() => Ok(Target::Scaffold),
        None => {
            logger.info(format_args!("no Runfile in {}", cwd.display()));
            Ok(Target::Bare)
        }
    }
}

/// Run the CLI against `cwd`, writing listings and diagnostics to `out`
pub async fn run_cli(cli: &Cli, cwd: &Path, logger: &Logger, out: &mut dyn Write) -> Result<i32> {
    let (script, shell) = match resolve_target(cli, cwd, logger)? {
        Target::Loaded { script, shell } => (script, shell),
        Target::Scaffold => {
            let path = scaffold(cwd)?;
            logger.info(format_args!("scaffolded {}", path.display()));
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            writeln!(out, "{name} created!")?;
            return Ok(0);
        }
        Target::Bare => (Script::empty(cwd.display().to_string()), Shell::new(logger.clone())),
    };

    Dispatcher::new(shell, logger.clone())
        .dispatch(&script, &cli.argv, out)
        .await
}

/// Dispatch `std::env::args` against a script built in Rust, then exit.
///
/// Logs go to `RUN_LOG_FILE` (`-` for stderr) or the default log file.
pub fn run_main(script: Script) -> ! {
    let log_file = env::var_os(LOG_FILE_ENV);
    let logger = match setup_logging(log_file.as_deref().map(Path::new)) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("{e:#}");
            std::process::exit(1);
        }
    };

    let argv: Vec<String> = env::args().skip(1).collect();
    let dispatcher = Dispatcher::new(Shell::new(logger.clone()), logger.clone());
    let outcome = tokio::runtime::Runtime::new()
        .wrap_err("Failed to start the async runtime")
        .and_then(|runtime| runtime.block_on(dispatcher.dispatch(&script, &argv, &mut io::stdout())));
    let code = match outcome {
        Ok(code) => code,
        Err(e) => {
            logger.error(format_args!("{e:#}"));
            eprintln!("{e:#}");
            1
        }
    };
    logger.flush();
    std::process::exit(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    async fn run_in(dir: &Path, args: &[&str]) -> Result<(i32, String)> {
        let cli = Cli::try_parse_from(std::iter::once("run").chain(args.iter().copied()))?;
        let mut out = Vec::new();
        let code = run_cli(&cli, dir, &Logger::disabled(), &mut out).await?;
        Ok((code, String::from_utf8(out)?))
    }

    #[tokio::test]
    async fn test_scaffolds_when_no_runfile() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let (code, out) = run_in(temp_dir.path(), &[]).await?;
        assert_eq!(code, 0);
        assert_eq!(out, "Runfile.yml created!\n");
        assert!(temp_dir.path().join("Runfile.yml").is_file());

        let (code, out) = run_in(temp_dir.path(), &[]).await?;
        assert_eq!(code, 0);
        assert_eq!(out, "hello\ninfo\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_task_without_runfile_is_not_found() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let (code, _) = run_in(temp_dir.path(), &["build"]).await?;
        assert_eq!(code, crate::cli::TASK_NOT_FOUND);
        assert!(!temp_dir.path().join("Runfile.yml").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_explicit_runfile_option() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("tasks.yml");
        fs::write(&path, "tasks:\n  fail: exit 9\n")?;

        let path = path.to_string_lossy().into_owned();
        let (code, _) = run_in(temp_dir.path(), &["-f", &path, "fail"]).await?;
        assert_eq!(code, 9);
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_runfile_is_an_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("Runfile.yml"), "tasks: [unclosed\n")?;
        assert!(run_in(temp_dir.path(), &[]).await.is_err());
        Ok(())
    }
}
