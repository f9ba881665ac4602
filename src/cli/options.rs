use std::path::PathBuf;

use clap::Parser;

/// A minimalist task runner: `run` lists the tasks of the Runfile in the
/// current directory, `run <task> [args...]` runs one of them.
#[derive(Debug, Parser)]
#[command(name = "run", version, about, long_about = None)]
pub struct Cli {
    /// Runfile to load instead of the one in the current directory
    #[arg(short = 'f', long = "runfile", value_name = "PATH", env = "RUNFILE")]
    pub runfile: Option<String>,

    /// Write logs here; `-` means stderr
    #[arg(long = "log-file", value_name = "PATH", env = "RUN_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Print the bash completion script and exit
    #[arg(long)]
    pub completion: bool,

    /// Task name followed by its arguments, passed through untouched
    #[arg(value_name = "TASK", trailing_var_arg = true, allow_hyphen_values = true)]
    pub argv: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_arguments() {
        let cli = Cli::parse_from(["run"]);
        assert!(cli.argv.is_empty());
        assert!(!cli.completion);
    }

    #[test]
    fn test_task_options_are_forwarded() {
        let cli = Cli::parse_from(["run", "deploy", "prod", "--dry-run", "--help", "-f", "x"]);
        assert_eq!(cli.argv, vec!["deploy", "prod", "--dry-run", "--help", "-f", "x"]);
        assert_eq!(cli.runfile, None);
    }

    #[test]
    fn test_global_options_before_task() {
        let cli = Cli::parse_from(["run", "-f", "~/tasks.yml", "--log-file", "-", "build"]);
        assert_eq!(cli.runfile.as_deref(), Some("~/tasks.yml"));
        assert_eq!(cli.log_file, Some(PathBuf::from("-")));
        assert_eq!(cli.argv, vec!["build"]);
    }

    #[test]
    fn test_completion_flag() {
        let cli = Cli::parse_from(["run", "--completion"]);
        assert!(cli.completion);
    }
}
