use colored::Colorize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    UnknownTask { name: String, suggestions: Vec<String> },
    TaskFailed { name: String, error: String },
    TaskPanicked { name: String },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::UnknownTask { name, suggestions } => {
                write!(f, "{}: invalid task: {}", "error".red().bold(), name)?;

                if !suggestions.is_empty() {
                    writeln!(f)?;
                    writeln!(f)?;
                    if suggestions.len() == 1 {
                        write!(f, "Did you mean '{}'?", suggestions[0].green())?;
                    } else {
                        writeln!(f, "Did you mean one of these?")?;
                        for (i, suggestion) in suggestions.iter().enumerate() {
                            if i > 0 {
                                writeln!(f)?;
                            }
                            write!(f, "    {}", suggestion.green())?;
                        }
                    }
                }
                writeln!(f)?;
                write!(f, "\nAvailable tasks:")
            }

            DispatchError::TaskFailed { name, error } => {
                write!(f, "{}: task '{}' failed: {}", "error".red().bold(), name.blue(), error)
            }

            DispatchError::TaskPanicked { name } => {
                write!(f, "{}: task '{}' panicked", "error".red().bold(), name.blue())
            }
        }
    }
}

impl std::error::Error for DispatchError {}

/// Up to three task names within edit distance 3 of `invalid_name`, closest first
pub fn suggest_similar_task_names(invalid_name: &str, valid_tasks: &[&str]) -> Vec<String> {
    let mut suggestions: Vec<(String, usize)> = valid_tasks
        .iter()
        .map(|task| (task.to_string(), levenshtein::levenshtein(invalid_name, task)))
        .filter(|(_, distance)| *distance <= 3)
        .collect();

    suggestions.sort_by_key(|(_, distance)| *distance);
    suggestions.into_iter().take(3).map(|(name, _)| name).collect()
}
