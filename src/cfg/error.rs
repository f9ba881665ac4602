use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum RunfileError {
    NotFound { searched: Vec<PathBuf> },
    Read { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, source: serde_yaml::Error },
}

impl fmt::Display for RunfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunfileError::NotFound { searched } => {
                write!(f, "no Runfile found; looked for:")?;
                for path in searched {
                    write!(f, "\n  - {}", path.display())?;
                }
                Ok(())
            }
            RunfileError::Read { path, source } => write!(f, "cannot read {}: {}", path.display(), source),
            RunfileError::Parse { path, source } => write!(f, "invalid Runfile {}: {}", path.display(), source),
        }
    }
}

impl std::error::Error for RunfileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunfileError::NotFound { .. } => None,
            RunfileError::Read { source, .. } => Some(source),
            RunfileError::Parse { source, .. } => Some(source),
        }
    }
}
