use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Result, eyre};

use crate::cfg::RUNFILES;

const TEMPLATE: &str = r#"# Runfile: `run` lists these tasks, `run <task> [args...]` runs one.
#
# A string is run as-is by the shell. A task with an `action` receives its
# positional arguments as $1..$n and each --flag[=value] as an environment
# variable (--dry-run=1 becomes dry_run=1). Names starting with _ are private.

run:
  shell: sh

tasks:
  hello:
    help: Say hello
    action: echo "hello ${1:-world} from $(pwd)"

  info: uname -a
"#;

/// Write the template Runfile into `dir`; refuses to overwrite
pub fn scaffold(dir: &Path) -> Result<PathBuf> {
    let path = dir.join(RUNFILES[0]);
    if path.exists() {
        return Err(eyre!("{} already exists", path.display()));
    }
    fs::write(&path, TEMPLATE)?;
    Ok(path)
}
