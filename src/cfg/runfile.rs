use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use expanduser::expanduser;
use eyre::{Result, WrapErr};
use serde::Deserialize;
use serde::de::{self, Deserializer, MapAccess, Visitor};

use super::error::RunfileError;
use crate::cli::args::{ArgumentSet, FLAG_PREFIX};
use crate::executor::{DEFAULT_SHELL, Mode, Shell, ShellCommand, Wait};
use crate::logger::Logger;
use crate::script::{Context, Script, ScriptBuilder, Status, TaskFn, TaskFuture};

/// File names tried, in order, in the working directory
pub const RUNFILES: &[&str] = &["Runfile.yml", "Runfile.yaml", "Runfile", ".runfile.yml"];

fn default_shell() -> String {
    DEFAULT_SHELL.to_string()
}

/// The optional `run:` settings block
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RunSpec {
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Default wait for blocking shell helpers, in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    #[serde(default)]
    pub include: Vec<String>,
}

impl Default for RunSpec {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            timeout: None,
            include: Vec::new(),
        }
    }
}

/// A task whose body is a shell script defined in the Runfile
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ActionSpec {
    #[serde(default)]
    pub help: Option<String>,

    pub action: String,

    #[serde(default)]
    pub timeout: Option<u64>,
}

/// One entry under `tasks:`
#[derive(Clone, Debug, PartialEq)]
pub enum SymbolSpec {
    /// A plain string, run verbatim
    Command(String),
    /// A mapping with an `action`
    Action(ActionSpec),
    /// Anything else; bound but never a task
    Data(serde_yaml::Value),
}

impl<'de> Deserialize<'de> for SymbolSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_yaml::Value::deserialize(deserializer)?;
        let is_action = matches!(&value, serde_yaml::Value::Mapping(mapping) if mapping.contains_key("action"));
        if is_action {
            return serde_yaml::from_value(value).map(SymbolSpec::Action).map_err(de::Error::custom);
        }
        Ok(match value {
            serde_yaml::Value::String(command) => SymbolSpec::Command(command),
            other => SymbolSpec::Data(other),
        })
    }
}

pub type SymbolSpecs = Vec<(String, SymbolSpec)>;

/// Read `tasks:` keeping declaration order and every binding, duplicates included
pub fn deserialize_symbol_list<'de, D>(deserializer: D) -> Result<SymbolSpecs, D::Error>
where
    D: Deserializer<'de>,
{
    struct SymbolList;

    impl<'de> Visitor<'de> for SymbolList {
        type Value = SymbolSpecs;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a map of name to task")
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(SymbolSpecs::new())
        }

        fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
        where
            M: MapAccess<'de>,
        {
            let mut symbols = SymbolSpecs::new();
            while let Some((name, spec)) = map.next_entry::<String, SymbolSpec>()? {
                symbols.push((name, spec));
            }
            Ok(symbols)
        }
    }
    deserializer.deserialize_map(SymbolList)
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RunfileSpec {
    #[serde(default)]
    pub run: RunSpec,

    #[serde(default, deserialize_with = "deserialize_symbol_list")]
    pub tasks: SymbolSpecs,
}

/// A parsed Runfile and where it came from
#[derive(Clone, Debug)]
pub struct Runfile {
    pub path: PathBuf,
    pub spec: RunfileSpec,
}

impl Runfile {
    pub fn load(path: &Path) -> Result<Self, RunfileError> {
        let content = fs::read_to_string(path).map_err(|source| RunfileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    pub fn parse(path: impl Into<PathBuf>, content: &str) -> Result<Self, RunfileError> {
        let path = path.into();
        let spec = if content.trim().is_empty() {
            RunfileSpec::default()
        } else {
            serde_yaml::from_str(content).map_err(|source| RunfileError::Parse {
                path: path.clone(),
                source,
            })?
        };
        Ok(Self { path, spec })
    }

    /// Origin recorded on every symbol this file declares
    pub fn module(&self) -> String {
        self.path.display().to_string()
    }

    pub fn default_wait(&self) -> Wait {
        Wait::from_secs(self.spec.run.timeout)
    }

    pub fn shell(&self, logger: Logger) -> Shell {
        Shell::new(logger)
            .with_program(&self.spec.run.shell)
            .with_default_wait(self.default_wait())
    }

    /// Build the namespace: included files first, as imports, then own symbols
    pub fn script(&self, logger: &Logger) -> Result<Script> {
        let mut builder = Script::builder(self.module());
        for include in &self.spec.run.include {
            let path = self.resolve_include(include)?;
            let included = Runfile::load(&path).wrap_err_with(|| format!("while including '{include}'"))?;
            if !included.spec.run.include.is_empty() {
                logger.warn(format_args!(
                    "{} includes other files; only one level of includes is loaded",
                    included.path.display()
                ));
            }
            let imported = bind_symbols(Script::builder(included.module()), &included.spec.tasks).build();
            logger.debug(format_args!(
                "imported {} symbol(s) from {}",
                imported.symbols().len(),
                included.path.display()
            ));
            builder = builder.import(&imported);
        }
        Ok(bind_symbols(builder, &self.spec.tasks).build())
    }

    fn resolve_include(&self, include: &str) -> Result<PathBuf> {
        let path = expanduser(include).wrap_err_with(|| format!("cannot expand include path '{include}'"))?;
        if path.is_absolute() {
            return Ok(path);
        }
        let base = self.path.parent().unwrap_or_else(|| Path::new("."));
        Ok(base.join(path))
    }
}

fn bind_symbols(mut builder: ScriptBuilder, specs: &[(String, SymbolSpec)]) -> ScriptBuilder {
    for (name, spec) in specs {
        builder = match spec {
            SymbolSpec::Command(command) => builder.command(name, command),
            SymbolSpec::Action(action) => {
                let builder = builder.callable(name, shell_action(action));
                match &action.help {
                    Some(help) => builder.help(help),
                    None => builder,
                }
            }
            SymbolSpec::Data(value) => builder.value(name, value.clone()),
        };
    }
    builder
}

/// Run an action script with positional args as `$1..$n` and flags as env vars
fn shell_action(spec: &ActionSpec) -> TaskFn {
    let script = spec.action.clone();
    let timeout = spec.timeout;
    Arc::new(move |args: ArgumentSet, ctx: Context| -> TaskFuture {
        let envs = flag_envs(&args, ctx.logger());
        let command = ShellCommand {
            script: script.clone(),
            args: args.positional,
            envs,
        };
        Box::pin(async move {
            let wait = timeout
                .map(|secs| Wait::Timeout(Duration::from_secs(secs)))
                .unwrap_or(ctx.shell().default_wait());
            let handle = ctx.shell().execute(command, Mode::Stream, wait).await?;
            Ok::<_, eyre::Report>(Status::from(&handle))
        })
    })
}

/// Environment name for a flag: `--dry-run` becomes `dry_run`
pub fn env_name(flag: &str) -> Option<String> {
    let name = flag.strip_prefix(FLAG_PREFIX).unwrap_or(flag).replace('-', "_");
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some(name)
}

fn flag_envs(args: &ArgumentSet, logger: &Logger) -> Vec<(String, String)> {
    let mut envs: Vec<(String, String)> = args
        .flags
        .iter()
        .filter_map(|(flag, value)| match env_name(flag) {
            Some(name) => Some((name, value.clone())),
            None => {
                logger.warn(format_args!("flag {flag} is not a valid variable name, not exported"));
                None
            }
        })
        .collect();
    envs.sort();
    envs
}

/// First Runfile present in `dir`
pub fn find_runfile(dir: &Path) -> Option<PathBuf> {
    RUNFILES.iter().map(|name| dir.join(name)).find(|path| path.is_file())
}

/// Resolve a user-supplied path: `~` is expanded, a directory is searched
pub fn divine_runfile(value: &str) -> Result<PathBuf, RunfileError> {
    let path = expanduser(value).map_err(|source| RunfileError::Read {
        path: PathBuf::from(value),
        source,
    })?;
    if path.is_dir() {
        return find_runfile(&path).ok_or_else(|| RunfileError::NotFound {
            searched: RUNFILES.iter().map(|name| path.join(name)).collect(),
        });
    }
    if path.is_file() {
        Ok(path)
    } else {
        Err(RunfileError::NotFound { searched: vec![path] })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::dispatch::{Dispatcher, TASK_NOT_FOUND};
    use crate::script::{Registry, TaskKind};
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
run:
  shell: sh
  timeout: 30

tasks:
  shell_test:
    help: Exercise the shell helpers
    action: echo "$1"
  dir_usage: du -sh . *
  _setup:
    action: mkdir -p build
  retries: 3
  info: uname -a
"#;

    #[test]
    fn test_parse_sample() -> Result<()> {
        let runfile = Runfile::parse("Runfile.yml", SAMPLE)?;
        assert_eq!(runfile.spec.run.shell, "sh");
        assert_eq!(runfile.spec.run.timeout, Some(30));
        assert_eq!(runfile.default_wait(), Wait::Timeout(Duration::from_secs(30)));

        let names: Vec<&str> = runfile.spec.tasks.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["shell_test", "dir_usage", "_setup", "retries", "info"]);

        match &runfile.spec.tasks[0].1 {
            SymbolSpec::Action(action) => {
                assert_eq!(action.action, "echo \"$1\"");
                assert_eq!(action.help.as_deref(), Some("Exercise the shell helpers"));
            }
            other => panic!("unexpected spec {other:?}"),
        }
        assert_eq!(runfile.spec.tasks[1].1, SymbolSpec::Command("du -sh . *".to_string()));
        assert!(matches!(runfile.spec.tasks[3].1, SymbolSpec::Data(_)));
        Ok(())
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let runfile = Runfile::parse("Runfile.yml", "tasks:\n  a: 'true'\n")?;
        assert_eq!(runfile.spec.run, RunSpec::default());
        assert_eq!(runfile.default_wait(), Wait::Forever);

        let empty = Runfile::parse("Runfile.yml", "")?;
        assert!(empty.spec.tasks.is_empty());
        Ok(())
    }

    #[test]
    fn test_mapping_without_action_is_data() -> Result<()> {
        let runfile = Runfile::parse("Runfile.yml", "tasks:\n  settings:\n    cpus: 4\n")?;
        assert!(matches!(runfile.spec.tasks[0].1, SymbolSpec::Data(_)));
        Ok(())
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let err = Runfile::parse("Runfile.yml", "tasks: [unclosed").unwrap_err();
        assert!(matches!(err, RunfileError::Parse { .. }));
    }

    #[test]
    fn test_registry_from_runfile() -> Result<()> {
        let runfile = Runfile::parse("Runfile.yml", SAMPLE)?;
        let script = runfile.script(&Logger::disabled())?;
        let registry = Registry::discover(&script);

        assert_eq!(registry.names(), vec!["shell_test", "dir_usage", "info"]);
        let task = registry.resolve("shell_test").unwrap();
        assert!(matches!(task.kind, TaskKind::Callable(_)));
        assert_eq!(task.help.as_deref(), Some("Exercise the shell helpers"));
        Ok(())
    }

    #[test]
    fn test_duplicate_name_last_definition_wins() -> Result<()> {
        let runfile = Runfile::parse("Runfile.yml", "tasks:\n  build: make\n  test: make test\n  build: cargo build\n")?;
        let script = runfile.script(&Logger::disabled())?;
        let registry = Registry::discover(&script);

        assert_eq!(registry.names(), vec!["build", "test"]);
        match &registry.resolve("build").unwrap().kind {
            TaskKind::LiteralCommand(cmd) => assert_eq!(cmd, "cargo build"),
            other => panic!("unexpected kind {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_includes_are_imported_as_helpers() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::create_dir_all(temp_dir.path().join("lib"))?;
        fs::write(
            temp_dir.path().join("lib").join("common.yml"),
            "tasks:\n  shared_action:\n    action: echo shared\n  shared_command: echo command\n",
        )?;
        let runfile_path = temp_dir.path().join("Runfile.yml");
        fs::write(
            &runfile_path,
            "run:\n  include: [lib/common.yml]\ntasks:\n  own:\n    action: echo own\n",
        )?;

        let runfile = Runfile::load(&runfile_path)?;
        let script = runfile.script(&Logger::disabled())?;
        assert!(script.get("shared_action").is_some());

        let registry = Registry::discover(&script);
        assert_eq!(registry.names(), vec!["shared_command", "own"]);
        Ok(())
    }

    #[test]
    fn test_missing_include_is_an_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let runfile_path = temp_dir.path().join("Runfile.yml");
        fs::write(&runfile_path, "run:\n  include: [missing.yml]\n")?;

        let runfile = Runfile::load(&runfile_path)?;
        let err = runfile.script(&Logger::disabled()).unwrap_err();
        assert!(format!("{err:#}").contains("missing.yml"));
        Ok(())
    }

    #[test]
    fn test_env_name() {
        assert_eq!(env_name("--dry-run").as_deref(), Some("dry_run"));
        assert_eq!(env_name("--cpus").as_deref(), Some("cpus"));
        assert_eq!(env_name("--_x1").as_deref(), Some("_x1"));
        assert_eq!(env_name("--").as_deref(), None);
        assert_eq!(env_name("--1st").as_deref(), None);
        assert_eq!(env_name("--a.b").as_deref(), None);
    }

    #[tokio::test]
    async fn test_action_receives_args_and_flags() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let marker = temp_dir.path().join("out.txt");
        let content = format!(
            "tasks:\n  record:\n    action: printf '%s|%s|%s' \"$1\" \"$2\" \"$dry_run\" > '{}'\n",
            marker.display()
        );
        let runfile = Runfile::parse(temp_dir.path().join("Runfile.yml"), &content)?;
        let logger = Logger::disabled();
        let script = runfile.script(&logger)?;
        let dispatcher = Dispatcher::new(runfile.shell(logger.clone()), logger);

        let argv: Vec<String> = ["record", "vm1", "--dry-run=yes", "two words"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut out = Vec::new();
        let code = dispatcher.dispatch(&script, &argv, &mut out).await?;

        assert_eq!(code, 0);
        assert_eq!(fs::read_to_string(&marker)?, "vm1|two words|yes");
        Ok(())
    }

    #[tokio::test]
    async fn test_action_exit_status_propagates() -> Result<()> {
        let runfile = Runfile::parse("Runfile.yml", "tasks:\n  fail:\n    action: exit 4\n")?;
        let logger = Logger::disabled();
        let script = runfile.script(&logger)?;
        let dispatcher = Dispatcher::new(runfile.shell(logger.clone()), logger);

        let mut out = Vec::new();
        assert_eq!(dispatcher.dispatch(&script, &["fail".to_string()], &mut out).await?, 4);
        assert_eq!(
            dispatcher.dispatch(&script, &["missing".to_string()], &mut out).await?,
            TASK_NOT_FOUND
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_action_timeout_fails_the_task() -> Result<()> {
        let runfile = Runfile::parse("Runfile.yml", "tasks:\n  slow:\n    action: sleep 5\n    timeout: 1\n")?;
        let logger = Logger::disabled();
        let script = runfile.script(&logger)?;
        let dispatcher = Dispatcher::new(runfile.shell(logger.clone()), logger);

        let started = std::time::Instant::now();
        let mut out = Vec::new();
        let code = dispatcher.dispatch(&script, &["slow".to_string()], &mut out).await?;
        assert_eq!(code, crate::cli::dispatch::TASK_FAILED);
        assert!(started.elapsed() < Duration::from_secs(4));
        Ok(())
    }

    #[test]
    fn test_find_and_divine_runfile() -> Result<()> {
        let temp_dir = TempDir::new()?;
        assert!(find_runfile(temp_dir.path()).is_none());
        assert!(matches!(
            divine_runfile(&temp_dir.path().display().to_string()),
            Err(RunfileError::NotFound { .. })
        ));

        let runfile_path = temp_dir.path().join("Runfile.yaml");
        fs::write(&runfile_path, "tasks: {}\n")?;
        assert_eq!(find_runfile(temp_dir.path()), Some(runfile_path.clone()));
        assert_eq!(divine_runfile(&temp_dir.path().display().to_string())?, runfile_path);
        assert_eq!(divine_runfile(&runfile_path.display().to_string())?, runfile_path);

        // first name in the search order wins
        let preferred = temp_dir.path().join("Runfile.yml");
        fs::write(&preferred, "tasks: {}\n")?;
        assert_eq!(find_runfile(temp_dir.path()), Some(preferred));
        Ok(())
    }
}
