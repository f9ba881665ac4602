//! Bash completion for task names

use crate::cfg::RUNFILES;

/// Completion script for `bin`; task names come from `bin`'s listing mode,
/// and nothing is offered unless a Runfile sits in the current directory.
pub fn bash_script(bin: &str) -> String {
    let runfiles = RUNFILES.join(" ");
    format!(
        r#"# bash completion for {bin}
# source it from ~/.bashrc:  source <({bin} --completion)
_{func}_complete() {{
  local runfile found=""
  for runfile in {runfiles}; do
    [[ -f "./$runfile" ]] && found=1 && break
  done
  [[ -z "$found" ]] && return
  [[ $COMP_CWORD -ne 1 ]] && return
  local prefix=${{COMP_WORDS[$COMP_CWORD]}}
  COMPREPLY=($(compgen -W "$({bin} 2>/dev/null)" -- "$prefix"))
}}
if [[ -n "${{ZSH_VERSION+x}}" ]]; then
  autoload -Uz compinit && compinit
  autoload -Uz bashcompinit && bashcompinit
fi
complete -F _{func}_complete {bin}
"#,
        bin = bin,
        func = bin.replace(|c: char| !c.is_ascii_alphanumeric(), "_"),
        runfiles = runfiles,
    )
}
