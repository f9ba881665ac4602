use std::collections::HashMap;

/// Tokens starting with this prefix are flags, never positional arguments
pub const FLAG_PREFIX: &str = "--";

/// Trailing CLI tokens of a task invocation, split into positional arguments
/// and `--name[=value]` flags. Flag keys keep their `--` prefix.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArgumentSet {
    pub positional: Vec<String>,
    pub flags: HashMap<String, String>,
}

impl ArgumentSet {
    pub fn classify<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut args = ArgumentSet::default();
        for token in tokens {
            let token = token.as_ref();
            if !token.starts_with(FLAG_PREFIX) {
                args.positional.push(token.to_string());
                continue;
            }
            // first `=` only; anything after it belongs to the value
            let (key, value) = token.split_once('=').unwrap_or((token, ""));
            args.flags.insert(key.to_string(), value.to_string());
        }
        args
    }

    /// Positional argument by index
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.positional.get(index).map(String::as_str)
    }

    /// Flag value by name, with or without the `--` prefix
    pub fn flag(&self, name: &str) -> Option<&str> {
        let key = if name.starts_with(FLAG_PREFIX) {
            name.to_string()
        } else {
            format!("{FLAG_PREFIX}{name}")
        };
        self.flags.get(&key).map(String::as_str)
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.flag(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.flags.is_empty()
    }
}

/// Classify raw tokens in one left-to-right pass; no token is ever rejected
pub fn classify<S: AsRef<str>>(tokens: &[S]) -> ArgumentSet {
    ArgumentSet::classify(tokens)
}
