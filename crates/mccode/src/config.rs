//! Process configuration for dependency-flag expansion.
//!
//! `DEPENDENCY "…"` strings may embed `@KEY@`, `CMD(prog args)`, `ENV(NAME)`
//! and `GETPATH(file)` substitutions. `@XXXFLAGS@` keys resolve through a
//! cached fallback chain: configured value → `xxx-config --show buildflags`
//! → `-lxxx`. The cache is an explicit struct threaded through
//! [`crate::instr::Instr::decoded_flags`] so hits and misses are observable
//! in tests.
//!
//! All replacements are plain string splices. Command output (which can hold
//! Windows paths) must survive verbatim, so no replacement ever passes
//! through a regex template.

use ahash::AHashMap;
use regex::Regex;

use crate::registry::Registry;

/// Cached configuration values for flag expansion.
#[derive(Debug, Default, Clone)]
pub struct Config {
    flags: AHashMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_flag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.flags.insert(key.into(), value.into());
    }

    pub fn get_flag(&self, key: &str) -> Option<&str> {
        self.flags.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.flags.contains_key(key)
    }
}

fn run_prog_output(program: &[&str]) -> Option<String> {
    let (head, rest) = program.split_first()?;
    let output = std::process::Command::new(head).args(rest).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok()
}

/// Resolve `key` against the cache, falling back to `{key}-config --show
/// buildflags`, then to `-l{key}`. The result is stored so possibly
/// expensive probing runs at most once per process.
pub fn config_fallback(config: &mut Config, key: &str) -> String {
    if let Some(value) = config.get_flag(key) {
        return value.to_string();
    }
    let prog = format!("{key}-config");
    let value = run_prog_output(&[prog.as_str(), "--show", "buildflags"]).unwrap_or_else(|| {
        let fallback = format!("-l{key}");
        tracing::warn!(key, fallback = %fallback, "unable to run {prog}, using failsafe flags");
        fallback
    });
    config.set_flag(key, value.clone());
    value
}

/// Replace every `start(…)` occurrence in `flags` using `replacer` on the
/// parenthesised text. Errors on missing or nested parentheses.
fn replace_macro(
    flags: &str,
    start: &str,
    replacer: &mut dyn FnMut(&str) -> Result<String, String>,
) -> Result<String, String> {
    let Some(found) = flags.find(start) else {
        return Ok(flags.to_string());
    };
    let (before, after) = flags.split_at(found);
    let after = &after[start.len()..];
    if !after.starts_with('(') {
        return Err(format!("missing opening parenthesis in dependency string after {start}"));
    }
    let Some(close) = after.find(')') else {
        return Err(format!("missing closing parenthesis in dependency string after {start}"));
    };
    let inner = &after[1..close];
    if inner.contains(start) {
        return Err(format!("nested {start} in dependency string"));
    }
    let replaced = replacer(inner)?;
    let rest = replace_macro(&after[close + 1..], start, replacer)?;
    Ok(format!("{before}{replaced}{rest}"))
}

fn env_value(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}

fn cmd_value(command: &str) -> Result<String, String> {
    let parts: Vec<&str> = command.split_whitespace().collect();
    let Some(output) = run_prog_output(&parts) else {
        return Err(format!("calling {command} failed"));
    };
    let lines: Vec<&str> = output.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.len() > 1 {
        return Err(format!("calling {command} produced more than one line of output"));
    }
    Ok(lines.first().copied().unwrap_or("").to_string())
}

fn getpath_value(filename: &str, registries: &[Registry]) -> String {
    for registry in registries {
        if registry.known(filename, None)
            && let Ok(path) = registry.path(filename, None)
        {
            return path.to_string_lossy().replace('\\', "/");
        }
    }
    String::new()
}

/// Replace `ENV(…)`, `GETPATH(…)` and `CMD(…)` directives in a flag string.
pub fn replace_env_getpath_cmd(
    flags: &str,
    registries: &[Registry],
) -> Result<String, String> {
    let flags = replace_macro(flags, "ENV", &mut |name| Ok(env_value(name)))?;
    let flags = replace_macro(&flags, "GETPATH", &mut |file| {
        Ok(getpath_value(file, registries))
    })?;
    replace_macro(&flags, "CMD", &mut |command| cmd_value(command))
}

/// Replace `@KEY@` keywords in a flag string. `@XXXFLAGS@` keys resolve via
/// [`config_fallback`]; `@MCCODE_LIB@` is obsolete and becomes `.`.
pub fn replace_keywords(flag: &str, instrument_name: &str, config: &mut Config) -> String {
    let mut flag = flag.to_string();
    if flag.contains("@NEXUSFLAGS@") {
        let value = config_fallback(config, "nexus");
        flag = flag.replace("@NEXUSFLAGS@", &value);
    }
    if flag.contains("@MCCODE_LIB@") {
        tracing::warn!(
            instrument = instrument_name,
            "@MCCODE_LIB@ dependencies no longer work; expect problems at compilation"
        );
        flag = flag.replace("@MCCODE_LIB@", ".");
    }
    let keyword = Regex::new(r"@(\w+)@").expect("keyword pattern is valid");
    // collect first: the replacements edit the string we scan
    let keys: Vec<String> = keyword
        .captures_iter(&flag)
        .map(|c| c[1].to_string())
        .collect();
    for key in keys {
        let lower = key.to_lowercase();
        if let Some(stripped) = lower.strip_suffix("flags") {
            let value = config_fallback(config, stripped);
            // plain splice: backslashes in the value must survive verbatim
            flag = flag.replace(&format!("@{key}@"), &value);
        } else {
            tracing::warn!(keyword = %key, "unknown keyword in dependency string");
        }
    }
    flag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_flag_short_circuits() {
        let mut config = Config::new();
        config.set_flag("ncrystal", "-lNCrystal");
        assert_eq!(config_fallback(&mut config, "ncrystal"), "-lNCrystal");
    }

    #[test]
    fn missing_program_falls_back_to_link_flag() {
        let mut config = Config::new();
        let flags = config_fallback(&mut config, "definitely_not_a_real_library");
        assert_eq!(flags, "-ldefinitely_not_a_real_library");
        // and the result is cached
        assert!(config.contains("definitely_not_a_real_library"));
    }

    #[test]
    fn backslashes_survive_keyword_replacement() {
        let mut config = Config::new();
        config.set_flag("ncrystal", " /IC:\\hosted\\NCrystal.lib");
        let flag = replace_keywords("@NCRYSTALFLAGS@", "test", &mut config);
        assert_eq!(flag, " /IC:\\hosted\\NCrystal.lib");
    }

    #[test]
    fn env_macro_replacement() {
        // SAFETY: tests in this module run in one process; the variable is
        // unique to this test.
        unsafe { std::env::set_var("MCCODE_TEST_ENV_MACRO", "/opt/lib") };
        let out = replace_env_getpath_cmd("-I ENV(MCCODE_TEST_ENV_MACRO)/include", &[]).unwrap();
        assert_eq!(out, "-I /opt/lib/include");
    }

    #[test]
    fn unbalanced_macro_errors() {
        assert!(replace_env_getpath_cmd("ENV(OOPS", &[]).is_err());
    }
}
