//! Named, prioritized sources of instrument and component files.
//!
//! A reader searches an ordered registry list; the first registry that knows
//! a name wins. Local registries index a directory tree, remote registries
//! expose a version-pinned archive as a local cache, module registries serve
//! files installed alongside the package, and in-memory registries back
//! hermetic tests.
//!
//! All remote traffic goes through the [`Fetcher`] trait so tests can inject
//! a deterministic stub; when tag listing fails the resolution falls back to
//! whatever version folders already exist in the local cache. That fallback
//! is mandatory behavior, not an optimization.

use std::{
    fs,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{errors::ResolveError, params::Flavor};

/// Remote access seam. The default [`NoFetcher`] fails every call, which
/// exercises the local-cache fallback branch.
pub trait Fetcher {
    /// Version tags available at `url`, oldest first. `None` on any failure
    /// (missing client, network error, …).
    fn remote_tags(&self, url: &str) -> Option<Vec<String>>;
    /// The text of the file at `url`. `None` on failure.
    fn fetch_text(&self, url: &str) -> Option<String>;
    /// Download and unpack the archive for `tag` into `destination`.
    fn fetch_archive(&self, url: &str, tag: &str, destination: &Path) -> bool;
}

/// A fetcher with no network access.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFetcher;

impl Fetcher for NoFetcher {
    fn remote_tags(&self, _url: &str) -> Option<Vec<String>> {
        None
    }

    fn fetch_text(&self, _url: &str) -> Option<String> {
        None
    }

    fn fetch_archive(&self, _url: &str, _tag: &str, _destination: &Path) -> bool {
        false
    }
}

/// Root of the on-disk cache for remote registries and fetched config files.
/// `MCCODE_CACHE_DIR` overrides the platform cache directory (tests rely on
/// this).
pub fn cache_base() -> PathBuf {
    if let Ok(dir) = std::env::var("MCCODE_CACHE_DIR") {
        return PathBuf::from(dir);
    }
    let base = std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))
        .unwrap_or_else(std::env::temp_dir);
    base.join("mccode")
}

fn find_in_tree(root: &Path, target: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        let mut children: Vec<_> = entries.filter_map(Result::ok).collect();
        children.sort_by_key(std::fs::DirEntry::file_name);
        for entry in children {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.file_name().and_then(|f| f.to_str()) == Some(target) {
                found.push(path);
            }
        }
    }
    found.sort();
    found
}

fn with_ext(name: &str, ext: Option<&str>) -> String {
    match ext {
        Some(ext) if !name.ends_with(ext) => format!("{name}{ext}"),
        _ => name.to_string(),
    }
}

/// A directory tree of source files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRegistry {
    pub name: String,
    pub root: PathBuf,
    #[serde(default)]
    pub priority: u8,
}

impl LocalRegistry {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    fn matches(&self, name: &str, ext: Option<&str>) -> Vec<PathBuf> {
        find_in_tree(&self.root, &with_ext(name, ext))
    }
}

/// A version-pinned upstream archive exposed through its local cache.
///
/// Library files live at `/{tag}/…` in the upstream repository; the first
/// use unpacks the archive under [`cache_base`]`/{name}/{tag}/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRegistry {
    pub name: String,
    pub url: String,
    pub version: String,
    #[serde(default)]
    pub priority: u8,
}

impl RemoteRegistry {
    pub fn new(name: impl Into<String>, url: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            version: version.into(),
            priority: 10,
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        cache_base().join(&self.name).join(&self.version)
    }

    /// Make sure the cache holds the pinned version, fetching it when a
    /// fetcher can. Returns whether the cache directory exists afterwards.
    pub fn ensure(&self, fetcher: &dyn Fetcher) -> bool {
        let dir = self.cache_dir();
        if dir.is_dir() {
            return true;
        }
        if fetcher.fetch_archive(&self.url, &self.version, &dir) {
            return true;
        }
        tracing::warn!(registry = %self.name, version = %self.version, "remote archive unavailable and not cached");
        false
    }
}

/// Files installed alongside the package (the "module resources" source).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRegistry {
    pub name: String,
    pub package: String,
    pub root: PathBuf,
    #[serde(default)]
    pub priority: u8,
}

/// A name → contents map, used by tests and injected sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryRegistry {
    pub name: String,
    pub files: IndexMap<String, String>,
    #[serde(default)]
    pub priority: u8,
}

impl InMemoryRegistry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: IndexMap::new(),
            priority: 0,
        }
    }

    pub fn insert(&mut self, filename: impl Into<String>, contents: impl Into<String>) {
        self.files.insert(filename.into(), contents.into());
    }

    fn lookup(&self, name: &str, ext: Option<&str>) -> Option<&str> {
        let target = with_ext(name, ext);
        self.files
            .get(&target)
            .or_else(|| self.files.get(name))
            .map(String::as_str)
    }
}

/// One prioritized source of named files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Registry {
    Local(LocalRegistry),
    Remote(RemoteRegistry),
    Module(ModuleRegistry),
    InMemory(InMemoryRegistry),
}

impl Registry {
    pub fn name(&self) -> &str {
        match self {
            Self::Local(r) => &r.name,
            Self::Remote(r) => &r.name,
            Self::Module(r) => &r.name,
            Self::InMemory(r) => &r.name,
        }
    }

    pub fn priority(&self) -> u8 {
        match self {
            Self::Local(r) => r.priority,
            Self::Remote(r) => r.priority,
            Self::Module(r) => r.priority,
            Self::InMemory(r) => r.priority,
        }
    }

    /// Registries whose files never exist on disk bypass the mtime-keyed
    /// component cache.
    pub fn is_in_memory(&self) -> bool {
        matches!(self, Self::InMemory(_))
    }

    fn search_root(&self) -> Option<PathBuf> {
        match self {
            Self::Local(r) => Some(r.root.clone()),
            Self::Remote(r) => Some(r.cache_dir()),
            Self::Module(r) => Some(r.root.clone()),
            Self::InMemory(_) => None,
        }
    }

    pub fn known(&self, name: &str, ext: Option<&str>) -> bool {
        match self {
            Self::InMemory(r) => r.lookup(name, ext).is_some(),
            Self::Local(r) => !r.matches(name, ext).is_empty(),
            _ => self
                .search_root()
                .is_some_and(|root| !find_in_tree(&root, &with_ext(name, ext)).is_empty()),
        }
    }

    pub fn unique(&self, name: &str) -> bool {
        match self {
            Self::InMemory(r) => r.lookup(name, None).is_some(),
            _ => self
                .search_root()
                .map(|root| find_in_tree(&root, name).len() == 1)
                .unwrap_or(false),
        }
    }

    /// The full path of the first match.
    pub fn path(&self, name: &str, ext: Option<&str>) -> Result<PathBuf, ResolveError> {
        match self {
            Self::InMemory(r) => r
                .lookup(name, ext)
                .map(|_| PathBuf::from(format!("mem://{}/{}", r.name, with_ext(name, ext))))
                .ok_or_else(|| self.not_found(name)),
            _ => {
                let root = self.search_root().ok_or_else(|| self.not_found(name))?;
                find_in_tree(&root, &with_ext(name, ext))
                    .into_iter()
                    .next()
                    .ok_or_else(|| self.not_found(name))
            }
        }
    }

    pub fn contents(&self, name: &str, ext: Option<&str>) -> Result<String, ResolveError> {
        match self {
            Self::InMemory(r) => r
                .lookup(name, ext)
                .map(str::to_string)
                .ok_or_else(|| self.not_found(name)),
            _ => {
                let path = self.path(name, ext)?;
                fs::read_to_string(path).map_err(ResolveError::Io)
            }
        }
    }

    /// The registry-qualified name: the match's path relative to the
    /// registry root (used to guess component categories).
    pub fn fullname(&self, name: &str, ext: Option<&str>) -> Result<PathBuf, ResolveError> {
        match self {
            Self::InMemory(r) => r
                .lookup(name, ext)
                .map(|_| PathBuf::from(with_ext(name, ext)))
                .ok_or_else(|| self.not_found(name)),
            _ => {
                let root = self.search_root().ok_or_else(|| self.not_found(name))?;
                let path = self.path(name, ext)?;
                Ok(path.strip_prefix(&root).map_or(path.clone(), Path::to_path_buf))
            }
        }
    }

    fn not_found(&self, name: &str) -> ResolveError {
        ResolveError::NotFound {
            name: name.to_string(),
            registries: vec![self.name().to_string()],
        }
    }
}

/// Whether `spec` (a path specification from SEARCH) already names `reg`.
pub fn registries_match(reg: &Registry, spec: &str) -> bool {
    let spec_path = PathBuf::from(spec);
    match reg {
        Registry::Local(local) => local.root == spec_path || local.name == spec,
        other => other.name() == spec,
    }
}

/// Build a registry from a SEARCH path specification, when it names an
/// existing directory.
pub fn registry_from_specification(spec: &str) -> Option<Registry> {
    let path = PathBuf::from(spec);
    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(spec)
        .to_string();
    Some(Registry::Local(LocalRegistry::new(name, path)))
}

/// Local registries from the flavor's environment variable (space-separated
/// directories, priority 5) followed by a `working_directory` registry.
pub fn collect_local_registries(flavor: Flavor) -> Vec<Registry> {
    let mut registries = Vec::new();
    if let Ok(paths) = std::env::var(flavor.paths_env_key()) {
        for dir in paths.split_whitespace() {
            let path = PathBuf::from(dir);
            let name = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or(dir)
                .to_string();
            registries.push(Registry::Local(
                LocalRegistry::new(name, path).with_priority(5),
            ));
        }
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    registries.push(Registry::Local(
        LocalRegistry::new("working_directory", cwd).with_priority(20),
    ));
    registries
}

/// Resolve the upstream version tag for a remote registry: remote tags
/// first, then the version folders already present in the local cache.
pub fn resolve_version_tag(name: &str, url: &str, fetcher: &dyn Fetcher) -> Option<String> {
    if let Some(tags) = fetcher.remote_tags(url)
        && let Some(tag) = tags.into_iter().next_back()
    {
        return Some(tag);
    }
    // fallback: whatever versions a previous run cached
    let cached = cache_base().join(name);
    let mut versions: Vec<String> = fs::read_dir(&cached)
        .ok()?
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|tag| tag.starts_with('v'))
        .collect();
    versions.sort();
    let tag = versions.pop();
    if tag.is_some() {
        tracing::info!(registry = name, "using cached registry version (remote tags unavailable)");
    }
    tag
}

/// Upstream repository for a flavor's component library.
pub fn registry_url(flavor: Flavor) -> (&'static str, &'static str) {
    match flavor {
        Flavor::McStas => ("mcstas", "https://github.com/mccode-dev/McCode"),
        Flavor::McXtrace => ("mcxtrace", "https://github.com/mccode-dev/McCode"),
    }
}

/// The default search path: environment-variable locals, then the remote
/// library registry (when a version resolves), then the working directory.
pub fn default_registries(flavor: Flavor, fetcher: &dyn Fetcher) -> Vec<Registry> {
    let mut registries = collect_local_registries(flavor);
    let (name, url) = registry_url(flavor);
    if let Some(version) = resolve_version_tag(name, url, fetcher) {
        let remote = RemoteRegistry::new(name, url, version);
        remote.ensure(fetcher);
        // remote sits before the trailing working_directory registry
        let wd = registries.pop();
        registries.push(Registry::Remote(remote));
        registries.extend(wd);
    }
    ordered_registries(registries)
}

/// Stable-sort by priority (lower first).
pub fn ordered_registries(mut registries: Vec<Registry>) -> Vec<Registry> {
    registries.sort_by_key(Registry::priority);
    registries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_joining() {
        assert_eq!(with_ext("Arm", Some(".comp")), "Arm.comp");
        assert_eq!(with_ext("Arm.comp", Some(".comp")), "Arm.comp");
        assert_eq!(with_ext("Arm", None), "Arm");
    }

    #[test]
    fn in_memory_round_trip() {
        let mut reg = InMemoryRegistry::new("test");
        reg.insert("Arm.comp", "DEFINE COMPONENT Arm\nTRACE %{ %}\nEND\n");
        let reg = Registry::InMemory(reg);
        assert!(reg.known("Arm", Some(".comp")));
        assert!(!reg.known("Slit", Some(".comp")));
        assert!(reg.contents("Arm", Some(".comp")).unwrap().contains("DEFINE COMPONENT"));
    }

    #[test]
    fn specification_builds_local() {
        let reg = registry_from_specification("/tmp/x").unwrap();
        match reg {
            Registry::Local(local) => {
                assert_eq!(local.root, PathBuf::from("/tmp/x"));
                assert_eq!(local.name, "x");
            }
            other => panic!("expected a local registry, got {other:?}"),
        }
    }
}
