//! Component resolution: ordered registry search plus the process-level
//! two-level component cache.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, LazyLock, Mutex},
    time::UNIX_EPOCH,
};

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    comp::Comp,
    errors::{McCodeError, ResolveError},
    instr::Instr,
    mcdoc::parse_mcdoc,
    params::{Flavor, Mode},
    parse_comp::parse_comp_source,
    parse_instr::{McResolver, parse_instr_source},
    registry::{
        Fetcher, NoFetcher, Registry, default_registries, ordered_registries,
        registries_match, registry_from_specification,
    },
};

/// Process-wide two-level cache of parsed component definitions.
///
/// Level 1 is an in-memory map from absolute path to `(mtime_ns, Comp)`;
/// a hit requires the stored mtime to match the file's current one, and
/// stale entries are evicted. Level 2 is a `{name}.comp.json` sidecar next
/// to the source, decoded when its mtime is at least the source's —
/// roughly two orders of magnitude faster than re-parsing. Mutation is
/// serialized behind one lock covering lookup-then-store.
#[derive(Default)]
pub struct ComponentCache {
    store: Mutex<AHashMap<PathBuf, (u128, Arc<Comp>)>>,
    source_overrides: Mutex<AHashMap<String, String>>,
}

static COMPONENT_CACHE: LazyLock<ComponentCache> = LazyLock::new(ComponentCache::default);

/// The process singleton.
pub fn component_cache() -> &'static ComponentCache {
    &COMPONENT_CACHE
}

fn mtime_ns(path: &Path) -> Option<u128> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    modified.duration_since(UNIX_EPOCH).ok().map(|d| d.as_nanos())
}

fn sidecar_path(comp_path: &Path) -> PathBuf {
    let mut name = comp_path.file_name().map_or_else(String::new, |f| {
        f.to_string_lossy().into_owned()
    });
    name.push_str(".json");
    comp_path.with_file_name(name)
}

impl ComponentCache {
    pub fn get(&self, path: &Path) -> Option<Arc<Comp>> {
        let comp_mtime = mtime_ns(path)?;
        let mut store = self.store.lock().ok()?;
        if let Some((cached_mtime, comp)) = store.get(path) {
            if *cached_mtime == comp_mtime {
                return Some(Arc::clone(comp));
            }
            store.remove(path);
        }
        // level 2: JSON sidecar written by a previous run
        let sidecar = sidecar_path(path);
        let sidecar_mtime = mtime_ns(&sidecar)?;
        if sidecar_mtime >= comp_mtime {
            match fs::read_to_string(&sidecar)
                .ok()
                .and_then(|text| serde_json::from_str::<Comp>(&text).ok())
            {
                Some(comp) => {
                    let comp = Arc::new(comp);
                    store.insert(path.to_path_buf(), (comp_mtime, Arc::clone(&comp)));
                    return Some(comp);
                }
                None => {
                    // corrupt sidecar: discard and fall through to a reparse
                    let _ = fs::remove_file(&sidecar);
                }
            }
        }
        None
    }

    pub fn put(&self, path: &Path, comp: &Arc<Comp>) {
        let Some(mtime) = mtime_ns(path) else {
            return;
        };
        if let Ok(mut store) = self.store.lock() {
            store.insert(path.to_path_buf(), (mtime, Arc::clone(comp)));
        }
        // sidecar writes are best-effort; an unwritable directory is fine
        if let Ok(text) = serde_json::to_string(comp.as_ref()) {
            let _ = fs::write(sidecar_path(path), text);
        }
    }

    /// Drop one in-memory entry (the disk sidecar is preserved).
    pub fn evict(&self, path: &Path) {
        if let Ok(mut store) = self.store.lock() {
            store.remove(path);
        }
    }

    /// Flush all in-memory entries (disk sidecars are preserved).
    pub fn clear(&self) {
        if let Ok(mut store) = self.store.lock() {
            store.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.store.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store live (unsaved) source text for `name`; `Reader::contents`
    /// prefers it over any on-disk file.
    pub fn override_source(&self, name: &str, source: &str) {
        if let Ok(mut overrides) = self.source_overrides.lock() {
            overrides.insert(name.to_string(), source.to_string());
        }
    }

    pub fn clear_override(&self, name: &str) {
        if let Ok(mut overrides) = self.source_overrides.lock() {
            overrides.remove(name);
        }
    }

    pub fn get_override(&self, name: &str) -> Option<String> {
        self.source_overrides.lock().ok()?.get(name).cloned()
    }
}

/// Loads instruments and components through an ordered registry list,
/// memoizing parsed component definitions.
pub struct Reader {
    pub registries: Vec<Registry>,
    pub components: IndexMap<String, Arc<Comp>>,
    pub flavor: Flavor,
}

impl Reader {
    pub fn new(registries: Vec<Registry>, flavor: Flavor) -> Self {
        let registries = if registries.is_empty() {
            default_registries(flavor, &NoFetcher)
        } else {
            ordered_registries(registries)
        };
        Self {
            registries,
            components: IndexMap::new(),
            flavor,
        }
    }

    /// A reader over the default search path, resolving the remote registry
    /// tag through `fetcher`.
    pub fn with_defaults(flavor: Flavor, fetcher: &dyn Fetcher) -> Self {
        Self {
            registries: default_registries(flavor, fetcher),
            components: IndexMap::new(),
            flavor,
        }
    }

    pub fn prepend_registry(&mut self, registry: Registry) {
        self.registries.insert(0, registry);
    }

    pub fn append_registry(&mut self, registry: Registry) {
        self.registries.push(registry);
    }

    /// Insert a new registry at the front of the list when no existing
    /// registry already matches the SEARCH specification.
    pub fn search_keyword(&mut self, spec: &str) -> Result<(), ResolveError> {
        if self.registries.iter().any(|r| registries_match(r, spec)) {
            return Ok(());
        }
        match registry_from_specification(spec) {
            Some(registry) => {
                self.prepend_registry(registry);
                Ok(())
            }
            None => Err(ResolveError::NotFound {
                name: spec.to_string(),
                registries: self.registry_names(),
            }),
        }
    }

    fn registry_names(&self) -> Vec<String> {
        self.registries.iter().map(|r| r.name().to_string()).collect()
    }

    fn first_known(&self, name: &str, ext: Option<&str>) -> Option<&Registry> {
        self.registries.iter().find(|r| r.known(name, ext))
    }

    pub fn known(&self, name: &str, ext: Option<&str>) -> bool {
        self.first_known(name, ext).is_some()
    }

    /// Whether exactly one registry knows `name`.
    pub fn unique(&self, name: &str) -> bool {
        self.registries.iter().filter(|r| r.known(name, None)).count() == 1
    }

    /// The registries that know `name`.
    pub fn contain(&self, name: &str) -> Vec<&str> {
        self.registries
            .iter()
            .filter(|r| r.known(name, None))
            .map(Registry::name)
            .collect()
    }

    pub fn locate(&self, name: &str, ext: Option<&str>) -> Result<PathBuf, ResolveError> {
        self.first_known(name, ext)
            .ok_or_else(|| ResolveError::NotFound {
                name: name.to_string(),
                registries: self.registry_names(),
            })?
            .path(name, ext)
    }

    pub fn fullname(&self, name: &str, ext: Option<&str>) -> Result<PathBuf, ResolveError> {
        self.first_known(name, ext)
            .ok_or_else(|| ResolveError::NotFound {
                name: name.to_string(),
                registries: self.registry_names(),
            })?
            .fullname(name, ext)
    }

    /// The text of a named file; in-memory source overrides (unsaved editor
    /// buffers) win over anything on disk.
    pub fn contents(&self, name: &str, ext: Option<&str>) -> Result<String, ResolveError> {
        if matches!(ext, None | Some(".comp"))
            && let Some(text) = component_cache().get_override(name)
        {
            return Ok(text);
        }
        self.first_known(name, ext)
            .ok_or_else(|| ResolveError::NotFound {
                name: name.to_string(),
                registries: self.registry_names(),
            })?
            .contents(name, ext)
    }

    /// Locate, cache-check, and (on miss) parse the named component,
    /// enriching parameters from the McDoc header and assigning a category.
    pub fn add_component(&mut self, name: &str) -> Result<(), McCodeError> {
        if self.components.contains_key(name) {
            return Err(McCodeError::Semantic(
                crate::errors::SemanticError::DuplicateName(format!(
                    "the component {name} is already known"
                )),
            ));
        }
        let registry = self
            .first_known(name, Some(".comp"))
            .ok_or_else(|| ResolveError::NotFound {
                name: name.to_string(),
                registries: self.registry_names(),
            })?;
        let cacheable = !registry.is_in_memory() && component_cache().get_override(name).is_none();
        let located = registry.path(name, Some(".comp"))?;
        let abs_path = located.canonicalize().unwrap_or(located);

        if cacheable && let Some(comp) = component_cache().get(&abs_path) {
            tracing::debug!(path = %abs_path.display(), "component cache hit");
            self.components.insert(name.to_string(), comp);
            return Ok(());
        }

        let source = self.contents(name, Some(".comp"))?;
        let fullname = self.fullname(name, Some(".comp"))?;
        let filename = abs_path.to_string_lossy().into_owned();
        let mut comp = parse_comp_source(&source, &filename, self)?;

        // the McDoc header is the source of parameter units and descriptions
        let docs = parse_mcdoc(&source);
        for parameter in comp
            .define
            .iter_mut()
            .chain(comp.setting.iter_mut())
            .chain(comp.output.iter_mut())
        {
            if let Some((unit, description)) = docs.get(&parameter.name) {
                parameter.unit = unit.clone();
                parameter.description = description.clone();
            }
        }
        if comp.category.is_none() {
            // guess from the registry-qualified name, e.g. optics/Slit.comp
            comp.category = Some(
                fullname
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .and_then(|p| p.iter().next())
                    .map_or_else(|| "UNKNOWN".to_string(), |c| c.to_string_lossy().into_owned()),
            );
        }

        let comp = Arc::new(comp);
        if cacheable {
            component_cache().put(&abs_path, &comp);
        }
        self.components.insert(name.to_string(), comp);
        Ok(())
    }

    /// Parse `source` as a component definition and publish it, bypassing
    /// both cache layers. A parse failure keeps any existing component.
    pub fn inject_source(&mut self, name: &str, source: &str) {
        match parse_comp_source(source, name, self) {
            Ok(comp) => {
                component_cache().override_source(name, source);
                self.components.insert(name.to_string(), Arc::new(comp));
            }
            Err(error) => {
                tracing::debug!(component = name, %error, "injected source failed to parse; keeping previous definition");
            }
        }
    }

    /// Forget `name` (and its source override); the next lookup re-reads
    /// through the cache or reparses from disk.
    pub fn evict(&mut self, name: &str) {
        self.components.shift_remove(name);
        component_cache().clear_override(name);
    }

    /// Load and parse an instrument definition file, searching the
    /// registries when `name` is not directly a readable path.
    pub fn get_instrument(
        &mut self,
        name: &str,
        destination: Option<&Instr>,
        mode: Mode,
    ) -> Result<Instr, McCodeError> {
        let mut path = PathBuf::from(name);
        if path.extension().is_none_or(|e| e != "instr") {
            let mut with_suffix = path.as_os_str().to_owned();
            with_suffix.push(".instr");
            path = PathBuf::from(with_suffix);
        }
        let (source, filename) = if path.is_file() {
            (
                fs::read_to_string(&path).map_err(ResolveError::Io)?,
                path.to_string_lossy().into_owned(),
            )
        } else {
            let basename = path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.to_string());
            let located = self.locate(&basename, None)?;
            (
                self.contents(&basename, None)?,
                located.to_string_lossy().into_owned(),
            )
        };
        let mut instr = parse_instr_source(&source, &filename, self, destination, mode)?;
        instr.source = filename;
        instr.registries = self.registries.clone();
        Ok(instr)
    }
}

impl McResolver for Reader {
    fn get_component(&mut self, name: &str) -> Result<Arc<Comp>, McCodeError> {
        if !self.components.contains_key(name) {
            self.add_component(name)?;
        }
        Ok(Arc::clone(&self.components[name]))
    }

    fn get_instrument_included(
        &mut self,
        name: &str,
        destination: &Instr,
        mode: Mode,
    ) -> Result<Instr, McCodeError> {
        self.get_instrument(name, Some(destination), mode)
    }

    fn handle_search_keyword(&mut self, spec: &str) -> Result<(), McCodeError> {
        self.search_keyword(spec).map_err(McCodeError::from)
    }
}
