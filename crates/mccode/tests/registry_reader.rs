//! Registry collection, remote-tag fallback, and the two-level component
//! cache.

mod common;

use std::path::{Path, PathBuf};

use mccode::{
    Fetcher, Flavor, LocalRegistry, McResolver, Reader, Registry, collect_local_registries,
    resolve_version_tag,
};

struct StubFetcher {
    tags: Option<Vec<String>>,
}

impl Fetcher for StubFetcher {
    fn remote_tags(&self, _url: &str) -> Option<Vec<String>> {
        self.tags.clone()
    }

    fn fetch_text(&self, _url: &str) -> Option<String> {
        None
    }

    fn fetch_archive(&self, _url: &str, _tag: &str, _destination: &Path) -> bool {
        false
    }
}

#[test]
fn local_registry_collection_appends_working_directory() {
    let registries = collect_local_registries(Flavor::McStas);
    let last = registries.last().expect("at least the working directory");
    match last {
        Registry::Local(local) => {
            assert_eq!(local.name, "working_directory");
            assert_eq!(local.root, std::env::current_dir().unwrap());
        }
        other => panic!("expected a local registry, got {other:?}"),
    }
}

#[test]
fn environment_paths_become_local_registries() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let joined = format!(
        "{} {}",
        first.path().to_string_lossy(),
        second.path().to_string_lossy()
    );
    // SAFETY: the McXtrace key is touched only by this test
    unsafe { std::env::set_var("MCCODEANTLR_MCXTRACE__PATHS", &joined) };
    let registries = collect_local_registries(Flavor::McXtrace);
    unsafe { std::env::remove_var("MCCODEANTLR_MCXTRACE__PATHS") };

    assert_eq!(registries.len(), 3);
    let roots: Vec<PathBuf> = registries
        .iter()
        .filter_map(|r| match r {
            Registry::Local(local) => Some(local.root.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(roots[0], first.path());
    assert_eq!(roots[1], second.path());
}

#[test]
fn version_tag_falls_back_to_cached_versions() {
    let cache = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(cache.path().join("fallback-reg/v3.4.0")).unwrap();
    std::fs::create_dir_all(cache.path().join("fallback-reg/v3.5.1")).unwrap();
    // SAFETY: the override only matters within this test
    unsafe { std::env::set_var("MCCODE_CACHE_DIR", cache.path()) };
    let offline = StubFetcher { tags: None };
    let tag = resolve_version_tag("fallback-reg", "https://example.invalid/repo", &offline);
    unsafe { std::env::remove_var("MCCODE_CACHE_DIR") };
    assert_eq!(tag.as_deref(), Some("v3.5.1"));
}

#[test]
fn version_tag_prefers_remote_tags() {
    let online = StubFetcher {
        tags: Some(vec!["v3.4.0".to_string(), "v3.5.2".to_string()]),
    };
    let tag = resolve_version_tag("never-cached", "https://example.invalid/repo", &online);
    assert_eq!(tag.as_deref(), Some("v3.5.2"));
}

fn write_component(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(format!("{name}.comp"));
    std::fs::write(&path, body).unwrap();
    path
}

fn reader_over(dir: &Path) -> Reader {
    Reader::new(
        vec![Registry::Local(LocalRegistry::new("scratch", dir))],
        Flavor::McStas,
    )
}

#[test]
fn component_parse_writes_a_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let comp_path = write_component(
        dir.path(),
        "CacheProbeA",
        "DEFINE COMPONENT CacheProbeA\nSETTING PARAMETERS (x=1)\nTRACE\n%{\n%}\nEND\n",
    );
    let mut reader = reader_over(dir.path());
    let comp = reader.get_component("CacheProbeA").unwrap();
    assert_eq!(comp.name, "CacheProbeA");
    let sidecar = comp_path.with_file_name("CacheProbeA.comp.json");
    assert!(sidecar.is_file(), "sidecar {} written", sidecar.display());
    // a fresh reader decodes the sidecar instead of reparsing
    let mut fresh = reader_over(dir.path());
    let again = fresh.get_component("CacheProbeA").unwrap();
    assert_eq!(*comp, *again);
}

#[test]
fn corrupt_sidecar_recovers_silently() {
    let dir = tempfile::tempdir().unwrap();
    let comp_path = write_component(
        dir.path(),
        "CacheProbeB",
        "DEFINE COMPONENT CacheProbeB\nSETTING PARAMETERS (x=2)\nTRACE\n%{\n%}\nEND\n",
    );
    let sidecar = comp_path.with_file_name("CacheProbeB.comp.json");
    std::fs::write(&sidecar, "{ not json").unwrap();
    let mut reader = reader_over(dir.path());
    let comp = reader.get_component("CacheProbeB").unwrap();
    assert_eq!(comp.name, "CacheProbeB");
}

#[test]
fn stale_memory_entries_are_evicted_on_mtime_change() {
    let dir = tempfile::tempdir().unwrap();
    let comp_path = write_component(
        dir.path(),
        "CacheProbeC",
        "DEFINE COMPONENT CacheProbeC\nSETTING PARAMETERS (x=1)\nTRACE\n%{\n%}\nEND\n",
    );
    let mut reader = reader_over(dir.path());
    let first = reader.get_component("CacheProbeC").unwrap();
    assert!(first.get_parameter("x").is_some());

    // rewrite with a different parameter set and a strictly newer mtime
    std::thread::sleep(std::time::Duration::from_millis(20));
    std::fs::write(
        &comp_path,
        "DEFINE COMPONENT CacheProbeC\nSETTING PARAMETERS (y=3)\nTRACE\n%{\n%}\nEND\n",
    )
    .unwrap();
    // the memory layer notices the changed mtime by itself
    let mut fresh = reader_over(dir.path());
    let second = fresh.get_component("CacheProbeC").unwrap();
    assert!(second.get_parameter("y").is_some());
    assert!(second.get_parameter("x").is_none());
}

#[test]
fn mcdoc_header_enriches_parameters() {
    let dir = tempfile::tempdir().unwrap();
    write_component(dir.path(), "DocProbe", common::SLIT.replace("Slit", "DocProbe").as_str());
    let mut reader = reader_over(dir.path());
    let comp = reader.get_component("DocProbe").unwrap();
    let xmin = comp.get_parameter("xmin").unwrap();
    assert_eq!(xmin.unit.as_deref(), Some("m"));
    assert_eq!(xmin.description.as_deref(), Some("Lower x bound"));
}

#[test]
fn category_guessed_from_registry_path() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("optics")).unwrap();
    write_component(
        &dir.path().join("optics"),
        "CatProbe",
        "DEFINE COMPONENT CatProbe\nTRACE\n%{\n%}\nEND\n",
    );
    let mut reader = reader_over(dir.path());
    let comp = reader.get_component("CatProbe").unwrap();
    assert_eq!(comp.category.as_deref(), Some("optics"));
}

#[test]
fn in_file_category_wins() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("optics")).unwrap();
    write_component(
        &dir.path().join("optics"),
        "CatProbe2",
        "DEFINE COMPONENT CatProbe2\nCATEGORY sources\nTRACE\n%{\n%}\nEND\n",
    );
    let mut reader = reader_over(dir.path());
    let comp = reader.get_component("CatProbe2").unwrap();
    assert_eq!(comp.category.as_deref(), Some("sources"));
}

#[test]
fn source_override_wins_over_disk() {
    let dir = tempfile::tempdir().unwrap();
    write_component(
        dir.path(),
        "OverrideProbe",
        "DEFINE COMPONENT OverrideProbe\nSETTING PARAMETERS (x=1)\nTRACE\n%{\n%}\nEND\n",
    );
    let mut reader = reader_over(dir.path());
    reader.inject_source(
        "OverrideProbe",
        "DEFINE COMPONENT OverrideProbe\nSETTING PARAMETERS (live=42)\nTRACE\n%{\n%}\nEND\n",
    );
    // contents() serves the unsaved buffer …
    let text = reader.contents("OverrideProbe", Some(".comp")).unwrap();
    assert!(text.contains("live=42"));
    // … and the parsed definition reflects it
    let comp = reader.get_component("OverrideProbe").unwrap();
    assert!(comp.get_parameter("live").is_some());
    // eviction restores the on-disk definition
    reader.evict("OverrideProbe");
    let comp = reader.get_component("OverrideProbe").unwrap();
    assert!(comp.get_parameter("x").is_some());
}

#[test]
fn broken_injected_source_keeps_previous_definition() {
    let dir = tempfile::tempdir().unwrap();
    write_component(
        dir.path(),
        "BrokenProbe",
        "DEFINE COMPONENT BrokenProbe\nSETTING PARAMETERS (x=1)\nTRACE\n%{\n%}\nEND\n",
    );
    let mut reader = reader_over(dir.path());
    let before = reader.get_component("BrokenProbe").unwrap();
    reader.inject_source("BrokenProbe", "DEFINE COMPONENT oops (((");
    let after = reader.get_component("BrokenProbe").unwrap();
    assert_eq!(*before, *after);
}

#[test]
fn missing_component_reports_searched_registries() {
    let dir = tempfile::tempdir().unwrap();
    let mut reader = reader_over(dir.path());
    let error = reader.get_component("DoesNotExist").unwrap_err();
    let message = error.to_string();
    assert!(message.contains("DoesNotExist"));
    assert!(message.contains("scratch"));
}
