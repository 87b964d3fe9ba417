//! SEARCH directive handling and dependency-flag decoding.

mod common;

use common::test_reader;
use mccode::{Config, Mode, Registry, parse_instr_source};

fn parse_with_reader(source: &str) -> (mccode::Instr, mccode::Reader) {
    let mut reader = test_reader();
    let instr = parse_instr_source(source, "<test>", &mut reader, None, Mode::Normal)
        .expect("test instrument parses");
    (instr, reader)
}

fn local_roots(reader: &mccode::Reader) -> Vec<String> {
    reader
        .registries
        .iter()
        .filter_map(|r| match r {
            Registry::Local(local) => Some(local.root.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

#[test]
fn quoted_search_path_registers_directory() {
    let (_, reader) = parse_with_reader(
        "DEFINE INSTRUMENT t()\nSEARCH \"/tmp/x\"\nTRACE\nCOMPONENT a = Arm() AT (0,0,0) ABSOLUTE\nEND\n",
    );
    assert!(local_roots(&reader).contains(&"/tmp/x".to_string()));
    // the new registry lands at the front of the search list
    assert!(matches!(&reader.registries[0], Registry::Local(l) if l.root.ends_with("x")));
}

#[test]
fn search_shell_registers_each_output_line() {
    let (_, reader) = parse_with_reader(
        "DEFINE INSTRUMENT t()\nSEARCH SHELL \"echo /tmp/x\"\nTRACE\nCOMPONENT a = Arm() AT (0,0,0) ABSOLUTE\nEND\n",
    );
    // quotes stripped, command split without a shell, newline trimmed
    assert!(local_roots(&reader).contains(&"/tmp/x".to_string()));
}

#[test]
fn repeated_search_does_not_duplicate() {
    let (_, reader) = parse_with_reader(
        "DEFINE INSTRUMENT t()\nSEARCH \"/tmp/x\"\nSEARCH \"/tmp/x\"\nTRACE\nCOMPONENT a = Arm() AT (0,0,0) ABSOLUTE\nEND\n",
    );
    let matching = local_roots(&reader)
        .into_iter()
        .filter(|root| root == "/tmp/x")
        .count();
    assert_eq!(matching, 1);
}

#[test]
fn search_inside_trace_section() {
    let (_, reader) = parse_with_reader(
        "DEFINE INSTRUMENT t()\nTRACE\nCOMPONENT a = Arm() AT (0,0,0) ABSOLUTE\nSEARCH \"/tmp/y\"\nEND\n",
    );
    assert!(local_roots(&reader).contains(&"/tmp/y".to_string()));
}

#[test]
fn dependency_flags_collect_without_quotes() {
    let (instr, _) = parse_with_reader(
        "DEFINE INSTRUMENT t()\nDEPENDENCY \"-lm\"\nTRACE\nCOMPONENT a = Arm() AT (0,0,0) ABSOLUTE\nEND\n",
    );
    assert_eq!(instr.flags, vec!["-lm"]);
}

#[test]
fn decoded_flags_preserve_backslashes() {
    // windows-style library paths must survive @KEY@ replacement verbatim
    let (mut instr, _) = parse_with_reader(
        "DEFINE INSTRUMENT t()\nDEPENDENCY \"@NCRYSTALFLAGS@\"\nTRACE\nCOMPONENT a = Arm() AT (0,0,0) ABSOLUTE\nEND\n",
    );
    instr.registries.clear();
    let mut config = Config::new();
    config.set_flag("ncrystal", " /IC:\\hosted\\NCrystal.lib");
    let decoded = instr.decoded_flags(&mut config).unwrap();
    assert_eq!(decoded, vec![" /IC:\\hosted\\NCrystal.lib"]);
}

#[test]
fn cpu_instance_adds_funnel_flag() {
    let (instr, _) = parse_with_reader(
        "DEFINE INSTRUMENT t()\nTRACE\nCPU COMPONENT a = Arm() AT (0,0,0) ABSOLUTE\nEND\n",
    );
    assert!(instr.unique_flags().contains(&"-DFUNNEL".to_string()));
}

#[test]
fn env_macro_decodes() {
    // SAFETY: the variable name is unique to this test binary
    unsafe { std::env::set_var("MCCODE_FLAG_TEST_DIR", "/opt/testlib") };
    let (mut instr, _) = parse_with_reader(
        "DEFINE INSTRUMENT t()\nDEPENDENCY \"-I ENV(MCCODE_FLAG_TEST_DIR)\"\nTRACE\nCOMPONENT a = Arm() AT (0,0,0) ABSOLUTE\nEND\n",
    );
    instr.registries.clear();
    let mut config = Config::new();
    let decoded = instr.decoded_flags(&mut config).unwrap();
    assert_eq!(decoded, vec!["-I /opt/testlib"]);
}
