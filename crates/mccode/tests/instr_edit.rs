//! Instrument assembly and editing: COPY instances, PREVIOUS references,
//! %include merging, splitting, and parameter-usage analysis.

mod common;

use common::{parse_full, parse_trace, test_reader};
use mccode::{
    Comp, ComponentParameter, Expr, McResolver, Mode, SemanticError, parse_instr_parameters,
    parse_instr_source,
};

#[test]
fn previous_reference_resolves_to_last_component() {
    let instr = parse_trace(
        "COMPONENT origin = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT next = Arm() AT (0,0,1) RELATIVE PREVIOUS",
    );
    assert_eq!(
        instr.components[1].at_relative.1.as_deref(),
        Some("origin")
    );
}

#[test]
fn previous_count_beyond_components_is_rejected() {
    let source = "DEFINE INSTRUMENT t()\nTRACE\nCOMPONENT a = Arm() AT (0,0,0) ABSOLUTE\nCOMPONENT b = Arm() AT (0,0,1) RELATIVE PREVIOUS_4\nEND\n";
    let mut reader = test_reader();
    let result = parse_instr_source(source, "<test>", &mut reader, None, Mode::Normal);
    assert!(result.is_err());
}

#[test]
fn copy_instance_inherits_parameters_and_extras() {
    let instr = parse_trace(
        "COMPONENT s1 = Slit(xmin=-0.02, xmax=0.02) AT (0,0,0) ABSOLUTE GROUP G
         COMPONENT g2 = Arm() AT (0,0,0.5) RELATIVE s1 GROUP G
         COMPONENT s2 = COPY(s1) AT (0,0,1) RELATIVE s1",
    );
    let s2 = instr.get_component("s2").unwrap();
    assert_eq!(s2.type_.name, "Slit");
    assert_eq!(s2.group.as_deref(), Some("G"));
    let xmin = s2.get_parameter("xmin").unwrap();
    assert!(xmin.value.is_value(-0.02));
}

#[test]
fn copy_instance_overrides_parameters() {
    let instr = parse_trace(
        "COMPONENT s1 = Slit(xmin=-0.02) AT (0,0,0) ABSOLUTE
         COMPONENT s2 = COPY(s1)(xmin=-0.05) AT (0,0,1) RELATIVE s1",
    );
    let s2 = instr.get_component("s2").unwrap();
    assert!(s2.get_parameter("xmin").unwrap().value.is_value(-0.05));
}

#[test]
fn duplicate_instance_name_rejected() {
    let source = "DEFINE INSTRUMENT t()\nTRACE\nCOMPONENT a = Arm() AT (0,0,0) ABSOLUTE\nCOMPONENT a = Arm() AT (0,0,1) RELATIVE PREVIOUS\nEND\n";
    let mut reader = test_reader();
    let result = parse_instr_source(source, "<test>", &mut reader, None, Mode::Normal);
    assert!(result.is_err());
}

#[test]
fn constant_when_rejected() {
    // a folded-constant WHEN can never change at runtime
    let source = "DEFINE INSTRUMENT t()\nTRACE\nCOMPONENT a = Arm() WHEN 1 AT (0,0,0) ABSOLUTE\nEND\n";
    let mut reader = test_reader();
    let result = parse_instr_source(source, "<test>", &mut reader, None, Mode::Normal);
    assert!(result.is_err());
}

#[test]
fn unknown_instance_parameter_rejected() {
    let source = "DEFINE INSTRUMENT t()\nTRACE\nCOMPONENT s = Slit(bogus=1) AT (0,0,0) ABSOLUTE\nEND\n";
    let mut reader = test_reader();
    let result = parse_instr_source(source, "<test>", &mut reader, None, Mode::Normal);
    assert!(result.is_err());
}

#[test]
fn instrument_parameters_promote_identifiers() {
    let instr = parse_full(
        "DEFINE INSTRUMENT t(double width=0.1)\nTRACE\nCOMPONENT s = Slit(xmin=width) AT (0,0,0) ABSOLUTE\nEND\n",
    );
    let value = &instr.get_component("s").unwrap().parameters[0].value;
    assert!(value.is_parameter());
}

#[test]
fn split_defaults_to_ten() {
    let instr = parse_trace("SPLIT COMPONENT a = Arm() AT (0,0,0) ABSOLUTE");
    let split = instr.components[0].split.as_ref().unwrap();
    assert!(split.is_value(10.0));
}

#[test]
fn include_merges_parameters_and_components() {
    let mut reader = test_reader();
    let included = "\
DEFINE INSTRUMENT inner(double shared=1)
DECLARE
%{
  int inner_flag;
%}
TRACE
REMOVABLE COMPONENT gone = Arm() AT (0,0,0) ABSOLUTE
COMPONENT kept = Arm() AT (0,0,1) ABSOLUTE
END
";
    match &mut reader.registries[0] {
        mccode::Registry::InMemory(files) => files.insert("inner.instr", included),
        _ => unreachable!(),
    }
    let source = "\
DEFINE INSTRUMENT outer(double shared=2)
TRACE
COMPONENT first = Arm() AT (0,0,0) ABSOLUTE
%include \"inner\"
COMPONENT last = Arm() AT (0,0,2) RELATIVE kept
END
";
    let instr = parse_instr_source(source, "<test>", &mut reader, None, Mode::Normal).unwrap();
    assert_eq!(instr.included, vec!["inner"]);
    // repeated parameter names are ignored, the outer default wins
    assert_eq!(instr.parameters.len(), 1);
    assert!(instr.get_parameter("shared").unwrap().value.is_value(2.0));
    // removable components of the included instrument are dropped
    let names: Vec<&str> = instr.components.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["first", "kept", "last"]);
    assert_eq!(instr.declare.len(), 1);
    assert!(instr.declare[0].text.contains("inner_flag"));
}

#[test]
fn split_produces_two_overlapping_instruments() {
    let instr = parse_trace(
        "COMPONENT a = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT mid = Arm() AT (0,0,1) RELATIVE a
         COMPONENT b = Arm() AT (0,0,1) RELATIVE mid",
    );
    let (first, second) = instr.split("mid", false).unwrap();
    assert_eq!(first.name, "test_first");
    assert_eq!(second.name, "test_second");
    let first_names: Vec<&str> = first.components.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(first_names, ["a", "mid"]);
    let second_names: Vec<&str> = second.components.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(second_names, ["mid", "b"]);
    // the shared component is re-expressed absolutely in the second half
    assert!(second.components[0].at_relative.1.is_none());
    assert!(second.components[0].at_relative.0.z.is_value(1.0));
}

#[test]
fn split_at_unknown_component_is_rejected() {
    let instr = parse_trace("COMPONENT a = Arm() AT (0,0,0) ABSOLUTE");
    assert!(matches!(
        instr.split("nope", false),
        Err(SemanticError::UnknownReference(_))
    ));
}

fn stub_comp(name: &str) -> std::sync::Arc<Comp> {
    let mut comp = Comp::new(name);
    comp.add_setting(ComponentParameter::new("filename", Expr::empty(mccode::DataType::Str)))
        .unwrap();
    comp.add_setting(ComponentParameter::new("verbose", Expr::float(0.0)))
        .unwrap();
    std::sync::Arc::new(comp)
}

#[test]
fn mcpl_split_bridges_with_file_io() {
    let instr = parse_trace(
        "COMPONENT a = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT cut = Arm() AT (0,0,1) RELATIVE a
         COMPONENT b = Arm() AT (0,0,1) RELATIVE cut",
    );
    let (first, second) = instr
        .mcpl_split(
            "cut",
            None,
            stub_comp("MCPL_output"),
            Vec::new(),
            stub_comp("MCPL_input"),
            Vec::new(),
            false,
        )
        .unwrap();
    // both halves gained the filename parameter
    assert!(first.get_parameter("mcpl_filename").is_some());
    assert!(second.get_parameter("mcpl_filename").is_some());
    assert_eq!(
        first.get_parameter("mcpl_filename").unwrap().value.to_string(),
        "\"test.mcpl\""
    );
    // the split component became the MCPL bridge on both sides
    let out = first.components.last().unwrap();
    assert_eq!(out.name, "cut");
    assert_eq!(out.type_.name, "MCPL_output");
    assert!(out.parameters.iter().any(|p| p.name == "filename"));
    let input = &second.components[0];
    assert_eq!(input.name, "cut");
    assert_eq!(input.type_.name, "MCPL_input");
    assert!(input.parameters.iter().any(|p| p.name == "verbose"));
}

#[test]
fn parameter_usage_analysis() {
    let mut instr = parse_full(
        "DEFINE INSTRUMENT t(double used=1, double unused=2)\nDECLARE\n%{\n  double local;\n%}\nTRACE\nCOMPONENT s = Slit(xmin=used) AT (0,0,0) ABSOLUTE\nEND\n",
    );
    assert!(instr.parameter_used("used"));
    assert!(!instr.parameter_used("unused"));
    assert_eq!(instr.check_instrument_parameters(true), 1);
    assert_eq!(instr.parameters.len(), 1);
    assert_eq!(instr.parameters[0].name, "used");
}

#[test]
fn parameter_used_in_c_block_counts() {
    let instr = parse_full(
        "DEFINE INSTRUMENT t(double tuned=1)\nINITIALIZE\n%{\n  setup(tuned);\n%}\nTRACE\nCOMPONENT a = Arm() AT (0,0,0) ABSOLUTE\nEND\n",
    );
    assert!(instr.parameter_used("tuned"));
}

#[test]
fn component_types_deduplicate_in_order() {
    let instr = parse_trace(
        "COMPONENT a = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT s = Slit() AT (0,0,1) RELATIVE a
         COMPONENT b = Arm() AT (0,0,2) RELATIVE s",
    );
    let types: Vec<String> = instr
        .component_types()
        .iter()
        .map(|c| c.name.clone())
        .collect();
    assert_eq!(types, ["Arm", "Slit"]);
}

#[test]
fn parameters_only_fast_path() {
    let parameters = parse_instr_parameters(
        "DEFINE INSTRUMENT big(double a=1, int n=5, string f=\"x.dat\")\nTRACE\nCOMPONENT whatever = NotAKnownType() AT (0,0,0) ABSOLUTE\nEND\n",
    )
    .unwrap();
    let names: Vec<&str> = parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["a", "n", "f"]);
    assert_eq!(parameters[1].value.data_type(), mccode::DataType::Int);
}

#[test]
fn reader_loads_instruments_from_registries() {
    let mut reader = test_reader();
    match &mut reader.registries[0] {
        mccode::Registry::InMemory(files) => files.insert(
            "stored.instr",
            "DEFINE INSTRUMENT stored()\nTRACE\nCOMPONENT a = Arm() AT (0,0,0) ABSOLUTE\nEND\n",
        ),
        _ => unreachable!(),
    }
    let instr = reader.get_instrument("stored", None, Mode::Normal).unwrap();
    assert_eq!(instr.name, "stored");
    assert_eq!(instr.components.len(), 1);
    assert!(!instr.registries.is_empty());
}

#[test]
fn myself_jump_resolves_to_owner() {
    let instr = parse_trace(
        "COMPONENT a = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT b = Arm() AT (0,0,1) RELATIVE a JUMP MYSELF ITERATE (3)",
    );
    let edge = instr
        .flow_edges
        .iter()
        .find(|r| matches!(r.edge, mccode::FlowEdge::Jump { .. }))
        .expect("a jump edge");
    assert_eq!((edge.src.as_str(), edge.dst.as_str()), ("b", "b"));
}
