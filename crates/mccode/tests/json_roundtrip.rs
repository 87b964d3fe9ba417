//! Structural serialization round-trips for the IR types.

mod common;

use common::{parse_full, parse_trace};
use mccode::{Comp, ComponentParameter, Expr, Instr, InstrumentParameter, Value};
use pretty_assertions::assert_eq;

fn round_trip<T>(value: &T) -> T
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let text = serde_json::to_string(value).expect("encodes");
    serde_json::from_str(&text).expect("decodes")
}

#[test]
fn scalar_expressions() {
    for expr in [
        Expr::str("\"some string\""),
        Expr::int(1),
        Expr::float(1.5),
        Expr::id("width"),
    ] {
        let back: Expr = round_trip(&expr);
        assert_eq!(expr, back);
        assert_eq!(expr.to_string(), back.to_string());
    }
}

#[test]
fn operator_expressions() {
    let expr = Expr::id("x")
        .add(Expr::int(2))
        .mul(Expr::unary_func("cos", Expr::id("t")).unwrap());
    let back: Expr = round_trip(&expr);
    assert_eq!(expr, back);
}

#[test]
fn expression_discriminator_present() {
    let text = serde_json::to_string(&Expr::id("x").add(Expr::int(1))).unwrap();
    assert!(text.contains("\"type\":\"binary\""), "tagged union: {text}");
    assert!(text.contains("\"type\":\"value\""));
}

#[test]
fn instrument_parameter() {
    let parameter = InstrumentParameter::new(
        "x",
        Some("\"m\"".to_string()),
        Expr::value(Value::int_text("1")),
    );
    let back: InstrumentParameter = round_trip(&parameter);
    assert_eq!(parameter, back);
    assert_eq!(parameter.to_string(), back.to_string());
}

#[test]
fn component_with_docs_and_dependency() {
    let mut comp = Comp::new("test");
    comp.category = Some("test_category".to_string());
    let mut parameter = ComponentParameter::new("a_parameter", Expr::float(1.0));
    parameter.unit = Some("m".to_string());
    parameter.description = Some("Some\nlong\ndescription".to_string());
    comp.add_setting(parameter).unwrap();
    comp.dependency = Some("mcpl-config --show compileflags".to_string());
    let back: Comp = round_trip(&comp);
    assert_eq!(comp, back);
}

#[test]
fn component_with_raw_flags_macro() {
    // a DEPENDENCY macro must survive without evaluation
    let mut comp = Comp::new("MCPL_input");
    comp.dependency = Some("@MCPLFLAGS@".to_string());
    let back: Comp = round_trip(&comp);
    assert_eq!(back.dependency.as_deref(), Some("@MCPLFLAGS@"));
}

#[test]
fn simple_instrument() {
    let instr = parse_full(
        "DEFINE INSTRUMENT check()\nTRACE\nCOMPONENT a = Arm() AT (0,0,0) ABSOLUTE\nEND\n",
    );
    let back: Instr = round_trip(&instr);
    assert_eq!(instr, back);
}

#[test]
fn component_order_is_preserved() {
    let instr = parse_trace(
        "COMPONENT first = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT second = Slit(xmin=-0.02) AT (0,0,1) RELATIVE first
         COMPONENT third = Arm() AT (0,0,2) RELATIVE second",
    );
    let back: Instr = round_trip(&instr);
    let names: Vec<&str> = back.components.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["first", "second", "third"]);
    assert_eq!(instr, back);
}

#[test]
fn instrument_with_groups_jumps_and_edges() {
    let instr = parse_trace(
        "COMPONENT before = Arm() AT (0,0,0) ABSOLUTE
         COMPONENT g1 = Arm() AT (0,0,1) RELATIVE before GROUP G
         COMPONENT g2 = Arm() AT (0,0,2) RELATIVE before GROUP G
         COMPONENT after = Arm() AT (0,0,3) RELATIVE before
           JUMP before WHEN (1)",
    );
    let back: Instr = round_trip(&instr);
    assert_eq!(instr, back);
    // the shared component definition graph is rebuilt, not duplicated
    let arm_of = |i: &Instr, name: &str| std::sync::Arc::clone(&i.get_component(name).unwrap().type_);
    assert!(std::sync::Arc::ptr_eq(&arm_of(&back, "g1"), &arm_of(&back, "g2")));
}

#[test]
fn instance_parameters_and_when_survive() {
    let instr = parse_full(
        "DEFINE INSTRUMENT check(double width=0.1)\nTRACE\nCOMPONENT s = Slit(xmin=-width, xmax=width) WHEN (width > 0) AT (0,0,0) ABSOLUTE\nEND\n",
    );
    let back: Instr = round_trip(&instr);
    assert_eq!(instr, back);
    let slit = back.get_component("s").unwrap();
    assert_eq!(slit.parameters.len(), 2);
    assert!(slit.when.is_some());
}
