//! Shared fixtures: an in-memory registry with stub components so parser
//! tests run hermetically.

use mccode::{Flavor, InMemoryRegistry, Instr, Mode, Reader, Registry, parse_instr_source};

pub const ARM: &str = "\
DEFINE COMPONENT Arm
TRACE
%{
%}
END
";

pub const SLIT: &str = r#"/*******************************************************************************
*
* Component: Slit
*
* %I
* Written by: Kim Lefmann
* Date: October 4, 1997
* Origin: Risoe
*
* Rectangular slit
*
* %D
* A simple rectangular slit.
*
* %P
* INPUT PARAMETERS:
*
* xmin: [m]  Lower x bound
* xmax: [m]  Upper x bound
*
* %E
*******************************************************************************/
DEFINE COMPONENT Slit
SETTING PARAMETERS (double xmin=-0.01, xmax=0.01, string profile=NULL)
TRACE
%{
  PROP_Z0;
%}
END
"#;

pub fn test_reader() -> Reader {
    let mut files = InMemoryRegistry::new("testpack");
    files.insert("Arm.comp", ARM);
    files.insert("Slit.comp", SLIT);
    Reader::new(vec![Registry::InMemory(files)], Flavor::McStas)
}

pub fn parse_trace(trace_body: &str) -> Instr {
    let source = format!("DEFINE INSTRUMENT test()\nTRACE\n{trace_body}\nEND\n");
    let mut reader = test_reader();
    parse_instr_source(&source, "<test>", &mut reader, None, Mode::Normal)
        .expect("test instrument parses")
}

pub fn parse_full(source: &str) -> Instr {
    let mut reader = test_reader();
    parse_instr_source(source, "<test>", &mut reader, None, Mode::Normal)
        .expect("test instrument parses")
}
