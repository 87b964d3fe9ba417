//! McCode instrument compiler front end.
//!
//! Parses the McCode domain-specific language — `.instr` instrument files
//! and `.comp` component files — into a typed intermediate representation
//! suitable for C code generation, editing, and analysis. The crate also
//! ships the registry/caching layer that locates component definitions, a
//! particle-flow graph over the component sequence, and a comment-preserving
//! canonical formatter.

mod comp;
mod config;
mod errors;
mod expr;
mod flow;
mod format;
mod instance;
mod instr;
mod lexer;
mod mcdoc;
mod orientation;
mod params;
mod parse;
mod parse_comp;
mod parse_expr;
mod parse_instr;
mod reader;
mod registry;
mod run;

pub use crate::{
    comp::Comp,
    config::{Config, config_fallback, replace_env_getpath_cmd, replace_keywords},
    errors::{McCodeError, ResolveError, SemanticError},
    expr::{
        DataType, Expr, ExprError, ExprNode, ObjectType, Payload, PrintStyle, ShapeType, Value,
    },
    flow::{
        FlowEdge, FlowEdgeRecord, FlowGraph, GroupEdgeKind, InstanceIO, build_flow_edge_records,
        build_instance_io, build_particle_flow_graph, flow_graph_from_records,
    },
    format::{
        build_canonical_mcdoc, check_mcdoc_params, fetch_clang_format_config, format_comp_source,
        format_file, format_instr_source, format_source, make_clang_formatter, CFormatter,
    },
    instance::{DepInstance, Instance, Jump},
    instr::{Anchor, Group, Instr},
    lexer::{Channel, Token, TokenKind, lex},
    mcdoc::{McDocData, ParameterDocs, parse_mcdoc, parse_mcdoc_full},
    orientation::{Angles, Orient, Vector},
    params::{
        ComponentParameter, Flavor, InstrumentParameter, MetaData, Mode, RawC,
        parameter_name_present,
    },
    parse::ParseError,
    parse_comp::{NoResolver, parse_comp_source, parse_comp_text},
    parse_expr::{EmptyContext, ExprContext, parse_expr_text},
    parse_instr::{
        McResolver, parse_expr, parse_instr_parameters, parse_instr_source,
        parse_instrument_parameter,
    },
    reader::{ComponentCache, Reader, component_cache},
    registry::{
        Fetcher, InMemoryRegistry, LocalRegistry, ModuleRegistry, NoFetcher, Registry,
        RemoteRegistry, cache_base, collect_local_registries, default_registries,
        ordered_registries, registries_match, registry_from_specification, resolve_version_tag,
    },
    run::{RuntimeArgs, SiIntError, si_int},
};
