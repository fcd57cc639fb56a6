mod ast;
mod normalize;
mod parser;
mod resolve;
mod reasoner;
mod store;

pub mod batch;
pub mod config;
pub mod report;

pub use ast::*;
pub use normalize::normalize_facts;
pub use parser::{parse_document, parse_file, LoadError, ParseError, FACTS_MARKER, RULES_MARKER, TARGET_MARKER};
pub use resolve::{KnowledgeBase, PropId, Rule, RuleDisplay, RuleId, SymbolTable};
pub use reasoner::{
    backward_chain,
    forward_chain,
    replay,
    solve,
    BackwardEvent,
    ForwardEvent,
    ForwardState,
    Log,
    Outcome,
    ReplayError,
};
pub use store::{FactSet, RuleStore, SkipReason};
pub use config::{BatchConfig, EngineConfig, Strategy};
