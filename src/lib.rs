//! Dynamic SQL from plain SQL templates.
//!
//! Directives live inside SQL comments, so a template is still runnable SQL:
//!
//! ```sql
//! SELECT * FROM employee
//! /*BEGIN*/WHERE
//!   /*IF name != null*/name = /*name*/'smith'/*END*/
//!   /*IF age != null*/AND age > /*age*/30/*END*/
//! /*END*/
//! ```
//!
//! A [`Template`] is parsed once into an immutable tree and transformed by a
//! [`SqlateEngine`] into statement text plus an ordered bind list.

mod ast;
mod builder;
mod cleanup;
mod config;
mod context;
mod coverage;
mod engine;
mod error;
mod expression;
mod interface;
mod mapper;
mod scanner;
mod template;
mod walker;

// Crate-level imports to make convienent imports for the rest of the library.
pub(crate) use error::SqlateResult;

// Public exports.
pub use ast::{Branch, Node, NodeId, NodeTree, Otherwise};
pub use builder::{MAX_NESTING_DEPTH, build};
pub use config::{EngineConfig, PlaceholderStyle};
pub use context::{BindParameter, TransformedSql};
pub use coverage::{
    BranchCoverage, BranchInfo, BranchKind, BranchState, Coverage, CoverageCollector,
    CoverageHandler, CoverageReport,
};
pub use engine::SqlateEngine;
pub use error::{
    ParseError, ParseErrorKind, SqlateError, Span, StructuralError, StructuralErrorKind,
};
pub use expression::{
    Condition, DefaultEvaluator, ExpressionEvaluator, Function, MAX_EXPRESSION_DEPTH,
};
pub use interface::{Context, Value, VariableLookup};
pub use mapper::{BooleanAsInteger, ValueMapper};
pub use scanner::{Scanner, Token, TokenKind, tokenize};
pub use template::Template;
