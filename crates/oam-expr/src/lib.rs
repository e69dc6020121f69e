//! A small, hand-rolled constraint/unification expression language used to
//! evaluate Definition templates: typed records with
//! unification, optional/default/required fields, string interpolation,
//! conditionals, comprehensions, selectors, and a package-import surface
//! covering `strings`, `encoding/json`, `encoding/base64`, and `strconv`.
//!
//! The evaluator is deliberately I/O-free: callers (`oam-render`,
//! `oam-status`) bind a [`eval::Scope`] from already-known values and get a
//! [`value::Value`] back. Anything that needs network or cluster access
//! (the `processing` block's HTTP call, workflow primitives) is performed by
//! the caller, not by this crate.

pub mod ast;
pub mod eval;
pub mod parser;
pub mod stdlib;
pub mod template;
pub mod value;

pub use eval::{EvalError, Scope, eval_expr, eval_record};
pub use parser::{ParseError, parse_template};
pub use template::TemplateBlocks;
pub use value::{UnifyError, Value, unify};
