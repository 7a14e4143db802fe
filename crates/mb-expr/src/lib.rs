//! # mb-expr
//!
//! Checks the string expressions that appear in TMVA training configs
//! (selection cuts, variable definitions, event-weight expressions) and
//! reports which tree branches they read.
//!
//! ```
//! use mb_expr::CompiledExpr;
//!
//! let cut = CompiledExpr::compile("l_pt1 > 30 && abs(l_eta1) < 2.5").unwrap();
//! assert_eq!(cut.branches(), vec!["l_pt1", "l_eta1"]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod definition;
pub mod expr;

pub use definition::Definition;
pub use expr::{CompiledExpr, LeafRef};
