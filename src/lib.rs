//! # pgport
//!
//! Rewrites T-SQL syntax trees into PL/pgSQL syntax trees.
//!
//! pgport never sees SQL text: a parser hands it a typed token tree, a
//! fixed sequence of rewrite passes reshapes that tree in place, and a
//! formatter turns the result back into text.
//!
//! ## Quick Example
//!
//! ```
//! use pgport::prelude::*;
//!
//! let mut tree = notation::parse(
//!     r#"(Root (Statement (Clause (OtherKeyword "select") (WhiteSpace " ")
//!         (FunctionKeyword "getdate") (FunctionParens))))"#,
//! )?;
//! let conversion = pgport::convert(&mut tree)?;
//!
//! assert_eq!(compact(&tree, tree.root()), "select now();");
//! assert_eq!(conversion.warnings, 0);
//! # Ok::<(), ConvertError>(())
//! ```
//!
//! ## Layout
//!
//! | Module       | Role                                          |
//! |--------------|-----------------------------------------------|
//! | [`tree`]     | Arena tree, navigation, notation, JSON, dumps |
//! | [`declare`]  | Variable declaration extraction               |
//! | [`passes`]   | The rewrite passes                            |
//! | [`pipeline`] | Pass ordering and execution                   |
//! | [`config`]   | `pgport.toml` for the command line front end  |

pub mod config;
pub mod declare;
pub mod error;
pub mod passes;
pub mod pipeline;
pub mod tree;

pub mod prelude {
    pub use crate::config::{Config, OutputFormat};
    pub use crate::error::*;
    pub use crate::pipeline::{Conversion, Pipeline};
    pub use crate::tree::render::compact;
    pub use crate::tree::{NodeId, SIMPLE_TEXT, Tag, Tree, notation, repr};
}

/// Run the standard pipeline over `tree`.
pub fn convert(tree: &mut tree::Tree) -> error::ConvertResult<pipeline::Conversion> {
    pipeline::Pipeline::standard().run(tree)
}
