//! Assembler core for the G10 CPU.
//!
//! Two halves live here, mirroring the toolchain's pipeline:
//!
//! - the **preprocessor** ([`preprocess`]) consumes a token stream and
//!   re-emits expanded source text — macros substituted, conditionals
//!   resolved, loops unrolled, `{…}` expressions evaluated;
//! - the **code generator** ([`Codegen`]) consumes the parsed [`ast::Module`]
//!   and produces a relocatable [`g10_obj::Object`] in four ordered passes.
//!
//! The lexer and parser sit upstream; this crate defines the token and AST
//! contracts they fill in ([`token`], [`ast`]) and a scanner for the token
//! model, which the preprocessor itself needs to re-tokenize interpolated
//! expressions inside string literals.

#![warn(missing_docs)]

pub mod ast;
mod codegen;
pub mod diag;
mod env;
pub mod eval;
pub mod macros;
pub mod preproc;
pub mod token;

pub use codegen::{CgValue, Codegen};
pub use diag::{AsmError, AsmErrorKind, SourceLoc};
pub use preproc::preprocess;
pub use token::scan;

/// Scan and preprocess `source` in one step.
///
/// Equivalent to [`scan`] followed by [`preprocess`]; the file name feeds
/// the locations carried by every diagnostic.
pub fn preprocess_source(source: &str, file: &str) -> Result<String, AsmError> {
    let tokens = scan(source, file)?;
    preprocess(&tokens)
}
