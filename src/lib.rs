//! fmconv: a format-preserving converter from FreeMarker 2 templates to
//! FreeMarker 3 syntax.
//!
//! ```rust
//! use fmconv::convert::convert_source;
//! use fmconv::syntax::TagSyntaxMode;
//!
//! let fm3 = convert_source("t.ftl", "<#if x = 1>${y?upper_case}</#if>", TagSyntaxMode::AutoDetect)?;
//! assert_eq!(fm3, "<#if x == 1>${y?upperCase}</#if>");
//! # Ok::<(), fmconv::ConvertError>(())
//! ```

pub use crate::errors::{ConvertError, ErrorCategory, ErrorKind};

pub mod ast;
pub mod cli;
pub mod config;
pub mod convert;
pub mod driver;
pub mod errors;
pub mod source;
pub mod syntax;
pub mod target;
