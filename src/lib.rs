//! Assembler and disassembler for a fixed-width GPU instruction set.
//!
//! The pipeline is symmetric around the [`ir::Kernel`] form:
//!
//! ```text
//!   text --parse--> Kernel --encode--> bytes
//!   bytes --decode--> Kernel --format--> text
//! ```
//!
//! [`parse_kernel`] and [`format_kernel`] are exact inverses up to
//! canonicalization: formatting a parsed kernel and reparsing it yields
//! the same IR. [`decode_kernel`] is best-effort and reports what it
//! could not recover as warnings instead of failing.

pub mod blocks;
pub mod compact;
pub mod decoder;
pub mod diag;
pub mod encoder;
pub mod float;
pub mod fmt;
pub mod ir;
pub mod layout;
pub mod lexer;
pub mod ops;
pub mod parser;
pub mod send;

pub use decoder::{decode_kernel, diff_fields, list_fields, DecodeResult, FieldDiff, FieldValue};
pub use diag::{Diagnostic, Loc, Severity};
pub use encoder::{encode_kernel, EncodeOpts, EncodeResult};
pub use fmt::{format_instruction, format_kernel, FmtOpts};
pub use ir::{Kernel, Platform};
pub use parser::{parse_kernel, ParseOpts, ParseResult};
pub use send::{DescriptorCodec, FallbackCodec, SendSummary, Sfid};
