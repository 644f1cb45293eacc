//! Base types and error handling.
//!
//! - [`NetError`](neterror::NetError): every failure this crate can report
//! - [`ErrorKind`](neterror::ErrorKind): connection / gateway / devtools grouping
//! - [`IoResultExt`](context::IoResultExt): context helpers for IO errors

pub mod context;
pub mod neterror;
