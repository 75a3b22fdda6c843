//! CLI verb adapters. Each builds a command envelope, hands it to the
//! session registry and wraps the outcome in the standard response; the
//! dispatcher in `cli.rs` prints it and maps success to the exit code.

pub mod browser;
pub mod element;
pub mod form;
pub mod page;
pub mod session;
