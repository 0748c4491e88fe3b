//! Derive macros for the stackvm crate.
//!
//! Provides:
//! - `#[derive(Error)]` - `Display` and `std::error::Error` for the assembler
//!   and VM error enums

mod error;

use proc_macro::TokenStream;

/// Implements `Display` and `Error` from `#[error("...")]` attributes.
#[proc_macro_derive(Error, attributes(error))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
