//! Derive macro for error types.
//!
//! Generates `std::fmt::Display` and `std::error::Error` implementations from
//! a `#[error("...")]` attribute on every enum variant (or on the struct).
//!
//! # Usage
//!
//! ```ignore
//! use stackvm_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum RunError {
//!     #[error("illegal opcode 0x{opcode:02x} at pc {pc}")]
//!     IllegalOpcode { opcode: u8, pc: usize },
//!
//!     #[error("bad file: {0}")]
//!     BadFile(String),
//!
//!     #[error("halted")]
//!     Halted,
//! }
//! ```
//!
//! Only the fields a message refers to are bound, so a variant may carry
//! diagnostic data (e.g. a line number) that its message leaves out.
//! Positional placeholders (`{0}`, `{1:>4}`) refer to tuple fields.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{ToTokens, format_ident, quote};
use std::collections::HashSet;
use syn::{Attribute, Data, DeriveInput, Fields, LitStr, parse_macro_input};

/// Derives `Display` and `Error` for an enum or struct.
pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand_error_derive(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_error_derive(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let display_body = match &input.data {
        Data::Enum(data_enum) => {
            let arms = data_enum
                .variants
                .iter()
                .map(|variant| {
                    let variant_name = &variant.ident;
                    let message = error_message(&variant.attrs, variant_name)?;
                    let (pattern, format, args) =
                        bind_fields(&message, &variant.fields, quote!(Self::#variant_name));
                    Ok(quote! {
                        #pattern => write!(f, #format #(, #args)*),
                    })
                })
                .collect::<syn::Result<Vec<_>>>()?;

            quote! {
                match self {
                    #(#arms)*
                }
            }
        }
        Data::Struct(data_struct) => {
            let message = error_message(&input.attrs, name)?;
            let (pattern, format, args) = bind_fields(&message, &data_struct.fields, quote!(Self));
            quote! {
                let #pattern = self;
                write!(f, #format #(, #args)*)
            }
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Error derive does not support unions",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                #display_body
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
    })
}

/// Reads the string literal out of `#[error("...")]`.
fn error_message<T: ToTokens>(attrs: &[Attribute], target: &T) -> syn::Result<LitStr> {
    for attr in attrs {
        if attr.path().is_ident("error") {
            return attr.parse_args::<LitStr>().map_err(|_| {
                syn::Error::new_spanned(
                    &attr.meta,
                    "invalid #[error] attribute; expected a string literal like #[error(\"stack underflow at pc {pc}\")]",
                )
            });
        }
    }

    Err(syn::Error::new_spanned(
        target,
        "missing #[error(\"...\")] attribute; every error variant must declare a display message",
    ))
}

/// Builds the destructuring pattern, the rewritten format string and the
/// `name = name` arguments for one variant (or struct).
fn bind_fields(
    message: &LitStr,
    fields: &Fields,
    path: TokenStream2,
) -> (TokenStream2, LitStr, Vec<TokenStream2>) {
    let (format, used) = scan_format(&message.value());
    let format = LitStr::new(&format, message.span());

    match fields {
        Fields::Unit => (path, format, Vec::new()),
        Fields::Named(named) => {
            let bound: Vec<_> = named
                .named
                .iter()
                .filter_map(|field| field.ident.as_ref())
                .filter(|ident| used.contains(&ident.to_string()))
                .collect();
            let pattern = quote!(#path { #(#bound,)* .. });
            let args = bound.iter().map(|ident| quote!(#ident = #ident)).collect();
            (pattern, format, args)
        }
        Fields::Unnamed(unnamed) => {
            let mut elems = Vec::with_capacity(unnamed.unnamed.len());
            let mut args = Vec::new();
            for i in 0..unnamed.unnamed.len() {
                if used.contains(&i.to_string()) {
                    let ident = format_ident!("f{}", i);
                    elems.push(quote!(#ident));
                    args.push(quote!(#ident = #ident));
                } else {
                    elems.push(quote!(_));
                }
            }
            (quote!(#path( #(#elems),* )), format, args)
        }
    }
}

/// Collects the argument names referenced by a format string and renames
/// positional arguments (`{0}`) to the identifiers bound for tuple fields (`{f0}`).
fn scan_format(format: &str) -> (String, HashSet<String>) {
    let mut out = String::with_capacity(format.len() + 4);
    let mut used = HashSet::new();
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        out.push(c);
        match c {
            '{' if chars.next_if_eq(&'{').is_some() => out.push('{'),
            '}' if chars.next_if_eq(&'}').is_some() => out.push('}'),
            '{' => {
                let mut name = String::new();
                while let Some(next) = chars.next_if(|&ch| ch != '}' && ch != ':') {
                    name.push(next);
                }
                let name = name.trim().to_string();
                if !name.is_empty() && name.chars().all(|ch| ch.is_ascii_digit()) {
                    out.push('f');
                }
                out.push_str(&name);
                if !name.is_empty() {
                    used.insert(name);
                }
            }
            _ => {}
        }
    }

    (out, used)
}
