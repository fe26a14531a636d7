//! Procedural macros backing `sluice-macros`.
//!
//! Generated code refers to third-party crates through the hidden re-exports of
//! `sluice-macros`, so users only need to depend on that crate.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{parse_macro_input, Ident, ItemFn, LitStr};

/// Levels accepted by [macro@test_traced].
const LEVELS: [&str; 5] = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];

/// Run a test function with a `tracing` subscriber installed for its duration.
///
/// The subscriber writes through the libtest capture writer, so logs are only printed
/// for failing tests (or with `--nocapture`). The maximum level defaults to `DEBUG` and
/// can be overridden with a string literal:
///
/// ```ignore
/// use sluice_macros::test_traced;
///
/// #[test_traced("INFO")]
/// fn test_something() {
///     tracing::info!("visible");
///     tracing::debug!("filtered");
/// }
/// ```
#[proc_macro_attribute]
pub fn test_traced(attr: TokenStream, item: TokenStream) -> TokenStream {
    let level = if attr.is_empty() {
        LitStr::new("DEBUG", Span::call_site())
    } else {
        parse_macro_input!(attr as LitStr)
    };
    let level_str = level.value().to_uppercase();
    if !LEVELS.contains(&level_str.as_str()) {
        return syn::Error::new(
            level.span(),
            format!("invalid log level `{}`; expected one of {:?}", level.value(), LEVELS),
        )
        .to_compile_error()
        .into();
    }
    let level = Ident::new(&level_str, level.span());

    let input = parse_macro_input!(item as ItemFn);
    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;

    let expanded = quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let subscriber = ::sluice_macros::tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(::sluice_macros::tracing::Level::#level)
                .with_line_number(true)
                .finish();
            let dispatcher = ::sluice_macros::tracing::Dispatch::new(subscriber);
            ::sluice_macros::tracing::dispatcher::with_default(&dispatcher, || #block)
        }
    };
    TokenStream::from(expanded)
}
