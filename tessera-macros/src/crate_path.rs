//! Crate path resolution for generated code.
//!
//! Detects whether the user depends on `tessera` (facade) or `tessera-data`
//! directly, and returns the appropriate path prefix for generated code.

use proc_macro2::TokenStream;
use proc_macro_crate::{crate_name, FoundCrate};
use quote::quote;

/// Returns the token stream for accessing `tessera_data` types.
///
/// If the user depends on `tessera`, returns `::tessera::data`.
/// Otherwise returns `::tessera_data`.
pub fn tessera_data_path() -> TokenStream {
    if let Ok(found) = crate_name("tessera") {
        match found {
            FoundCrate::Itself => quote!(crate::data),
            FoundCrate::Name(name) => {
                let ident = syn::Ident::new(&name, proc_macro2::Span::call_site());
                quote!(::#ident::data)
            }
        }
    } else if let Ok(found) = crate_name("tessera-data") {
        match found {
            FoundCrate::Itself => quote!(crate),
            FoundCrate::Name(name) => {
                let ident = syn::Ident::new(&name, proc_macro2::Span::call_site());
                quote!(::#ident)
            }
        }
    } else {
        // Fallback so errors point at a readable path
        quote!(::tessera_data)
    }
}
