use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

use crate::crate_path::tessera_data_path;
use crate::fields::named_fields;

pub fn expand(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match generate(&input) {
        Ok(output) => output.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn generate(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let data = tessera_data_path();
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let fields = named_fields(input, "Model")?;

    let decode = fields.iter().map(|f| {
        let ident = &f.ident;
        let ty = &f.ty;
        let column = &f.column;
        if f.skip {
            quote! { #ident: ::std::default::Default::default() }
        } else {
            quote! { #ident: record.get::<#ty>(#column)? }
        }
    });

    let encode = fields.iter().filter(|f| !f.skip).map(|f| {
        let ident = &f.ident;
        let column = &f.column;
        quote! {
            record.insert(#column, ::std::clone::Clone::clone(&self.#ident));
        }
    });

    let consts = fields.iter().filter(|f| !f.skip).map(|f| {
        let const_name = f.const_name();
        let ty = &f.ty;
        let column = &f.column;
        let doc = format!("Selector of the `{column}` field.");
        quote! {
            #[doc = #doc]
            pub const #const_name: #data::Field<Self, #ty> = #data::Field::new(#column);
        }
    });

    Ok(quote! {
        impl #impl_generics #data::Model for #name #ty_generics #where_clause {
            fn from_record(record: &#data::Record) -> ::std::result::Result<Self, #data::DataError> {
                ::std::result::Result::Ok(Self {
                    #(#decode,)*
                })
            }

            fn to_record(&self) -> #data::Record {
                let mut record = #data::Record::new();
                #(#encode)*
                record
            }
        }

        #[allow(dead_code)]
        impl #impl_generics #name #ty_generics #where_clause {
            #(#consts)*
        }
    })
}
