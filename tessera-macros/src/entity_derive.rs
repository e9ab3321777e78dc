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

/// Parsed `#[entity(...)]` attribute.
struct EntityAttr {
    table: String,
    key: String,
    soft_delete: Option<String>,
}

fn extract_entity_attr(input: &DeriveInput) -> syn::Result<EntityAttr> {
    let mut table = None;
    let mut key = None;
    let mut soft_delete = None;
    for attr in &input.attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            let target = if meta.path.is_ident("table") {
                &mut table
            } else if meta.path.is_ident("key") {
                &mut key
            } else if meta.path.is_ident("soft_delete") {
                &mut soft_delete
            } else {
                return Err(meta.error(
                    "expected `table`, `key` or `soft_delete` in #[entity(...)]",
                ));
            };
            let lit: syn::LitStr = meta.value()?.parse()?;
            *target = Some(lit.value());
            Ok(())
        })?;
    }
    let table = table.ok_or_else(|| {
        syn::Error::new_spanned(
            &input.ident,
            "#[derive(Entity)] requires #[entity(table = \"...\")]\n\
             \n  example:\n  #[derive(Model, Entity)]\n  #[entity(table = \"orders\")]\n  pub struct Order { pub id: i64, ... }",
        )
    })?;
    Ok(EntityAttr {
        table,
        key: key.unwrap_or_else(|| "id".to_string()),
        soft_delete,
    })
}

fn generate(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let data = tessera_data_path();
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let attr = extract_entity_attr(input)?;
    let fields: Vec<_> = named_fields(input, "Entity")?
        .into_iter()
        .filter(|f| !f.skip)
        .collect();

    let key_field = fields
        .iter()
        .find(|f| f.column == attr.key)
        .ok_or_else(|| {
            syn::Error::new_spanned(
                &input.ident,
                format!("no field maps to the key column `{}`", attr.key),
            )
        })?;
    let key_ident = &key_field.ident;

    if let Some(column) = &attr.soft_delete {
        if !fields.iter().any(|f| &f.column == column) {
            return Err(syn::Error::new_spanned(
                &input.ident,
                format!("no field maps to the soft-delete column `{column}`"),
            ));
        }
    }

    let table = &attr.table;
    let key = &attr.key;
    let columns = fields.iter().map(|f| &f.column);
    let soft_delete = attr
        .soft_delete
        .as_ref()
        .map(|column| quote!(.with_soft_delete(#column)));

    Ok(quote! {
        impl #impl_generics #data::Identified for #name #ty_generics #where_clause {
            fn key(&self) -> i64 {
                self.#key_ident
            }
        }

        impl #impl_generics #data::Entity for #name #ty_generics #where_clause {
            const TABLE: #data::Table =
                #data::Table::new(#table, #key, &[#(#columns),*]) #soft_delete;
        }
    })
}
