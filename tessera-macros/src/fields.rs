use syn::{Data, DeriveInput, Fields};

/// A named struct field and the column it maps to.
pub struct FieldInfo {
    pub ident: syn::Ident,
    pub ty: syn::Type,
    pub column: String,
    /// `#[model(skip)]`: not stored, decoded as `Default::default()`.
    pub skip: bool,
}

impl FieldInfo {
    /// Name of the generated `Field` constant: `customer_id` -> `CUSTOMER_ID`.
    pub fn const_name(&self) -> syn::Ident {
        let name = self.ident.to_string();
        let name = name.strip_prefix("r#").unwrap_or(&name).to_uppercase();
        syn::Ident::new(&name, self.ident.span())
    }
}

pub fn named_fields(input: &DeriveInput, derive: &str) -> syn::Result<Vec<FieldInfo>> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input.ident,
                    format!("#[derive({derive})] requires a struct with named fields"),
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                format!("#[derive({derive})] can only be used on structs"),
            ))
        }
    };

    let mut out = Vec::with_capacity(fields.len());
    for field in fields {
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        let mut column = None;
        let mut skip = false;
        for attr in &field.attrs {
            if !attr.path().is_ident("model") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    let lit: syn::LitStr = meta.value()?.parse()?;
                    column = Some(lit.value());
                    Ok(())
                } else if meta.path.is_ident("skip") {
                    skip = true;
                    Ok(())
                } else {
                    Err(meta.error("expected `rename = \"...\"` or `skip` in #[model(...)]"))
                }
            })?;
        }
        let column = column.unwrap_or_else(|| {
            let name = ident.to_string();
            name.strip_prefix("r#").unwrap_or(&name).to_string()
        });
        out.push(FieldInfo {
            ident,
            ty: field.ty.clone(),
            column,
            skip,
        });
    }
    Ok(out)
}
