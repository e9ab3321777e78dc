extern crate proc_macro;
use proc_macro::TokenStream;

pub(crate) mod crate_path;
pub(crate) mod entity_derive;
pub(crate) mod fields;
pub(crate) mod model_derive;

/// Derive record conversion and typed field selectors.
///
/// Generates `Model::from_record` / `Model::to_record` and one
/// `Field<Self, T>` constant per stored field, named after the field in
/// upper case.
///
/// # Field attributes
///
/// | Attribute | Description |
/// |-----------|-------------|
/// | `#[model(rename = "col")]` | Store the field under another column name |
/// | `#[model(skip)]` | Not stored; decoded as `Default::default()` |
///
/// # Example
///
/// ```ignore
/// #[derive(Model)]
/// pub struct OrderView {
///     pub id: i64,
///     #[model(rename = "customer")]
///     pub customer_name: String,
/// }
///
/// let big = OrderView::CUSTOMER_NAME.like("a%");
/// ```
#[proc_macro_derive(Model, attributes(model))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    model_derive::expand(input)
}

/// Derive the entity contract for a `Model` stored in a table.
///
/// # Struct-level attribute
///
/// | Parameter | Required | Description |
/// |-----------|----------|-------------|
/// | `table` | **yes** | Table name |
/// | `key` | no | Primary-key column, `id` by default; its field must be an `i64` |
/// | `soft_delete` | no | Boolean column flagging deleted rows |
///
/// # Example
///
/// ```ignore
/// #[derive(Model, Entity)]
/// #[entity(table = "orders", soft_delete = "is_deleted")]
/// pub struct Order {
///     pub id: i64,
///     pub customer: String,
///     pub is_deleted: bool,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(entity, model))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    entity_derive::expand(input)
}
