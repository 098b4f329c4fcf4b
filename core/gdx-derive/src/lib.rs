//! GDX Derive — procedural macros for the GDX geodatabase engine.
//!
//! Provides `#[derive(Table)]`, mapping a struct onto a geodatabase table.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitInt, LitStr, parse_macro_input};

/// Derive macro for table descriptions and row decoding.
///
/// # Example
///
/// ```ignore
/// #[derive(Table)]
/// #[gdx(table_name = "Parcels")]
/// pub struct Parcel {
///     #[gdx(object_id)]
///     pub id: i64,
///     #[gdx(rename = "APN", length = 12)]
///     pub apn: String,
///     pub zone: Option<i32>,
/// }
/// ```
///
/// Generates:
/// - `TableSchema` (`TABLE_NAME`, `description()`)
/// - `FromRow` trait implementation
/// - `to_values()` → `(field, Value)` pairs for edit sessions
///
/// The `object_id` field is filled from the row id and is not part of the
/// description. Unnamed struct-level tables use the struct name.
#[proc_macro_derive(Table, attributes(gdx))]
pub fn derive_table(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

struct FieldMapping<'a> {
    ident: &'a syn::Ident,
    ty: &'a syn::Type,
    column: String,
    length: Option<usize>,
    object_id: bool,
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let table_name = extract_table_name(input)?.unwrap_or_else(|| name.to_string());

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Table can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "Table can only be derived for structs",
            ));
        }
    };

    let mut mappings = Vec::with_capacity(fields.len());
    for f in fields {
        let Some(ident) = f.ident.as_ref() else {
            continue;
        };
        mappings.push(field_mapping(ident, &f.ty, &f.attrs)?);
    }
    if mappings.iter().filter(|s| s.object_id).count() > 1 {
        return Err(syn::Error::new_spanned(
            name,
            "at most one field can be marked #[gdx(object_id)]",
        ));
    }

    // Description fields (object id column is implicit)
    let description_fields = mappings.iter().filter(|s| !s.object_id).map(|s| {
        let column = &s.column;
        let ty = s.ty;
        let length = match s.length {
            Some(n) => quote! { .length(#n) },
            None => quote! {},
        };
        quote! {
            .field(
                gdx_core::schema::FieldDescription::new(
                    #column,
                    <#ty as gdx_core::api::IntoFieldType>::field_type(),
                )
                .nullable(<#ty as gdx_core::api::IntoFieldType>::is_nullable())
                #length
            )
        }
    });

    let from_row_fields = mappings.iter().map(|s| {
        let ident = s.ident;
        let ty = s.ty;
        if s.object_id {
            quote! {
                #ident: <#ty as gdx_core::api::FromValue>::from_value(
                    &gdx_core::schema::Value::Integer(row.row_id()),
                )?
            }
        } else {
            let column = &s.column;
            quote! {
                #ident: <#ty as gdx_core::api::FromValue>::from_value(row.value(#column)?)?
            }
        }
    });

    let value_pairs = mappings.iter().filter(|s| !s.object_id).map(|s| {
        let ident = s.ident;
        let column = &s.column;
        quote! {
            (#column, gdx_core::schema::Value::from(::std::clone::Clone::clone(&self.#ident)))
        }
    });

    Ok(quote! {
        impl gdx_core::api::TableSchema for #name {
            const TABLE_NAME: &'static str = #table_name;

            fn description() -> gdx_core::schema::TableDescription {
                gdx_core::schema::TableDescription::new(#table_name)
                    #(#description_fields)*
            }
        }

        impl gdx_core::api::FromRow for #name {
            fn from_row(row: &gdx_core::api::Row) -> gdx_core::GdxResult<Self> {
                Ok(Self {
                    #(#from_row_fields),*
                })
            }
        }

        impl #name {
            /// Field/value pairs for `EditSession::create` and `update`.
            pub fn to_values(&self) -> Vec<(&'static str, gdx_core::schema::Value)> {
                vec![#(#value_pairs),*]
            }
        }
    })
}

fn field_mapping<'a>(
    ident: &'a syn::Ident,
    ty: &'a syn::Type,
    attrs: &[syn::Attribute],
) -> syn::Result<FieldMapping<'a>> {
    let mut mapping = FieldMapping {
        ident,
        ty,
        column: ident.to_string(),
        length: None,
        object_id: false,
    };
    for attr in attrs {
        if !attr.path().is_ident("gdx") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("object_id") {
                mapping.object_id = true;
                Ok(())
            } else if meta.path.is_ident("rename") {
                let lit: LitStr = meta.value()?.parse()?;
                mapping.column = lit.value();
                Ok(())
            } else if meta.path.is_ident("length") {
                let lit: LitInt = meta.value()?.parse()?;
                mapping.length = Some(lit.base10_parse()?);
                Ok(())
            } else {
                Err(meta.error("unsupported gdx field attribute"))
            }
        })?;
    }
    Ok(mapping)
}

fn extract_table_name(input: &DeriveInput) -> syn::Result<Option<String>> {
    let mut table_name = None;
    for attr in &input.attrs {
        if !attr.path().is_ident("gdx") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table_name") {
                let lit: LitStr = meta.value()?.parse()?;
                table_name = Some(lit.value());
                Ok(())
            } else {
                Err(meta.error("unsupported gdx table attribute"))
            }
        })?;
    }
    Ok(table_name)
}
