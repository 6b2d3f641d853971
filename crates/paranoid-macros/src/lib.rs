//! Procedural macros for paranoid.
//!
//! `paranoid-macros` is the compile-time codegen layer. `#[derive(Model)]`
//! turns a struct into a fully described `paranoid_core::Model`: table and
//! column metadata, relationship metadata, row conversion and, for models
//! declared with `soft_delete`, the `deleted_at` accessors the session and
//! query layers use to hide deleted rows.
//!
//! The macro is used by application crates through the `paranoid` facade.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;

mod infer;
mod parse;

use parse::{ModelDef, OnDelete, RelationshipKindAttr, parse_model};

/// Derive macro for the `Model` trait.
///
/// # Struct attributes
///
/// - `#[paranoid(table = "name")]` - Override table name (defaults to snake_case struct name)
/// - `#[paranoid(soft_delete)]` - Soft-delete the model; needs an `Option<i64>` timestamp field
/// - `#[paranoid(relationship(name = "..", model = "table", ..))]` - Declare a relationship.
///   Kinds are `many_to_one` (default), `one_to_many`, `one_to_one` and `many_to_many`;
///   keys are given with `local_key`, `remote_key` and
///   `link_table(table = "..", local_column = "..", remote_column = "..")`.
///
/// # Field attributes
///
/// - `#[paranoid(primary_key)]` - Mark field as primary key (defaults to `id`)
/// - `#[paranoid(column = "name")]` - Override column name
/// - `#[paranoid(sql_type = "VARCHAR(40)")]` - Override the inferred SQL type
/// - `#[paranoid(unique)]` - Add unique constraint
/// - `#[paranoid(foreign_key = "table.column")]` - Add foreign key reference
/// - `#[paranoid(on_delete = "CASCADE")]` - Referential action of the foreign key
/// - `#[paranoid(deleted_at)]` - Deletion timestamp field (defaults to `deleted_at`)
/// - `#[paranoid(skip)]` - Not stored; filled with `Default::default()` on load
///
/// The deletion timestamp is not part of `fields()` or `to_row()`; the
/// query and session layers add the `deleted_at` column for soft-delete
/// models themselves.
///
/// # Example
///
/// ```ignore
/// use paranoid::Model;
///
/// #[derive(Model)]
/// #[paranoid(table = "user", soft_delete)]
/// #[paranoid(relationship(
///     name = "groups",
///     model = "group",
///     many_to_many,
///     link_table(table = "user_group", local_column = "user_id", remote_column = "group_id")
/// ))]
/// struct User {
///     #[paranoid(primary_key)]
///     id: Option<i64>,
///     #[paranoid(unique)]
///     name: String,
///     deleted_at: Option<i64>,
/// }
/// ```
#[proc_macro_derive(Model, attributes(paranoid))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);

    let model = match parse_model(&input) {
        Ok(m) => m,
        Err(e) => return e.to_compile_error().into(),
    };

    generate_model_impl(&model).into()
}

fn generate_model_impl(model: &ModelDef) -> TokenStream2 {
    let name = &model.name;
    let table_name = &model.table_name;
    let soft_delete = model.soft_delete;
    let (impl_generics, ty_generics, where_clause) = model.generics.split_for_impl();

    let pk_columns: Vec<&str> = model
        .primary_key_fields()
        .iter()
        .map(|f| f.column_name.as_str())
        .collect();

    let field_infos = generate_field_infos(model);
    let relationships = generate_relationships(model);
    let to_row_body = generate_to_row(model);
    let from_row_body = generate_from_row(model);
    let pk_value_body = generate_primary_key_value(model);
    let is_new_body = generate_is_new(model);
    let set_id = generate_set_id(model);
    let deleted_at = generate_deleted_at(model);

    quote! {
        impl #impl_generics paranoid_core::Model for #name #ty_generics #where_clause {
            const TABLE_NAME: &'static str = #table_name;
            const PRIMARY_KEY: &'static [&'static str] = &[#(#pk_columns),*];
            const RELATIONSHIPS: &'static [paranoid_core::RelationshipInfo] = #relationships;
            const SOFT_DELETE: bool = #soft_delete;

            fn fields() -> &'static [paranoid_core::FieldInfo] {
                static FIELDS: &[paranoid_core::FieldInfo] = &[#(#field_infos),*];
                FIELDS
            }

            fn to_row(&self) -> Vec<(&'static str, paranoid_core::Value)> {
                #to_row_body
            }

            fn from_row(row: &paranoid_core::Row) -> paranoid_core::Result<Self> {
                #from_row_body
            }

            fn primary_key_value(&self) -> Vec<paranoid_core::Value> {
                #pk_value_body
            }

            fn is_new(&self) -> bool {
                #is_new_body
            }

            #set_id

            #deleted_at
        }
    }
}

fn generate_field_infos(model: &ModelDef) -> Vec<TokenStream2> {
    model
        .column_fields()
        .map(|field| {
            let field_name = field.name.to_string();
            let column_name = &field.column_name;
            let sql_type = field
                .sql_type
                .as_deref()
                .and_then(infer::parse_sql_type_attr)
                .unwrap_or_else(|| infer::infer_sql_type(&field.ty));
            let nullable = field.nullable;
            let primary_key = field.primary_key;
            let unique = field.unique;
            let foreign_key = field
                .foreign_key
                .as_ref()
                .map(|fk| quote! { .foreign_key(#fk) });
            let on_delete = field.on_delete.map(|action| {
                let action = match action {
                    OnDelete::NoAction => quote! { NoAction },
                    OnDelete::Restrict => quote! { Restrict },
                    OnDelete::Cascade => quote! { Cascade },
                    OnDelete::SetNull => quote! { SetNull },
                };
                quote! { .on_delete(paranoid_core::ReferentialAction::#action) }
            });
            quote! {
                paranoid_core::FieldInfo::new(#field_name, #column_name, #sql_type)
                    .nullable(#nullable)
                    .primary_key(#primary_key)
                    .unique(#unique)
                    #foreign_key
                    #on_delete
            }
        })
        .collect()
}

fn generate_relationships(model: &ModelDef) -> TokenStream2 {
    let entries = model.relationships.iter().map(|rel| {
        let name = &rel.name;
        let related = &rel.model;
        let kind = match rel.kind {
            RelationshipKindAttr::OneToOne => quote! { OneToOne },
            RelationshipKindAttr::ManyToOne => quote! { ManyToOne },
            RelationshipKindAttr::OneToMany => quote! { OneToMany },
            RelationshipKindAttr::ManyToMany => quote! { ManyToMany },
        };
        let local_key = rel.local_key.as_ref().map(|k| quote! { .local_key(#k) });
        let remote_key = rel.remote_key.as_ref().map(|k| quote! { .remote_key(#k) });
        let link_table = rel.link_table.as_ref().map(|link| {
            let table = &link.table;
            let local = &link.local_column;
            let remote = &link.remote_column;
            quote! {
                .link_table(paranoid_core::LinkTableInfo::new(#table, #local, #remote))
            }
        });
        let back_populates = rel
            .back_populates
            .as_ref()
            .map(|b| quote! { .back_populates(#b) });
        quote! {
            paranoid_core::RelationshipInfo::new(
                #name,
                #related,
                paranoid_core::RelationshipKind::#kind,
            )
            #local_key
            #remote_key
            #link_table
            #back_populates
        }
    });
    quote! { &[#(#entries),*] }
}

fn generate_to_row(model: &ModelDef) -> TokenStream2 {
    let conversions = model.column_fields().map(|field| {
        let field_name = &field.name;
        let column_name = &field.column_name;
        quote! {
            (#column_name, paranoid_core::Value::from(::core::clone::Clone::clone(&self.#field_name)))
        }
    });
    quote! { vec![#(#conversions),*] }
}

fn generate_from_row(model: &ModelDef) -> TokenStream2 {
    let extractions = model.column_fields().map(|field| {
        let field_name = &field.name;
        let column_name = &field.column_name;
        quote! { #field_name: row.get_named(#column_name)? }
    });
    let skipped = model.fields.iter().filter(|f| f.skip).map(|field| {
        let field_name = &field.name;
        quote! { #field_name: ::core::default::Default::default() }
    });
    // Restored from the row by `hydrate`.
    let deleted_at = model
        .deleted_at
        .as_ref()
        .map(|field| quote! { #field: None, });

    quote! {
        Ok(Self {
            #(#extractions,)*
            #(#skipped,)*
            #deleted_at
        })
    }
}

fn generate_primary_key_value(model: &ModelDef) -> TokenStream2 {
    let values = model.primary_key_fields().into_iter().map(|field| {
        let field_name = &field.name;
        quote! { paranoid_core::Value::from(::core::clone::Clone::clone(&self.#field_name)) }
    });
    quote! { vec![#(#values),*] }
}

/// New while any optional key part is unset; models with only required
/// keys are never new.
fn generate_is_new(model: &ModelDef) -> TokenStream2 {
    let checks: Vec<_> = model
        .primary_key_fields()
        .into_iter()
        .filter(|f| infer::unwrap_option_type(&f.ty) != &f.ty)
        .map(|field| {
            let field_name = &field.name;
            quote! { self.#field_name.is_none() }
        })
        .collect();
    if checks.is_empty() {
        quote! { false }
    } else {
        quote! { #(#checks)||* }
    }
}

/// `set_id` only exists for a single generated `Option<i64>` key.
fn generate_set_id(model: &ModelDef) -> Option<TokenStream2> {
    match model.primary_key_fields().as_slice() {
        [field] if infer::type_to_string(&field.ty) == "Option<i64>" => {
            let field_name = &field.name;
            Some(quote! {
                fn set_id(&mut self, id: i64) {
                    self.#field_name = Some(id);
                }
            })
        }
        _ => None,
    }
}

fn generate_deleted_at(model: &ModelDef) -> Option<TokenStream2> {
    let field = model.deleted_at.as_ref()?;
    Some(quote! {
        fn deleted_at(&self) -> Option<i64> {
            self.#field
        }

        fn set_deleted_at(&mut self, value: Option<i64>) {
            self.#field = value;
        }
    })
}
