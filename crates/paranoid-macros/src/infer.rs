//! SQL type inference from Rust types.

use proc_macro2::TokenStream;
use quote::{ToTokens, quote};
use syn::{GenericArgument, PathArguments, Type};

/// Infer the SQL type of a field, unwrapping `Option<T>` first.
///
/// Unknown types fall back to TEXT.
pub fn infer_sql_type(ty: &Type) -> TokenStream {
    match type_to_string(unwrap_option_type(ty)).as_str() {
        "bool" => quote! { paranoid_core::SqlType::Boolean },
        "i8" | "i16" | "i32" | "u8" | "u16" => quote! { paranoid_core::SqlType::Integer },
        "i64" | "u32" | "u64" | "isize" | "usize" => quote! { paranoid_core::SqlType::BigInt },
        "f32" | "f64" => quote! { paranoid_core::SqlType::Double },
        "Vec<u8>" => quote! { paranoid_core::SqlType::Blob },
        "serde_json::Value" => quote! { paranoid_core::SqlType::Json },
        _ => quote! { paranoid_core::SqlType::Text },
    }
}

/// Parse an explicit `sql_type = "..."` attribute.
///
/// Returns `None` for names that have no `SqlType` counterpart.
pub fn parse_sql_type_attr(sql_type: &str) -> Option<TokenStream> {
    let upper = sql_type.trim().to_uppercase();
    if let Some(len) = upper
        .strip_prefix("VARCHAR(")
        .and_then(|rest| rest.strip_suffix(')'))
        .and_then(|len| len.trim().parse::<u32>().ok())
    {
        return Some(quote! { paranoid_core::SqlType::VarChar(#len) });
    }
    let ts = match upper.as_str() {
        "INTEGER" | "INT" => quote! { paranoid_core::SqlType::Integer },
        "BIGINT" => quote! { paranoid_core::SqlType::BigInt },
        "DOUBLE" | "DOUBLE PRECISION" | "REAL" | "FLOAT" => {
            quote! { paranoid_core::SqlType::Double }
        }
        "BOOLEAN" | "BOOL" => quote! { paranoid_core::SqlType::Boolean },
        "TEXT" => quote! { paranoid_core::SqlType::Text },
        "BLOB" | "BYTEA" => quote! { paranoid_core::SqlType::Blob },
        "TIMESTAMP" => quote! { paranoid_core::SqlType::Timestamp },
        "TIMESTAMPTZ" => quote! { paranoid_core::SqlType::TimestampTz },
        "JSON" | "JSONB" => quote! { paranoid_core::SqlType::Json },
        _ => return None,
    };
    Some(ts)
}

/// `T` for `Option<T>`, otherwise the type itself.
pub fn unwrap_option_type(ty: &Type) -> &Type {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            if segment.ident == "Option" {
                if let PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(GenericArgument::Type(inner)) = args.args.first() {
                        return inner;
                    }
                }
            }
        }
    }
    ty
}

/// Type rendered without whitespace, e.g. `Option<i64>`.
pub fn type_to_string(ty: &Type) -> String {
    ty.to_token_stream()
        .to_string()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}
