//! Parsing logic for the Model derive macro.
//!
//! Struct-level `#[paranoid(...)]` attributes name the table, switch on soft
//! delete and declare relationships; field-level ones describe columns.

use crate::infer::{type_to_string, unwrap_option_type};
use syn::meta::ParseNestedMeta;
use syn::{Attribute, Data, DeriveInput, Error, Field, Fields, Generics, Ident, LitStr, Result, Type};

/// Name of the timestamp field picked up when none is marked.
const DELETED_AT: &str = "deleted_at";

/// Parsed model definition from a struct with `#[derive(Model)]`.
#[derive(Debug)]
pub struct ModelDef {
    pub name: Ident,
    pub generics: Generics,
    pub table_name: String,
    pub soft_delete: bool,
    /// Column fields, in declaration order. Excludes the timestamp field.
    pub fields: Vec<FieldDef>,
    pub relationships: Vec<RelationshipDef>,
    /// Field holding the deletion timestamp of a soft-delete model.
    pub deleted_at: Option<Ident>,
}

/// Parsed definition of a struct field.
#[derive(Debug)]
pub struct FieldDef {
    pub name: Ident,
    pub column_name: String,
    pub ty: Type,
    pub sql_type: Option<String>,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
    /// `"table.column"`
    pub foreign_key: Option<String>,
    pub on_delete: Option<OnDelete>,
    /// Not stored; filled with `Default::default()` when loading.
    pub skip: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    NoAction,
    Restrict,
    Cascade,
    SetNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKindAttr {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

/// Parsed `#[paranoid(relationship(...))]`.
#[derive(Debug, Clone)]
pub struct RelationshipDef {
    pub name: String,
    /// Table of the related model.
    pub model: String,
    pub kind: RelationshipKindAttr,
    pub local_key: Option<String>,
    pub remote_key: Option<String>,
    pub link_table: Option<LinkTableDef>,
    pub back_populates: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTableDef {
    pub table: String,
    pub local_column: String,
    pub remote_column: String,
}

impl ModelDef {
    /// Fields stored as columns.
    pub fn column_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| !f.skip)
    }

    /// Fields that make up the primary key.
    pub fn primary_key_fields(&self) -> Vec<&FieldDef> {
        self.column_fields().filter(|f| f.primary_key).collect()
    }
}

fn string_value(meta: &ParseNestedMeta<'_>) -> Result<String> {
    let lit: LitStr = meta.value()?.parse()?;
    Ok(lit.value())
}

/// Parse a derive input into a `ModelDef`.
pub fn parse_model(input: &DeriveInput) -> Result<ModelDef> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => named.named.iter().collect::<Vec<_>>(),
            _ => {
                return Err(Error::new_spanned(
                    input,
                    "Model can only be derived for structs with named fields",
                ));
            }
        },
        Data::Enum(_) | Data::Union(_) => {
            return Err(Error::new_spanned(
                input,
                "Model can only be derived for structs",
            ));
        }
    };

    let mut table_name = None;
    let mut soft_delete = false;
    let mut relationships = Vec::new();
    for attr in paranoid_attrs(&input.attrs) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                table_name = Some(string_value(&meta)?);
            } else if meta.path.is_ident("soft_delete") {
                soft_delete = true;
            } else if meta.path.is_ident("relationship") {
                relationships.push(parse_relationship(&meta)?);
            } else {
                return Err(meta.error("unknown paranoid struct attribute"));
            }
            Ok(())
        })?;
    }

    let mut columns = Vec::new();
    let mut marked = None;
    let mut implicit = None;
    for field in fields {
        let (def, is_deleted_at) = parse_field(field)?;
        if is_deleted_at {
            if marked.is_some() {
                return Err(Error::new_spanned(field, "only one field can be deleted_at"));
            }
            marked = Some(def);
        } else if def.name == DELETED_AT && soft_delete {
            implicit = Some(def);
        } else {
            columns.push(def);
        }
    }
    if let (Some(_), Some(def)) = (&marked, implicit.take()) {
        columns.push(def);
    }
    if !columns.iter().any(|f| f.primary_key && !f.skip) {
        if let Some(id) = columns.iter_mut().find(|f| f.name == "id" && !f.skip) {
            id.primary_key = true;
            id.nullable = false;
        }
    }

    let deleted_at = match (soft_delete, marked.or(implicit)) {
        (true, Some(def)) => {
            if type_to_string(&def.ty) != "Option<i64>" {
                return Err(Error::new_spanned(
                    &def.ty,
                    "the deleted_at field must be an Option<i64>",
                ));
            }
            Some(def.name)
        }
        (true, None) => {
            return Err(Error::new_spanned(
                &input.ident,
                "soft_delete models need an Option<i64> deleted_at field",
            ));
        }
        (false, Some(def)) => {
            return Err(Error::new_spanned(
                &def.name,
                "deleted_at is only meaningful on soft_delete models",
            ));
        }
        (false, None) => None,
    };

    Ok(ModelDef {
        name: input.ident.clone(),
        generics: input.generics.clone(),
        table_name: table_name.unwrap_or_else(|| to_snake_case(&input.ident.to_string())),
        soft_delete,
        fields: columns,
        relationships,
        deleted_at,
    })
}

fn paranoid_attrs(attrs: &[Attribute]) -> impl Iterator<Item = &Attribute> {
    attrs.iter().filter(|a| a.path().is_ident("paranoid"))
}

/// Parse one field; the flag reports an explicit `deleted_at` marker.
fn parse_field(field: &Field) -> Result<(FieldDef, bool)> {
    let Some(name) = field.ident.clone() else {
        return Err(Error::new_spanned(field, "expected a named field"));
    };
    let mut def = FieldDef {
        column_name: name.to_string(),
        name,
        ty: field.ty.clone(),
        sql_type: None,
        nullable: false,
        primary_key: false,
        unique: false,
        foreign_key: None,
        on_delete: None,
        skip: false,
    };
    let mut is_deleted_at = false;

    for attr in paranoid_attrs(&field.attrs) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("primary_key") {
                def.primary_key = true;
            } else if meta.path.is_ident("unique") {
                def.unique = true;
            } else if meta.path.is_ident("skip") {
                def.skip = true;
            } else if meta.path.is_ident("deleted_at") {
                is_deleted_at = true;
            } else if meta.path.is_ident("column") {
                def.column_name = string_value(&meta)?;
            } else if meta.path.is_ident("sql_type") {
                let lit: LitStr = meta.value()?.parse()?;
                if crate::infer::parse_sql_type_attr(&lit.value()).is_none() {
                    return Err(Error::new_spanned(lit, "unsupported sql_type"));
                }
                def.sql_type = Some(lit.value());
            } else if meta.path.is_ident("foreign_key") {
                let lit: LitStr = meta.value()?.parse()?;
                if !lit.value().contains('.') {
                    return Err(Error::new_spanned(
                        lit,
                        "foreign_key must be in format 'table.column'",
                    ));
                }
                def.foreign_key = Some(lit.value());
            } else if meta.path.is_ident("on_delete") {
                let lit: LitStr = meta.value()?.parse()?;
                def.on_delete = Some(parse_on_delete(&lit)?);
            } else {
                return Err(meta.error("unknown paranoid field attribute"));
            }
            Ok(())
        })?;
    }

    if def.on_delete.is_some() && def.foreign_key.is_none() {
        return Err(Error::new_spanned(
            &def.name,
            "on_delete requires a foreign_key",
        ));
    }
    def.nullable = !def.primary_key && unwrap_option_type(&def.ty) != &def.ty;
    Ok((def, is_deleted_at))
}

fn parse_on_delete(lit: &LitStr) -> Result<OnDelete> {
    match lit.value().to_uppercase().as_str() {
        "NO ACTION" => Ok(OnDelete::NoAction),
        "RESTRICT" => Ok(OnDelete::Restrict),
        "CASCADE" => Ok(OnDelete::Cascade),
        "SET NULL" => Ok(OnDelete::SetNull),
        _ => Err(Error::new_spanned(
            lit,
            "on_delete must be one of NO ACTION, RESTRICT, CASCADE, SET NULL",
        )),
    }
}

fn parse_relationship(meta: &ParseNestedMeta<'_>) -> Result<RelationshipDef> {
    let mut name = None;
    let mut model = None;
    let mut kind = None;
    let mut local_key = None;
    let mut remote_key = None;
    let mut link_table = None;
    let mut back_populates = None;

    meta.parse_nested_meta(|inner| {
        let kinds = [
            ("one_to_one", RelationshipKindAttr::OneToOne),
            ("many_to_one", RelationshipKindAttr::ManyToOne),
            ("one_to_many", RelationshipKindAttr::OneToMany),
            ("many_to_many", RelationshipKindAttr::ManyToMany),
        ];
        if let Some((_, k)) = kinds.iter().find(|(ident, _)| inner.path.is_ident(ident)) {
            if kind.replace(*k).is_some() {
                return Err(inner.error("relationship kind given twice"));
            }
        } else if inner.path.is_ident("name") {
            name = Some(string_value(&inner)?);
        } else if inner.path.is_ident("model") {
            model = Some(string_value(&inner)?);
        } else if inner.path.is_ident("local_key") {
            local_key = Some(string_value(&inner)?);
        } else if inner.path.is_ident("remote_key") {
            remote_key = Some(string_value(&inner)?);
        } else if inner.path.is_ident("back_populates") {
            back_populates = Some(string_value(&inner)?);
        } else if inner.path.is_ident("link_table") {
            link_table = Some(parse_link_table(&inner)?);
        } else {
            return Err(inner.error("unknown relationship attribute"));
        }
        Ok(())
    })?;

    let Some(name) = name else {
        return Err(meta.error("relationship requires name = \"...\""));
    };
    let Some(model) = model else {
        return Err(meta.error("relationship requires model = \"table\""));
    };
    let kind = match (kind, &link_table) {
        (Some(RelationshipKindAttr::ManyToMany) | None, Some(_)) => RelationshipKindAttr::ManyToMany,
        (Some(_), Some(_)) => {
            return Err(meta.error("link_table is only valid on many_to_many"));
        }
        (Some(RelationshipKindAttr::ManyToMany), None) => {
            return Err(meta.error("many_to_many requires link_table(...)"));
        }
        (Some(kind), None) => kind,
        (None, None) => RelationshipKindAttr::ManyToOne,
    };

    Ok(RelationshipDef {
        name,
        model,
        kind,
        local_key,
        remote_key,
        link_table,
        back_populates,
    })
}

fn parse_link_table(meta: &ParseNestedMeta<'_>) -> Result<LinkTableDef> {
    let mut table = None;
    let mut local_column = None;
    let mut remote_column = None;
    meta.parse_nested_meta(|inner| {
        if inner.path.is_ident("table") {
            table = Some(string_value(&inner)?);
        } else if inner.path.is_ident("local_column") {
            local_column = Some(string_value(&inner)?);
        } else if inner.path.is_ident("remote_column") {
            remote_column = Some(string_value(&inner)?);
        } else {
            return Err(inner.error("unknown link_table attribute"));
        }
        Ok(())
    })?;
    match (table, local_column, remote_column) {
        (Some(table), Some(local_column), Some(remote_column)) => Ok(LinkTableDef {
            table,
            local_column,
            remote_column,
        }),
        _ => Err(meta.error("link_table requires table, local_column and remote_column")),
    }
}

/// `TeamMember` -> `team_member`
fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let after_lower = i > 0 && chars[i - 1].is_lowercase();
            let acronym_end = i > 0
                && chars[i - 1].is_uppercase()
                && chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if after_lower || acronym_end {
                result.push('_');
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(*c);
        }
    }
    result
}
