use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Expr, Fields, Lit, Meta, Type, parse_macro_input};

/// Derive the `Saveable` trait, generating the shape tree that drives
/// encoding and decoding.
///
/// The type must also derive (or implement) `serde::Serialize` and
/// `serde::Deserialize`. Unit structs become tag components; structs with
/// fields become data components whose shape mirrors the declared field
/// order.
///
/// # Field attributes
///
/// - `#[saveable(default)]` — when the field is missing from a text save,
///   fall back to `Default::default()`.
/// - `#[saveable(default = expr)]` — fall back to `expr` instead.
///
/// # Type attributes
///
/// - `#[saveable(emit_with = "path")]` — replace the generic emit walk with
///   `fn(&Self) -> Result<Value, SaveError>`.
/// - `#[saveable(parse_with = "path")]` — replace the generic parse walk with
///   `fn(Value) -> Result<Self, SaveError>`.
///
/// A type with `emit_with` but no `parse_with` cannot be loaded through the
/// generic path; deserializer construction reports it.
///
/// # Enums
///
/// Enums whose variants all carry no payload map to a named-tag shape with
/// the `#[repr]`-declared discriminant width (default 32-bit). Enums with
/// payload variants map to a tagged-variant shape; payloads may be a single
/// unnamed field or a set of named fields.
#[proc_macro_derive(Saveable, attributes(saveable))]
pub fn derive_saveable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let name_str = name.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let type_attrs = TypeAttrs::parse(&input.attrs)?;

    let (shape_expr, is_tag) = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => {
                let mut defs = Vec::new();
                for field in &fields.named {
                    reject_unserializable(&field.ty, &name_str)?;
                    let fname = field.ident.as_ref().unwrap().to_string();
                    let ftype = &field.ty;
                    let default = field_default(&field.attrs, ftype)?;
                    defs.push(quote! {
                        lodesave::FieldDef {
                            name: #fname,
                            shape: <#ftype as lodesave::SaveField>::shape(),
                            default: #default,
                        }
                    });
                }
                (
                    quote! { lodesave::Shape::Struct { fields: ::std::vec![#(#defs),*] } },
                    false,
                )
            }
            Fields::Unit => (
                quote! { lodesave::Shape::Struct { fields: ::std::vec::Vec::new() } },
                true,
            ),
            Fields::Unnamed(_) => {
                return Err(syn::Error::new_spanned(
                    name,
                    "cannot derive Saveable for tuple structs: saved fields need stable names",
                ));
            }
        },
        Data::Enum(data) => (enum_shape(input, data)?, false),
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                name,
                "cannot derive Saveable for untagged unions: use an enum",
            ));
        }
    };

    let tag_const = if is_tag {
        quote! { const IS_TAG: bool = true; }
    } else {
        TokenStream2::new()
    };

    let custom_emit = match &type_attrs.emit_with {
        Some(path) => quote! {
            const CUSTOM_EMIT: bool = true;
            fn emit_value(&self) -> ::core::result::Result<lodesave::Value, lodesave::SaveError> {
                #path(self)
            }
        },
        None => TokenStream2::new(),
    };
    let custom_parse = match &type_attrs.parse_with {
        Some(path) => quote! {
            const CUSTOM_PARSE: bool = true;
            fn parse_value(
                value: lodesave::Value,
            ) -> ::core::result::Result<Self, lodesave::SaveError> {
                #path(value)
            }
        },
        None => TokenStream2::new(),
    };

    Ok(quote! {
        impl #impl_generics lodesave::Saveable for #name #ty_generics #where_clause {
            const NAME: &'static str = #name_str;
            #tag_const
            #custom_emit
            #custom_parse

            fn shape() -> &'static lodesave::Shape {
                static SHAPE: ::std::sync::LazyLock<lodesave::Shape> =
                    ::std::sync::LazyLock::new(|| #shape_expr);
                &SHAPE
            }
        }

        impl #impl_generics lodesave::SaveField for #name #ty_generics #where_clause {
            fn shape() -> lodesave::Shape {
                <Self as lodesave::Saveable>::shape().clone()
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

fn enum_shape(input: &DeriveInput, data: &syn::DataEnum) -> syn::Result<TokenStream2> {
    let name_str = input.ident.to_string();
    let all_unit = data
        .variants
        .iter()
        .all(|v| matches!(v.fields, Fields::Unit));

    if all_unit {
        let tag_width = repr_tag_width(&input.attrs);
        let mut next_value: i64 = 0;
        let mut variants = Vec::new();
        for variant in &data.variants {
            let vname = variant.ident.to_string();
            let value = match &variant.discriminant {
                Some((_, expr)) => discriminant_value(expr)?,
                None => next_value,
            };
            next_value = value + 1;
            variants.push(quote! {
                lodesave::EnumVariantDef { name: #vname, value: #value }
            });
        }
        return Ok(quote! {
            lodesave::Shape::Enum {
                tag: #tag_width,
                variants: ::std::vec![#(#variants),*],
            }
        });
    }

    let mut variants = Vec::new();
    for variant in &data.variants {
        let vname = variant.ident.to_string();
        let payload = match &variant.fields {
            Fields::Unit => quote! { ::core::option::Option::None },
            Fields::Unnamed(fields) if fields.unnamed.len() == 1 => {
                let ftype = &fields.unnamed[0].ty;
                reject_unserializable(ftype, &name_str)?;
                quote! { ::core::option::Option::Some(<#ftype as lodesave::SaveField>::shape()) }
            }
            Fields::Unnamed(_) => {
                return Err(syn::Error::new_spanned(
                    variant,
                    "cannot derive Saveable: multi-field tuple variants have no named shape; \
                     use a struct variant",
                ));
            }
            Fields::Named(fields) => {
                let mut defs = Vec::new();
                for field in &fields.named {
                    reject_unserializable(&field.ty, &name_str)?;
                    let fname = field.ident.as_ref().unwrap().to_string();
                    let ftype = &field.ty;
                    let default = field_default(&field.attrs, ftype)?;
                    defs.push(quote! {
                        lodesave::FieldDef {
                            name: #fname,
                            shape: <#ftype as lodesave::SaveField>::shape(),
                            default: #default,
                        }
                    });
                }
                quote! {
                    ::core::option::Option::Some(
                        lodesave::Shape::Struct { fields: ::std::vec![#(#defs),*] }
                    )
                }
            }
        };
        variants.push(quote! {
            lodesave::VariantDef { name: #vname, payload: #payload }
        });
    }
    Ok(quote! {
        lodesave::Shape::Variant { variants: ::std::vec![#(#variants),*] }
    })
}

fn repr_tag_width(attrs: &[syn::Attribute]) -> TokenStream2 {
    for attr in attrs {
        if !attr.path().is_ident("repr") {
            continue;
        }
        let mut width = None;
        let _ = attr.parse_nested_meta(|meta| {
            width = meta.path.get_ident().and_then(|ident| match ident.to_string().as_str() {
                "u8" | "i8" => Some(quote! { lodesave::IntWidth::W8 }),
                "u16" | "i16" => Some(quote! { lodesave::IntWidth::W16 }),
                "u32" | "i32" => Some(quote! { lodesave::IntWidth::W32 }),
                "u64" | "i64" => Some(quote! { lodesave::IntWidth::W64 }),
                _ => None,
            });
            Ok(())
        });
        if let Some(width) = width {
            return width;
        }
    }
    quote! { lodesave::IntWidth::W32 }
}

fn discriminant_value(expr: &Expr) -> syn::Result<i64> {
    match expr {
        Expr::Lit(lit) => match &lit.lit {
            Lit::Int(int) => int.base10_parse::<i64>(),
            other => Err(syn::Error::new_spanned(
                other,
                "enum discriminants must be integer literals to derive Saveable",
            )),
        },
        Expr::Unary(unary) if matches!(unary.op, syn::UnOp::Neg(_)) => {
            discriminant_value(&unary.expr).map(|v| -v)
        }
        other => Err(syn::Error::new_spanned(
            other,
            "enum discriminants must be integer literals to derive Saveable",
        )),
    }
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

struct TypeAttrs {
    emit_with: Option<syn::Path>,
    parse_with: Option<syn::Path>,
}

impl TypeAttrs {
    fn parse(attrs: &[syn::Attribute]) -> syn::Result<Self> {
        let mut out = TypeAttrs {
            emit_with: None,
            parse_with: None,
        };
        for attr in attrs {
            if !attr.path().is_ident("saveable") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("emit_with") {
                    out.emit_with = Some(parse_path_value(&meta)?);
                    Ok(())
                } else if meta.path.is_ident("parse_with") {
                    out.parse_with = Some(parse_path_value(&meta)?);
                    Ok(())
                } else {
                    Err(meta.error("unknown saveable attribute; expected emit_with or parse_with"))
                }
            })?;
        }
        Ok(out)
    }
}

fn parse_path_value(meta: &syn::meta::ParseNestedMeta<'_>) -> syn::Result<syn::Path> {
    let value = meta.value()?;
    let lit: syn::LitStr = value.parse()?;
    lit.parse()
}

fn field_default(attrs: &[syn::Attribute], ftype: &Type) -> syn::Result<TokenStream2> {
    for attr in attrs {
        if !attr.path().is_ident("saveable") {
            continue;
        }
        if let Meta::List(list) = &attr.meta {
            // `#[saveable(default)]` parses as a bare path, `default = expr`
            // as a name-value pair.
            if let Ok(path) = list.parse_args::<syn::Path>() {
                if path.is_ident("default") {
                    return Ok(quote! {
                        ::core::option::Option::Some({
                            let value: #ftype = ::core::default::Default::default();
                            lodesave::value::to_value(&value)
                                .expect("field default must be serializable")
                        })
                    });
                }
            }
            if let Ok(nv) = list.parse_args::<syn::MetaNameValue>() {
                if nv.path.is_ident("default") {
                    let expr = &nv.value;
                    return Ok(quote! {
                        ::core::option::Option::Some({
                            let value: #ftype = #expr;
                            lodesave::value::to_value(&value)
                                .expect("field default must be serializable")
                        })
                    });
                }
            }
            return Err(syn::Error::new_spanned(
                list,
                "unknown saveable field attribute; expected default or default = expr",
            ));
        }
    }
    Ok(quote! { ::core::option::Option::None })
}

// ---------------------------------------------------------------------------
// Serializability
// ---------------------------------------------------------------------------

/// Reject types the shape grammar can never express. Anything else that
/// lacks a `SaveField` impl still fails to compile, but pointers and
/// function references get a direct diagnostic.
fn reject_unserializable(ty: &Type, owner: &str) -> syn::Result<()> {
    match ty {
        Type::Ptr(_) => Err(syn::Error::new_spanned(
            ty,
            format!("cannot derive Saveable for `{owner}`: raw pointer fields are not serializable"),
        )),
        Type::BareFn(_) => Err(syn::Error::new_spanned(
            ty,
            format!(
                "cannot derive Saveable for `{owner}`: function reference fields are not serializable"
            ),
        )),
        Type::Reference(_) => Err(syn::Error::new_spanned(
            ty,
            format!(
                "cannot derive Saveable for `{owner}`: borrowed fields are not serializable; \
                 store owned data"
            ),
        )),
        Type::Array(arr) => reject_unserializable(&arr.elem, owner),
        Type::Paren(inner) => reject_unserializable(&inner.elem, owner),
        _ => Ok(()),
    }
}
