use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, Type};

use crate::{parse_field_attrs, FieldAttrs};

/// A field that takes part in marshaling.
pub(crate) struct RecordField<'a> {
    pub name: String,
    pub ty: &'a Type,
    pub attrs: FieldAttrs,
}

/// Collects the non-skipped named fields of a struct.
pub(crate) fn record_fields(input: &DeriveInput) -> syn::Result<Vec<RecordField<'_>>> {
    let named = match &input.data {
        syn::Data::Struct(syn::DataStruct {
            fields: syn::Fields::Named(named),
            ..
        }) => named,
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Record can only be derived for structs with named fields",
            ))
        }
    };

    let mut fields = Vec::with_capacity(named.named.len());
    for field in &named.named {
        let attrs = parse_field_attrs(&field.attrs)?;
        if attrs.skip {
            continue;
        }
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let name = attrs.rename.clone().unwrap_or_else(|| ident.to_string());
        fields.push(RecordField {
            name,
            ty: &field.ty,
            attrs,
        });
    }
    Ok(fields)
}

/// Generates the `schema()` method implementation.
pub(crate) fn generate_schema(
    record_name: &str,
    fields: &[RecordField<'_>],
    self_type: &syn::Ident,
    crate_path: &TokenStream,
) -> TokenStream {
    let field_descriptors: Vec<_> = fields
        .iter()
        .map(|f| {
            let name = &f.name;
            let descriptor = type_to_descriptor(f.ty, self_type, crate_path);
            quote! { (#name, #descriptor) }
        })
        .collect();

    quote! {
        fn schema() -> #crate_path::Schema {
            let fields: ::std::vec::Vec<(&'static str, #crate_path::TypeDescriptor)> =
                ::std::vec![#(#field_descriptors),*];
            #crate_path::Schema::new(#record_name, fields)
        }
    }
}

/// Converts a Rust type to its descriptor expression.
///
/// Containers are unwrapped syntactically so self-references inside them
/// become `Structured` instead of recursing.
fn type_to_descriptor(ty: &Type, self_type: &syn::Ident, crate_path: &TokenStream) -> TokenStream {
    match ty {
        Type::Path(type_path) if type_path.qself.is_none() => {
            if is_self_reference(type_path, self_type) {
                let name = self_type.to_string();
                return quote! { #crate_path::TypeDescriptor::structured(#name) };
            }

            if let Some(segment) = type_path.path.segments.last() {
                let args = generic_type_args(&segment.arguments);
                match (segment.ident.to_string().as_str(), args.as_slice()) {
                    ("Option", [inner]) => {
                        let inner = type_to_descriptor(inner, self_type, crate_path);
                        return quote! { #crate_path::TypeDescriptor::optional(#inner) };
                    }
                    ("Vec", [inner]) => {
                        let inner = type_to_descriptor(inner, self_type, crate_path);
                        return quote! { #crate_path::TypeDescriptor::vec(#inner) };
                    }
                    ("VecDeque" | "HashSet" | "BTreeSet" | "IndexSet", [inner]) => {
                        let inner = type_to_descriptor(inner, self_type, crate_path);
                        return quote! { #crate_path::TypeDescriptor::sequence(#inner) };
                    }
                    ("HashMap" | "BTreeMap" | "IndexMap", [_, value]) => {
                        let value = type_to_descriptor(value, self_type, crate_path);
                        return quote! { #crate_path::TypeDescriptor::mapping(#value) };
                    }
                    ("Box" | "Arc" | "Rc", [inner]) => {
                        return type_to_descriptor(inner, self_type, crate_path);
                    }
                    _ => {}
                }
            }

            quote! { <#type_path as #crate_path::Described>::descriptor() }
        }
        Type::Tuple(tuple) if tuple.elems.is_empty() => {
            quote! { #crate_path::TypeDescriptor::scalar(#crate_path::ScalarKind::Null) }
        }
        Type::Tuple(tuple) => {
            let members: Vec<_> = tuple
                .elems
                .iter()
                .map(|t| type_to_descriptor(t, self_type, crate_path))
                .collect();
            quote! {
                #crate_path::TypeDescriptor::sequence(
                    #crate_path::TypeDescriptor::union([#(#members),*])
                )
            }
        }
        Type::Array(array) => {
            let inner = type_to_descriptor(&array.elem, self_type, crate_path);
            quote! { #crate_path::TypeDescriptor::sequence(#inner) }
        }
        Type::Slice(slice) => {
            let inner = type_to_descriptor(&slice.elem, self_type, crate_path);
            quote! { #crate_path::TypeDescriptor::sequence(#inner) }
        }
        Type::Reference(reference) => type_to_descriptor(&reference.elem, self_type, crate_path),
        Type::Paren(paren) => type_to_descriptor(&paren.elem, self_type, crate_path),
        _ => quote! { <#ty as #crate_path::Described>::descriptor() },
    }
}

/// Check if a type path refers to the type being derived.
fn is_self_reference(type_path: &syn::TypePath, self_type: &syn::Ident) -> bool {
    if type_path.path.is_ident("Self") {
        return true;
    }
    type_path
        .path
        .segments
        .last()
        .is_some_and(|segment| segment.ident == *self_type)
}

/// Extracts the type arguments from angle brackets, e.g. `K, V` from `HashMap<K, V>`.
fn generic_type_args(args: &syn::PathArguments) -> Vec<&Type> {
    match args {
        syn::PathArguments::AngleBracketed(angle) => angle
            .args
            .iter()
            .filter_map(|arg| match arg {
                syn::GenericArgument::Type(ty) => Some(ty),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
