use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

mod schema;

/// Derive macro for the `Record` trait.
///
/// Generates `schema()` from the declared field types and `overrides()` from
/// field attributes. Also implements `Described` so the record can appear as
/// a structured field of another record.
///
/// # Example
///
/// ```ignore
/// use siloxane_core::Record;
///
/// #[derive(Record)]
/// struct Document {
///     id: i64,
///     metadata: HashMap<String, String>,
///     #[siloxane(array)]
///     tags: Vec<String>,
///     #[siloxane(date)]
///     created_date: String,
/// }
/// ```
///
/// # Attributes
///
/// - `#[siloxane(skip)]` - Leave the field out of the schema
/// - `#[siloxane(rename = "name")]` - Use a custom column name
/// - `#[siloxane(json)]`, `#[siloxane(array)]`, `#[siloxane(vector)]` - Force a classification
/// - `#[siloxane(date)]` - Convert between date text and native dates
/// - `#[siloxane(crate = "path")]` on the struct - Path to `siloxane_core`
#[proc_macro_derive(Record, attributes(siloxane))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_record_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn derive_record_impl(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let record_name = name.to_string();
    let crate_path = parse_container_attrs(&input.attrs)?.crate_path;

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let where_clause = build_where_clause(&input.generics, where_clause, &crate_path);

    let fields = schema::record_fields(input)?;
    let schema_impl = schema::generate_schema(&record_name, &fields, name, &crate_path);
    let overrides_impl = generate_overrides(&fields, &crate_path);

    Ok(quote! {
        impl #impl_generics #crate_path::Record for #name #ty_generics #where_clause {
            #schema_impl
            #overrides_impl
        }

        impl #impl_generics #crate_path::Described for #name #ty_generics #where_clause {
            fn descriptor() -> #crate_path::TypeDescriptor {
                #crate_path::TypeDescriptor::structured(#record_name)
            }
        }
    })
}

fn build_where_clause(
    generics: &syn::Generics,
    existing: Option<&syn::WhereClause>,
    crate_path: &proc_macro2::TokenStream,
) -> proc_macro2::TokenStream {
    let type_params: Vec<_> = generics.type_params().map(|p| &p.ident).collect();

    if type_params.is_empty() && existing.is_none() {
        return quote! {};
    }

    let described_bounds = type_params.iter().map(|p| {
        quote! { #p: #crate_path::Described }
    });

    let existing_predicates = existing
        .map(|w| {
            let predicates = &w.predicates;
            if predicates.empty_or_trailing() {
                quote! { #predicates }
            } else {
                quote! { #predicates, }
            }
        })
        .unwrap_or_default();

    quote! {
        where
            #existing_predicates
            #(#described_bounds),*
    }
}

fn generate_overrides(
    fields: &[schema::RecordField<'_>],
    crate_path: &proc_macro2::TokenStream,
) -> proc_macro2::TokenStream {
    let inserts: Vec<_> = fields
        .iter()
        .flat_map(|field| {
            let name = &field.name;
            let attrs = &field.attrs;
            [
                (attrs.json, quote! { json_fields }),
                (attrs.array, quote! { array_fields }),
                (attrs.vector, quote! { vector_fields }),
                (attrs.date, quote! { date_fields }),
            ]
            .into_iter()
            .filter(|(set, _)| *set)
            .map(move |(_, set)| quote! { overrides.#set.insert(::std::string::String::from(#name)); })
        })
        .collect();

    if inserts.is_empty() {
        return quote! {};
    }

    quote! {
        fn overrides() -> #crate_path::FieldOverrides {
            let mut overrides = #crate_path::FieldOverrides::default();
            #(#inserts)*
            overrides
        }
    }
}

struct ContainerAttrs {
    crate_path: proc_macro2::TokenStream,
}

fn parse_container_attrs(attrs: &[syn::Attribute]) -> syn::Result<ContainerAttrs> {
    let mut crate_path = quote! { ::siloxane_core };

    for attr in attrs {
        if !attr.path().is_ident("siloxane") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate") {
                let value: syn::LitStr = meta.value()?.parse()?;
                let path: syn::Path = value.parse()?;
                crate_path = quote! { #path };
                Ok(())
            } else {
                Err(meta.error("unsupported siloxane container attribute"))
            }
        })?;
    }

    Ok(ContainerAttrs { crate_path })
}

#[derive(Default)]
pub(crate) struct FieldAttrs {
    pub skip: bool,
    pub rename: Option<String>,
    pub json: bool,
    pub array: bool,
    pub vector: bool,
    pub date: bool,
}

pub(crate) fn parse_field_attrs(attrs: &[syn::Attribute]) -> syn::Result<FieldAttrs> {
    let mut result = FieldAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("siloxane") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                result.skip = true;
            } else if meta.path.is_ident("rename") {
                let value: syn::LitStr = meta.value()?.parse()?;
                result.rename = Some(value.value());
            } else if meta.path.is_ident("json") {
                result.json = true;
            } else if meta.path.is_ident("array") {
                result.array = true;
            } else if meta.path.is_ident("vector") {
                result.vector = true;
            } else if meta.path.is_ident("date") {
                result.date = true;
            } else {
                return Err(meta.error("unsupported siloxane field attribute"));
            }
            Ok(())
        })?;
    }

    Ok(result)
}
