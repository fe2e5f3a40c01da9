use proc_macro::{Span, TokenStream};
use quote::quote;
use syn::punctuated::Punctuated;
use syn::{parse_macro_input, Data, DeriveInput, Field, Fields, LitStr, Token};

/// Struct-level options read from `#[gbnf(...)]`.
#[derive(Default)]
struct ContainerOptions {
    camel_case: bool,
}

/// Field-level options read from `#[gbnf(...)]`.
#[derive(Default)]
struct FieldOptions {
    one_of: Option<Vec<LitStr>>,
}

fn to_camel_case(snake: &str) -> String {
    let mut out = String::with_capacity(snake.len());
    let mut upper_next = false;

    for c in snake.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }

    out
}

fn container_options(input: &DeriveInput) -> syn::Result<ContainerOptions> {
    let mut opts = ContainerOptions::default();

    for attr in input.attrs.iter().filter(|a| a.path().is_ident("gbnf")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename_all") {
                let value: LitStr = meta.value()?.parse()?;
                match value.value().as_str() {
                    "camelCase" => opts.camel_case = true,
                    "snake_case" => opts.camel_case = false,
                    other => {
                        return Err(meta.error(format!("unsupported rename_all value: {}", other)))
                    }
                }
                Ok(())
            } else {
                Err(meta.error("unknown gbnf container attribute"))
            }
        })?;
    }

    Ok(opts)
}

fn field_options(field: &Field) -> syn::Result<FieldOptions> {
    let mut opts = FieldOptions::default();

    for attr in field.attrs.iter().filter(|a| a.path().is_ident("gbnf")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("one_of") {
                let content;
                syn::parenthesized!(content in meta.input);
                let values = Punctuated::<LitStr, Token![,]>::parse_terminated(&content)?;
                opts.one_of = Some(values.into_iter().collect());
                Ok(())
            } else {
                Err(meta.error("unknown gbnf field attribute"))
            }
        })?;
    }

    Ok(opts)
}

fn generate_gbnf(input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let struct_name = &input.ident;
    let struct_name_str = LitStr::new(&struct_name.to_string(), Span::call_site().into());
    let container = container_options(&input)?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    struct_name,
                    "Gbnf can only be derived for structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                struct_name,
                "Gbnf can only be derived for structs",
            ))
        }
    };

    let mut gbnf_fields = vec![];

    for field in fields {
        let ident = field
            .ident
            .as_ref()
            .ok_or_else(|| syn::Error::new_spanned(field, "field has no name"))?;

        let field_name = match container.camel_case {
            true => to_camel_case(&ident.to_string()),
            false => ident.to_string(),
        };

        let field_name_lit = LitStr::new(&field_name, Span::call_site().into());
        let field_type = &field.ty;

        let type_expr = match field_options(field)?.one_of {
            Some(values) => {
                // Token is scoped by struct and field so two limited
                // fields never collide in the deduplicated rule set.
                let token = format!("{}{}Value", struct_name, to_camel_case(&format!("_{}", ident)));
                let token_lit = LitStr::new(&token, Span::call_site().into());
                quote! {
                    ::gbnf::GbnfFieldType::Limited(::gbnf::GbnfLimited::new(#token_lit, &[#(#values),*]))
                }
            }
            None => quote! { <#field_type as ::gbnf::AsGbnf>::to_gbnf() },
        };

        gbnf_fields.push(quote! {
            ::gbnf::GbnfField {
                field_name: String::from(#field_name_lit),
                field_type: #type_expr,
            }
        });
    }

    Ok(quote! {
        impl #struct_name {
            pub fn to_grammar() -> &'static str {
                use std::sync::OnceLock;
                static GRAMMAR: OnceLock<String> = OnceLock::new();
                GRAMMAR.get_or_init(|| {
                    <Self as ::gbnf::AsGbnf>::to_gbnf().as_complex().to_grammar()
                })
            }
        }

        impl ::gbnf::AsGbnf for #struct_name {
            fn to_gbnf() -> ::gbnf::GbnfFieldType {
                ::gbnf::GbnfFieldType::Complex(::gbnf::GbnfComplex {
                    name: String::from(#struct_name_str),
                    fields: vec![#(#gbnf_fields),*],
                })
            }
        }
    })
}

/// Add the ability to convert a Rust type into a GBNF grammar.
#[proc_macro_derive(Gbnf, attributes(gbnf))]
pub fn gbnf(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match generate_gbnf(input) {
        Ok(code) => code.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
