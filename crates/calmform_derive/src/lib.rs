use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::{format_ident, quote};
use syn::{Attribute, Data, DeriveInput, Fields, LitStr, Token, parse_macro_input};

#[proc_macro_derive(FormModel, attributes(serde))]
pub fn derive_form_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(error) => error.to_compile_error().into(),
    }
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.ident,
            "FormModel derive currently supports only non-generic structs",
        ));
    }

    let container = SerdeAttrs::parse(&input.attrs)?;
    let model_ident = input.ident;
    let fields_struct_ident = format_ident!("{model_ident}Fields");

    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return Err(syn::Error::new(
                    Span::call_site(),
                    "FormModel derive requires a struct with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new(
                Span::call_site(),
                "FormModel derive is only supported on structs",
            ));
        }
    };

    let calmform = calmform_path();
    let mut lens_defs = Vec::new();
    let mut fields_methods = Vec::new();

    for field in named_fields {
        let Some(field_ident) = field.ident else {
            continue;
        };
        let attrs = SerdeAttrs::parse(&field.attrs)?;
        if attrs.skip {
            continue;
        }
        let field_ty = field.ty;
        let rust_name = field_ident.to_string();
        let rust_name = rust_name.strip_prefix("r#").unwrap_or(&rust_name).to_string();
        let wire_name = match attrs.rename {
            Some(rename) => rename,
            None => container.rename_all.as_deref().map_or_else(
                || Ok(rust_name.clone()),
                |rule| rename_field(&rust_name, rule),
            )?,
        };
        let lens_ident = format_ident!("{model_ident}{}Lens", to_pascal_case(&rust_name));

        lens_defs.push(quote! {
            #[derive(Clone, Copy, Debug, Default)]
            pub struct #lens_ident;

            impl #calmform::lens::FieldLens for #lens_ident {
                type Model = #model_ident;
                type Value = #field_ty;

                fn name(self) -> &'static str {
                    #wire_name
                }
            }

            impl #calmform::path::IntoFieldPath for #lens_ident {
                fn into_field_path(
                    self,
                ) -> #calmform::controller::FormResult<#calmform::path::FieldPath> {
                    #calmform::path::FieldPath::from_segments(::std::vec![
                        #calmform::path::PathSegment::Key(::std::string::String::from(#wire_name)),
                    ])
                }
            }
        });

        fields_methods.push(quote! {
            pub const fn #field_ident(&self) -> #lens_ident {
                #lens_ident
            }
        });
    }

    Ok(quote! {
        #[derive(Clone, Copy, Debug, Default)]
        pub struct #fields_struct_ident;

        impl #fields_struct_ident {
            #(#fields_methods)*
        }

        impl #calmform::lens::FormModel for #model_ident {
            type Fields = #fields_struct_ident;

            fn fields() -> Self::Fields {
                #fields_struct_ident
            }
        }

        #(#lens_defs)*
    })
}

#[derive(Default)]
struct SerdeAttrs {
    rename: Option<String>,
    rename_all: Option<String>,
    skip: bool,
}

impl SerdeAttrs {
    fn parse(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut parsed = SerdeAttrs::default();
        for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") && meta.input.peek(Token![=]) {
                    let value: LitStr = meta.value()?.parse()?;
                    parsed.rename = Some(value.value());
                } else if meta.path.is_ident("rename_all") && meta.input.peek(Token![=]) {
                    let value: LitStr = meta.value()?.parse()?;
                    parsed.rename_all = Some(value.value());
                } else if meta.path.is_ident("skip") {
                    parsed.skip = true;
                } else if meta.input.peek(Token![=]) {
                    let _: syn::Expr = meta.value()?.parse()?;
                } else if meta.input.peek(syn::token::Paren) {
                    let content;
                    syn::parenthesized!(content in meta.input);
                    let _: TokenStream2 = content.parse()?;
                }
                Ok(())
            })?;
        }
        Ok(parsed)
    }
}

fn calmform_path() -> TokenStream2 {
    match crate_name("calmform") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) => quote!(crate),
        Err(_) => quote!(::calmform),
    }
}

fn words(input: &str) -> impl Iterator<Item = &str> {
    input.split('_').filter(|segment| !segment.is_empty())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn rename_field(name: &str, rule: &str) -> syn::Result<String> {
    Ok(match rule {
        "lowercase" | "snake_case" => name.to_string(),
        "UPPERCASE" | "SCREAMING_SNAKE_CASE" => name.to_ascii_uppercase(),
        "PascalCase" => to_pascal_case(name),
        "camelCase" => {
            let pascal = to_pascal_case(name);
            let mut chars = pascal.chars();
            match chars.next() {
                Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        }
        "kebab-case" => words(name).collect::<Vec<_>>().join("-"),
        "SCREAMING-KEBAB-CASE" => words(name).collect::<Vec<_>>().join("-").to_ascii_uppercase(),
        other => {
            return Err(syn::Error::new(
                Span::call_site(),
                format!("FormModel derive does not understand rename_all = {other:?}"),
            ));
        }
    })
}

fn to_pascal_case(input: &str) -> String {
    words(input).map(capitalize).collect()
}
