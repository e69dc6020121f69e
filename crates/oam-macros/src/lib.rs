//! `#[derive(Merge)]`: generates a field-by-field [`Merge`][merge-trait]
//! implementation for override/patch-style structs, the way
//! `stackable-operator-derive` generates `Fragment`/`Merge` impls for
//! role/role-group configuration layering.
//!
//! [merge-trait]: https://docs.rs/oam-core/latest/oam_core/merge/trait.Merge.html

use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, parse_macro_input};

/// Derives `oam_render::merge::Merge` for a struct whose every field also
/// implements `Merge`. Each field is merged independently; there is no
/// struct-level default — an all-`None`/all-default struct merges to
/// whatever `defaults` provides, field by field.
#[proc_macro_derive(Merge)]
pub fn derive_merge(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Struct(data) = &input.data else {
        return syn::Error::new_spanned(&input, "#[derive(Merge)] only supports structs")
            .to_compile_error()
            .into();
    };

    let Fields::Named(fields) = &data.fields else {
        return syn::Error::new_spanned(
            &input,
            "#[derive(Merge)] requires named fields",
        )
        .to_compile_error()
        .into();
    };

    let merges = fields.named.iter().map(|field| {
        let name = field.ident.as_ref().expect("named field has an identifier");
        quote! {
            ::oam_core::merge::Merge::merge(&mut self.#name, &defaults.#name);
        }
    });

    let expanded = quote! {
        impl #impl_generics ::oam_core::merge::Merge for #ident #ty_generics #where_clause {
            fn merge(&mut self, defaults: &Self) {
                #(#merges)*
            }
        }
    };

    expanded.into()
}
