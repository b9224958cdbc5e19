// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

/// Derives the conversions an RPC error enum needs to round-trip through
/// Idol's `RequestError<E>` wire encoding: `From<E> for u16`, `From<E> for
/// u32`, and `TryFrom<u32> for E`.
///
/// The enum must also derive `FromPrimitive` (used by the `TryFrom<u32>`
/// impl below) and must not use the discriminant `0`, which the IPC
/// transport reserves to mean "success."
#[proc_macro_derive(IdolError)]
pub fn derive(input: TokenStream) -> TokenStream {
    let DeriveInput { ident, data, .. } = parse_macro_input!(input);

    let data = match data {
        syn::Data::Enum(data) => data,
        _ => panic!("IdolError can only be derived on enums"),
    };

    let nonzero_checks = data.variants.into_iter().map(|variant| {
        let v = variant.ident;
        quote! {
            const _: [(); 0 - !{
                const IS_NONZERO: bool = #ident::#v as u32 != 0;
                IS_NONZERO
            } as usize] = [];
        }
    });

    quote! {
        #( #nonzero_checks )*

        impl From<#ident> for u16 {
            fn from(v: #ident) -> Self {
                v as u16
            }
        }

        impl From<#ident> for u32 {
            fn from(v: #ident) -> Self {
                v as u32
            }
        }

        impl core::convert::TryFrom<u32> for #ident {
            type Error = ();
            fn try_from(v: u32) -> Result<Self, Self::Error> {
                Self::from_u32(v).ok_or(())
            }
        }
    }
    .into()
}
