//! Procedural macros for busway.
//!
//! - [`macro@bus`]: declare a bus definition on a marker struct.

use proc_macro::TokenStream;
use quote::quote;
use syn::{
    Ident, ItemStruct, LitStr, Token, Type,
    parse::{Parse, ParseStream},
    parse_macro_input,
};

/// Implement `busway::BusTraits` for a marker struct.
///
/// # Arguments
///
/// - `interface = dyn Trait` (required): the handler interface
/// - `id = Type`: the address id, `()` when omitted
/// - `address = single | by_id`: addressing policy, `single` when omitted
/// - `handlers = single | multiple`: handlers per address, `multiple` when omitted
/// - `name = "..."`: signature used in logs, the type name when omitted
///
/// # Example
///
/// ```rust,ignore
/// pub trait DoorEvents: Send + Sync {
///     fn on_open(&self);
/// }
///
/// #[busway::bus(interface = dyn DoorEvents, id = u32, address = by_id, handlers = single)]
/// pub struct DoorBus;
/// ```
#[proc_macro_attribute]
pub fn bus(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as BusArgs);
    let input = parse_macro_input!(item as ItemStruct);

    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Some(interface) = args.interface else {
        return syn::Error::new_spanned(
            &input.ident,
            "bus definition needs an interface: #[bus(interface = dyn Trait)]",
        )
        .to_compile_error()
        .into();
    };

    let id = match (&args.id, &args.address) {
        (Some(id), _) => quote! { #id },
        (None, Some(AddressArg::ById(span))) => {
            return syn::Error::new(*span, "addressed buses need an id type: id = Type")
                .to_compile_error()
                .into();
        }
        (None, _) => quote! { () },
    };

    let address_policy = match args.address {
        Some(AddressArg::ById(_)) => quote! {
            const ADDRESS_POLICY: ::busway::AddressPolicy = ::busway::AddressPolicy::ById;
        },
        _ => quote! {},
    };

    let handler_policy = match args.handlers {
        Some(HandlersArg::Single) => quote! {
            const HANDLER_POLICY: ::busway::HandlerPolicy = ::busway::HandlerPolicy::Single;
        },
        _ => quote! {},
    };

    let name_fn = args.name.map(|name| {
        quote! {
            fn name() -> &'static str {
                #name
            }
        }
    });

    let expanded = quote! {
        #input

        impl #impl_generics ::busway::BusTraits for #struct_name #ty_generics #where_clause {
            type Interface = #interface;
            type Id = #id;
            #address_policy
            #handler_policy
            #name_fn
        }
    };

    TokenStream::from(expanded)
}

enum AddressArg {
    Single,
    ById(proc_macro2::Span),
}

enum HandlersArg {
    Single,
    Multiple,
}

struct BusArgs {
    interface: Option<Type>,
    id: Option<Type>,
    address: Option<AddressArg>,
    handlers: Option<HandlersArg>,
    name: Option<LitStr>,
}

impl Parse for BusArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut interface = None;
        let mut id = None;
        let mut address = None;
        let mut handlers = None;
        let mut name = None;

        while !input.is_empty() {
            let ident: Ident = input.parse()?;
            input.parse::<Token![=]>()?;

            match ident.to_string().as_str() {
                "interface" => {
                    interface = Some(input.parse::<Type>()?);
                }
                "id" => {
                    id = Some(input.parse::<Type>()?);
                }
                "address" => {
                    let value: Ident = input.parse()?;
                    address = Some(match value.to_string().as_str() {
                        "single" => AddressArg::Single,
                        "by_id" => AddressArg::ById(value.span()),
                        other => {
                            return Err(syn::Error::new(
                                value.span(),
                                format!("unknown address policy `{}`, expected `single` or `by_id`", other),
                            ));
                        }
                    });
                }
                "handlers" => {
                    let value: Ident = input.parse()?;
                    handlers = Some(match value.to_string().as_str() {
                        "single" => HandlersArg::Single,
                        "multiple" => HandlersArg::Multiple,
                        other => {
                            return Err(syn::Error::new(
                                value.span(),
                                format!("unknown handler policy `{}`, expected `single` or `multiple`", other),
                            ));
                        }
                    });
                }
                "name" => {
                    name = Some(input.parse::<LitStr>()?);
                }
                other => {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!("unknown attribute: {}", other),
                    ));
                }
            }

            if input.peek(Token![,]) {
                input.parse::<Token![,]>()?;
            }
        }

        Ok(BusArgs {
            interface,
            id,
            address,
            handlers,
            name,
        })
    }
}
