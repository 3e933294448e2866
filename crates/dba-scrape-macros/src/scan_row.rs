//! Derivation of the `ScanRow` trait.

use std::fmt;

use proc_macro::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Field, Fields, Ident, LitStr, Path};

use crate::utils::{scan_attribute, validate_label_name, ParseAttribute};

/// Struct-level `#[scan(..)]` attributes.
#[derive(Default)]
struct ScanRowAttrs {
    cr: Option<Path>,
}

impl fmt::Debug for ScanRowAttrs {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ScanRowAttrs")
            .field("cr", &self.cr.as_ref().map(|_| "_"))
            .finish()
    }
}

impl ParseAttribute for ScanRowAttrs {
    fn parse(raw: &Attribute) -> syn::Result<Self> {
        let mut attrs = Self::default();
        raw.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate") {
                attrs.cr = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("unsupported attribute"))
            }
        })?;
        Ok(attrs)
    }
}

#[derive(Debug, Default)]
struct ScanFieldAttrs {
    is_value: bool,
    skip: bool,
    rename: Option<LitStr>,
}

impl ParseAttribute for ScanFieldAttrs {
    fn parse(raw: &Attribute) -> syn::Result<Self> {
        let mut attrs = Self::default();
        raw.parse_nested_meta(|meta| {
            if meta.path.is_ident("value") {
                attrs.is_value = true;
                Ok(())
            } else if meta.path.is_ident("skip") {
                attrs.skip = true;
                Ok(())
            } else if meta.path.is_ident("rename") {
                attrs.rename = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("unsupported attribute"))
            }
        })?;

        if attrs.is_value && attrs.skip {
            let message = "`value` and `skip` attributes are mutually exclusive";
            return Err(syn::Error::new_spanned(raw, message));
        }
        if attrs.rename.is_some() && (attrs.is_value || attrs.skip) {
            let message = "`rename` can only be used on label fields";
            return Err(syn::Error::new_spanned(raw, message));
        }
        Ok(attrs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldRole {
    Label,
    Value,
    Skipped,
}

#[derive(Debug)]
struct ScanField {
    name: Ident,
    role: FieldRole,
    label: Option<LitStr>,
}

impl ScanField {
    fn parse(raw: &Field) -> syn::Result<Self> {
        let name = raw.ident.clone().ok_or_else(|| {
            let message = "Only named fields are supported";
            syn::Error::new_spanned(raw, message)
        })?;
        let attrs: ScanFieldAttrs = scan_attribute(&raw.attrs)?;

        let role = if attrs.is_value {
            FieldRole::Value
        } else if attrs.skip {
            FieldRole::Skipped
        } else {
            FieldRole::Label
        };

        let label = if role == FieldRole::Label {
            let label = attrs
                .rename
                .unwrap_or_else(|| LitStr::new(&name.to_string(), name.span()));
            validate_label_name(&label.value())
                .map_err(|message| syn::Error::new(label.span(), message))?;
            Some(label)
        } else {
            None
        };

        Ok(Self { name, role, label })
    }
}

#[derive(Debug)]
struct ScanRowImpl {
    attrs: ScanRowAttrs,
    name: Ident,
    fields: Vec<ScanField>,
}

impl ScanRowImpl {
    fn new(raw: &DeriveInput) -> syn::Result<Self> {
        let Data::Struct(data) = &raw.data else {
            let message = "`ScanRow` can only be derived on structs";
            return Err(syn::Error::new_spanned(raw, message));
        };
        let Fields::Named(fields) = &data.fields else {
            let message = "`ScanRow` can only be derived on structs with named fields";
            return Err(syn::Error::new_spanned(raw, message));
        };
        if !raw.generics.params.is_empty() {
            let message = "Generics are not supported";
            return Err(syn::Error::new_spanned(&raw.generics, message));
        }

        let fields: Vec<_> = fields
            .named
            .iter()
            .map(ScanField::parse)
            .collect::<syn::Result<_>>()?;
        let mut value_fields = fields.iter().filter(|field| field.role == FieldRole::Value);
        if let (Some(_), Some(extra)) = (value_fields.next(), value_fields.next()) {
            let message = "At most one field can be marked with `#[scan(value)]`";
            return Err(syn::Error::new(extra.name.span(), message));
        }

        let mut seen_labels = Vec::with_capacity(fields.len());
        for label in fields.iter().filter_map(|field| field.label.as_ref()) {
            let label_value = label.value();
            if seen_labels.contains(&label_value) {
                let message = "Duplicate label name";
                return Err(syn::Error::new(label.span(), message));
            }
            seen_labels.push(label_value);
        }

        Ok(Self {
            attrs: scan_attribute(&raw.attrs)?,
            name: raw.ident.clone(),
            fields,
        })
    }

    fn impl_scan_row(&self) -> proc_macro2::TokenStream {
        let cr = if let Some(cr) = &self.attrs.cr {
            quote!(#cr)
        } else {
            quote!(dba_scrape)
        };
        let name = &self.name;
        let column_count = self.fields.len();

        let labels = self.fields.iter().filter_map(|field| field.label.as_ref());
        let scanned_fields = self.fields.iter().enumerate().map(|(idx, field)| {
            let field_name = &field.name;
            quote!(#field_name: #cr::Row::column(row, #idx)?)
        });
        let label_values = self
            .fields
            .iter()
            .filter(|field| field.role == FieldRole::Label)
            .map(|field| {
                let field_name = &field.name;
                quote!(#cr::LabelValue::to_label_value(&self.#field_name))
            });
        let value = self
            .fields
            .iter()
            .find(|field| field.role == FieldRole::Value)
            .map_or_else(
                || quote!(0.0),
                |field| {
                    let field_name = &field.name;
                    quote!(#cr::SampleValue::to_sample_value(&self.#field_name))
                },
            );

        quote! {
            impl #cr::ScanRow for #name {
                const LABELS: &'static [&'static str] = &[#(#labels,)*];
                const COLUMNS: usize = #column_count;

                fn scan(row: &#cr::Row) -> core::result::Result<Self, #cr::ScanError> {
                    row.expect_columns(#column_count)?;
                    core::result::Result::Ok(Self {
                        #(#scanned_fields,)*
                    })
                }

                fn into_observation(self) -> #cr::Observation {
                    let label_values = std::vec![#(#label_values,)*];
                    #cr::Observation::new(label_values, #value)
                }
            }
        }
    }
}

pub(crate) fn impl_scan_row(input: TokenStream) -> TokenStream {
    let input: DeriveInput = match syn::parse(input) {
        Ok(input) => input,
        Err(err) => return err.into_compile_error().into(),
    };
    let trait_impl = match ScanRowImpl::new(&input) {
        Ok(trait_impl) => trait_impl,
        Err(err) => return err.into_compile_error().into(),
    };
    trait_impl.impl_scan_row().into()
}
