//! Attribute parsing and label name checks for `ScanRow` derivation.

use syn::Attribute;

/// Container or field settings collected from a `#[scan(..)]` attribute.
pub(crate) trait ParseAttribute: Sized {
    fn parse(raw: &Attribute) -> syn::Result<Self>;
}

/// Parses the first `#[scan(..)]` attribute, falling back to defaults if there is none.
pub(crate) fn scan_attribute<T>(raw_attrs: &[Attribute]) -> syn::Result<T>
where
    T: ParseAttribute + Default,
{
    match raw_attrs.iter().find(|attr| attr.path().is_ident("scan")) {
        Some(attr) => T::parse(attr),
        None => Ok(T::default()),
    }
}

/// Checks a label name against `[a-z_][a-z0-9_]*`, rejecting reserved `__` names.
/// Mirrors the runtime check performed by `MetricDescriptor::new()`.
pub(crate) fn validate_label_name(label: &str) -> Result<(), &'static str> {
    let mut chars = label.chars();
    let Some(first) = chars.next() else {
        return Err("label name cannot be empty");
    };
    if first != '_' && !first.is_ascii_lowercase() {
        return Err("label name must start with `_` or a lower-case ASCII letter");
    }
    if !chars.all(|ch| ch == '_' || ch.is_ascii_lowercase() || ch.is_ascii_digit()) {
        return Err("label name may only contain lower-case ASCII letters, digits and `_`");
    }
    if label.starts_with("__") {
        return Err("label names starting with `__` are reserved");
    }
    Ok(())
}
