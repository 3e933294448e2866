//! Procedural macros for the `dba-scrape` crate.

#![recursion_limit = "128"]

extern crate proc_macro;

use proc_macro::TokenStream;

mod scan_row;
mod utils;

#[proc_macro_derive(ScanRow, attributes(scan))]
pub fn scan_row(input: TokenStream) -> TokenStream {
    scan_row::impl_scan_row(input)
}
