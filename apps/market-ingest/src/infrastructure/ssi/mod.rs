//! Alternate Upstream Source
//!
//! Symbol lists and chart history from the second broker. Its history
//! endpoint carries prices as strings and serves only one-minute and daily
//! bars. It has no snapshot endpoint.

mod rest;

pub use rest::{SsiEndpoints, SsiRestCrawler};
