pub mod math;
pub mod url_utils;

pub use url_utils::{ absolute_url, resource_base, resolve_reference };
