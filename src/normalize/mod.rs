//! Response normalization
//!
//! Converts the library's camelCase payloads into snake_case and builds
//! strict domain records from them.

pub mod casing;
pub mod mapper;
pub mod numeric;

pub use casing::{convert_keys, to_alternate_casing, to_camel_case, to_snake_case, Casing};
pub use mapper::{map_keyed, map_record, map_records, Record};
