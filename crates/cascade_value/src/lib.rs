//! # Cascade Value
//!
//! Dynamic field values for Cascade.
//!
//! This crate provides:
//! - [`Value`], the dynamic value every column and attribute holds
//! - [`DataType`], the declared type of a column or attribute, with coercion
//! - [`TextEncoding`], the string form used by attribute value rows
//!
//! ## Usage
//!
//! ```
//! use cascade_value::{DataType, TextEncoding, Value};
//!
//! let enc = TextEncoding::default();
//! let raw = enc.encode(&Value::from("42"), DataType::Integer).unwrap();
//! assert_eq!(raw, "42");
//! assert_eq!(enc.decode(&raw, DataType::Integer).unwrap(), Value::Integer(42));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod data_type;
mod encoding;
mod error;
mod value;

pub use data_type::DataType;
pub use encoding::{TextEncoding, DEFAULT_NULL_TOKEN};
pub use error::{ValueError, ValueResult};
pub use value::Value;
