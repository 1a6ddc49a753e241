//! Error types for the value crate.

use thiserror::Error;

/// Result type for value operations.
pub type ValueResult<T> = Result<T, ValueError>;

/// Errors that can occur while coercing, encoding or decoding values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A value cannot be represented as the requested data type.
    #[error("cannot coerce {value} to {target}")]
    Coercion {
        /// Debug rendering of the offending value.
        value: String,
        /// Name of the target data type.
        target: &'static str,
    },

    /// Stored text could not be parsed as the declared data type.
    #[error("cannot parse {raw:?} as {target}")]
    Parse {
        /// The raw stored text.
        raw: String,
        /// Name of the target data type.
        target: &'static str,
    },

    /// A data type name is not recognised.
    #[error("unknown data type: {name}")]
    UnknownDataType {
        /// The unrecognised name.
        name: String,
    },
}

impl ValueError {
    /// Creates a coercion error.
    pub fn coercion(value: impl Into<String>, target: &'static str) -> Self {
        Self::Coercion {
            value: value.into(),
            target,
        }
    }

    /// Creates a parse error.
    pub fn parse(raw: impl Into<String>, target: &'static str) -> Self {
        Self::Parse {
            raw: raw.into(),
            target,
        }
    }

    /// Creates an unknown data type error.
    pub fn unknown_data_type(name: impl Into<String>) -> Self {
        Self::UnknownDataType { name: name.into() }
    }
}
