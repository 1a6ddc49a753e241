//! Table and column schema descriptions.

use cascade_value::{DataType, Value};

/// Description of one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    /// Column name.
    pub name: String,
    /// Declared type.
    pub data_type: DataType,
    /// Whether NULL is accepted.
    pub nullable: bool,
    /// Maximum length for text columns.
    pub size: Option<usize>,
    /// Decimal scale for float columns.
    pub scale: Option<u32>,
    /// Default applied when a row is created without this column.
    pub default: Option<Value>,
    /// Part of the primary key.
    pub primary_key: bool,
    /// Value generated by the store on insert.
    pub auto_increment: bool,
}

impl ColumnSchema {
    /// Creates a nullable column without default.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            size: None,
            scale: None,
            default: None,
            primary_key: false,
            auto_increment: false,
        }
    }

    /// Creates an auto-increment integer primary key column.
    pub fn id(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Integer)
            .not_null()
            .primary_key()
            .auto_increment()
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the maximum text length.
    #[must_use]
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Sets the decimal scale.
    #[must_use]
    pub fn scale(mut self, scale: u32) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Marks the column as primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Marks the column as store-generated.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// True if a row may omit this column on insert.
    #[must_use]
    pub fn may_be_omitted(&self) -> bool {
        self.nullable || self.auto_increment || self.default.is_some()
    }
}

/// Description of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    name: String,
    columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Creates an empty table description.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, column: ColumnSchema) -> Self {
        self.columns.push(column);
        self
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns all columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column_named(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns true if the column exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column_named(name).is_some()
    }

    /// Returns the first primary key column.
    #[must_use]
    pub fn primary_key(&self) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.primary_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder() {
        let schema = TableSchema::new("orders")
            .column(ColumnSchema::id("id"))
            .column(ColumnSchema::new("note", DataType::Text).size(20))
            .column(ColumnSchema::new("status", DataType::Text).not_null().default_value("open"));

        assert_eq!(schema.name(), "orders");
        assert_eq!(schema.columns().len(), 3);
        assert_eq!(schema.primary_key().map(|c| c.name.as_str()), Some("id"));
        assert_eq!(schema.column_named("note").and_then(|c| c.size), Some(20));
        assert!(schema.column_named("status").unwrap().may_be_omitted());
        assert!(!schema.has_column("missing"));
    }
}
