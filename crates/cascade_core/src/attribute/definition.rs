//! Attribute sets and attribute definitions.

use crate::entity::DEFAULT_RESOURCE;
use crate::error::{CoreError, CoreResult};
use crate::policy::MutabilityPolicy;
use cascade_store::{ColumnSchema, Row, TableSchema};
use cascade_value::{DataType, TextEncoding, Value};

/// Column names of the definitions table.
pub mod definition_columns {
    /// Attribute id.
    pub const ID: &str = "id";
    /// Owning entity type id.
    pub const ENTITY_TYPE_ID: &str = "entity_type_id";
    /// Attribute name.
    pub const NAME: &str = "name";
    /// Declared data type name.
    pub const DATA_TYPE: &str = "data_type";
    /// Encoded default value.
    pub const DEFAULT_VALUE: &str = "default_value";
    /// Whether null is accepted.
    pub const NULLABLE: &str = "nullable";
    /// Whether default values are stored as absent rows.
    pub const DELETE_ON_DEFAULT: &str = "delete_on_default";
    /// Whether loading is deferred to first access.
    pub const LAZY: &str = "lazy";
    /// Display order.
    pub const SORT_ORDER: &str = "sort_order";
}

/// Column names of the values table.
pub mod value_columns {
    /// Row id.
    pub const ID: &str = "id";
    /// Owning entity type id.
    pub const ENTITY_TYPE_ID: &str = "entity_type_id";
    /// Id of the object the value belongs to.
    pub const OBJECT_ID: &str = "object_id";
    /// Attribute id.
    pub const ATTRIBUTE_ID: &str = "attribute_id";
    /// Encoded value.
    pub const VALUE: &str = "value";
}

/// One attribute of an attribute set.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDefinition {
    /// Attribute id.
    pub id: i64,
    /// Attribute name.
    pub name: String,
    /// Declared type.
    pub data_type: DataType,
    /// Value an object has when no row exists.
    pub default: Value,
    /// Whether null is accepted.
    pub nullable: bool,
    /// Delete the value row instead of storing the default.
    pub delete_on_default: bool,
    /// Load on first access rather than with the other attributes.
    pub lazy: bool,
    /// Display order.
    pub sort_order: i64,
}

impl AttributeDefinition {
    /// Creates a nullable, eagerly loaded attribute with a null default.
    pub fn new(id: i64, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id,
            name: name.into(),
            data_type,
            default: Value::Null,
            nullable: true,
            delete_on_default: false,
            lazy: false,
            sort_order: id,
        }
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    /// Marks the attribute NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Stores default values as absent rows.
    #[must_use]
    pub fn delete_on_default(mut self) -> Self {
        self.delete_on_default = true;
        self
    }

    /// Defers loading to first access.
    #[must_use]
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Reads a definition from a definitions table row.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRow` for missing columns and a value error for an
    /// unknown data type or an undecodable default.
    pub fn from_row(row: &Row, table: &str, encoding: &TextEncoding) -> CoreResult<Self> {
        use definition_columns as col;

        let get = |column: &str| {
            row.get(column)
                .ok_or_else(|| CoreError::invalid_row(table, format!("missing column {column}")))
        };
        let id = get(col::ID)?
            .as_integer()
            .ok_or_else(|| CoreError::invalid_row(table, "attribute id is not an integer"))?;
        let name = get(col::NAME)?
            .as_text()
            .ok_or_else(|| CoreError::invalid_row(table, "attribute name is not text"))?
            .to_string();
        let data_type: DataType = get(col::DATA_TYPE)?
            .as_text()
            .unwrap_or("text")
            .parse()?;
        let default = match row.get(col::DEFAULT_VALUE).and_then(Value::as_text) {
            Some(raw) => encoding.decode(raw, data_type)?,
            None => Value::Null,
        };
        let flag = |column: &str, fallback: bool| {
            row.get(column).and_then(Value::as_bool).unwrap_or(fallback)
        };

        Ok(Self {
            id,
            name,
            data_type,
            default,
            nullable: flag(col::NULLABLE, true),
            delete_on_default: flag(col::DELETE_ON_DEFAULT, false),
            lazy: flag(col::LAZY, false),
            sort_order: row
                .get(col::SORT_ORDER)
                .and_then(Value::as_integer)
                .unwrap_or(id),
        })
    }

    /// Writes this definition as a definitions table row.
    ///
    /// # Errors
    ///
    /// Returns a value error if the default cannot be encoded.
    pub fn to_row(&self, entity_type_id: i64, encoding: &TextEncoding) -> CoreResult<Row> {
        use definition_columns as col;

        let mut row = Row::new();
        row.insert(col::ID.into(), Value::Integer(self.id));
        row.insert(col::ENTITY_TYPE_ID.into(), Value::Integer(entity_type_id));
        row.insert(col::NAME.into(), Value::from(self.name.as_str()));
        row.insert(col::DATA_TYPE.into(), Value::from(self.data_type.name()));
        row.insert(
            col::DEFAULT_VALUE.into(),
            Value::Text(encoding.encode(&self.default, self.data_type)?),
        );
        row.insert(col::NULLABLE.into(), Value::Bool(self.nullable));
        row.insert(col::DELETE_ON_DEFAULT.into(), Value::Bool(self.delete_on_default));
        row.insert(col::LAZY.into(), Value::Bool(self.lazy));
        row.insert(col::SORT_ORDER.into(), Value::Integer(self.sort_order));
        Ok(row)
    }
}

/// Where and for which entity type an attribute set is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSetDef {
    name: String,
    resource: String,
    definitions_table: String,
    values_table: String,
    entity_type_id: Option<i64>,
    policy: MutabilityPolicy,
}

impl AttributeSetDef {
    /// Declares a set stored in the default tables of the default resource.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource: DEFAULT_RESOURCE.to_string(),
            definitions_table: "attribute_definitions".to_string(),
            values_table: "attribute_values".to_string(),
            entity_type_id: None,
            policy: MutabilityPolicy::default(),
        }
    }

    /// Sets the entity-type id that keys definitions and values.
    #[must_use]
    pub fn entity_type_id(mut self, id: i64) -> Self {
        self.entity_type_id = Some(id);
        self
    }

    /// Sets the resource.
    #[must_use]
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    /// Sets the definitions table.
    #[must_use]
    pub fn definitions_table(mut self, table: impl Into<String>) -> Self {
        self.definitions_table = table.into();
        self
    }

    /// Sets the values table.
    #[must_use]
    pub fn values_table(mut self, table: impl Into<String>) -> Self {
        self.values_table = table.into();
        self
    }

    /// Makes stores of this set read-only unless overridden.
    #[must_use]
    pub fn read_only(mut self, value: bool) -> Self {
        self.policy.set_read_only(Some(value));
        self
    }

    /// Returns the set name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the resource name.
    #[must_use]
    pub fn resource_name(&self) -> &str {
        &self.resource
    }

    /// Returns the definitions table.
    #[must_use]
    pub fn definitions(&self) -> &str {
        &self.definitions_table
    }

    /// Returns the values table.
    #[must_use]
    pub fn values(&self) -> &str {
        &self.values_table
    }

    /// Returns the set-level policy.
    #[must_use]
    pub fn policy(&self) -> MutabilityPolicy {
        self.policy
    }

    /// Returns the entity-type id.
    ///
    /// # Errors
    ///
    /// Returns `MissingEntityTypeId` if none was configured.
    pub fn require_entity_type_id(&self) -> CoreResult<i64> {
        self.entity_type_id
            .ok_or_else(|| CoreError::missing_entity_type_id(&self.name))
    }

    /// Layout of a definitions table.
    #[must_use]
    pub fn definitions_schema(table: &str) -> TableSchema {
        use definition_columns as col;
        TableSchema::new(table)
            .column(ColumnSchema::id(col::ID))
            .column(ColumnSchema::new(col::ENTITY_TYPE_ID, DataType::Integer).not_null())
            .column(ColumnSchema::new(col::NAME, DataType::Text).not_null().size(64))
            .column(ColumnSchema::new(col::DATA_TYPE, DataType::Text).not_null())
            .column(ColumnSchema::new(col::DEFAULT_VALUE, DataType::Text))
            .column(ColumnSchema::new(col::NULLABLE, DataType::Boolean).default_value(true))
            .column(
                ColumnSchema::new(col::DELETE_ON_DEFAULT, DataType::Boolean).default_value(false),
            )
            .column(ColumnSchema::new(col::LAZY, DataType::Boolean).default_value(false))
            .column(ColumnSchema::new(col::SORT_ORDER, DataType::Integer).default_value(0i64))
    }

    /// Layout of a values table.
    #[must_use]
    pub fn values_schema(table: &str) -> TableSchema {
        use value_columns as col;
        TableSchema::new(table)
            .column(ColumnSchema::id(col::ID))
            .column(ColumnSchema::new(col::ENTITY_TYPE_ID, DataType::Integer).not_null())
            .column(ColumnSchema::new(col::OBJECT_ID, DataType::Integer).not_null())
            .column(ColumnSchema::new(col::ATTRIBUTE_ID, DataType::Integer).not_null())
            .column(ColumnSchema::new(col::VALUE, DataType::Text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_row_round_trip() {
        let enc = TextEncoding::default();
        let def = AttributeDefinition::new(7, "priority", DataType::Integer)
            .default_value(3i64)
            .delete_on_default()
            .lazy();

        let row = def.to_row(1, &enc).unwrap();
        assert_eq!(row.get("default_value"), Some(&Value::from("3")));
        let back = AttributeDefinition::from_row(&row, "attribute_definitions", &enc).unwrap();
        assert_eq!(back, def);
    }

    #[test]
    fn missing_columns_are_reported() {
        let enc = TextEncoding::default();
        let err = AttributeDefinition::from_row(&Row::new(), "defs", &enc).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRow { .. }));
    }

    #[test]
    fn unknown_data_type() {
        let enc = TextEncoding::default();
        let mut row = AttributeDefinition::new(1, "x", DataType::Text)
            .to_row(1, &enc)
            .unwrap();
        row.insert("data_type".into(), Value::from("geometry"));
        assert!(matches!(
            AttributeDefinition::from_row(&row, "defs", &enc),
            Err(CoreError::Value(_))
        ));
    }

    #[test]
    fn set_requires_entity_type_id() {
        let set = AttributeSetDef::new("order_attrs");
        assert!(matches!(
            set.require_entity_type_id(),
            Err(CoreError::MissingEntityTypeId { .. })
        ));
        assert_eq!(set.entity_type_id(4).require_entity_type_id().unwrap(), 4);
    }
}
