//! Test fixtures.
//!
//! A small shop: an `Order` has many `OrderLine`s (keys flow down), points
//! at one `Customer` (key flows up) and carries `order_attributes`.

use cascade_core::{
    AttributeDefinition, AttributeSetDef, Catalog, Config, EntityType, LinkType,
    RelationDescriptor, Session,
};
use cascade_store::{ColumnSchema, Connection, MemoryConnection, ResourceRegistry, TableSchema};
use cascade_value::{DataType, TextEncoding};
use std::sync::Arc;

/// Customer entity type name.
pub const CUSTOMER: &str = "Customer";
/// Order entity type name.
pub const ORDER: &str = "Order";
/// Order line entity type name.
pub const ORDER_LINE: &str = "OrderLine";
/// Attribute set of orders.
pub const ORDER_ATTRIBUTES: &str = "order_attributes";
/// Entity-type id of orders in the attribute tables.
pub const ORDER_ENTITY_TYPE_ID: i64 = 1;

/// Table layouts of the shop.
pub fn shop_tables() -> Vec<TableSchema> {
    vec![
        TableSchema::new("customers")
            .column(ColumnSchema::id("id"))
            .column(ColumnSchema::new("name", DataType::Text).not_null().size(40)),
        TableSchema::new("orders")
            .column(ColumnSchema::id("id"))
            .column(ColumnSchema::new("customer_id", DataType::Integer))
            .column(ColumnSchema::new("total", DataType::Float))
            .column(
                ColumnSchema::new("status", DataType::Text)
                    .not_null()
                    .default_value("open"),
            )
            .column(ColumnSchema::new("note", DataType::Text).size(20)),
        TableSchema::new("order_lines")
            .column(ColumnSchema::id("id"))
            .column(ColumnSchema::new("order_id", DataType::Integer).not_null())
            .column(ColumnSchema::new("sku", DataType::Text).size(16))
            .column(ColumnSchema::new("qty", DataType::Integer)),
        AttributeSetDef::definitions_schema("attribute_definitions"),
        AttributeSetDef::values_schema("attribute_values"),
    ]
}

/// Definitions of [`ORDER_ATTRIBUTES`].
pub fn order_attribute_definitions() -> Vec<AttributeDefinition> {
    vec![
        AttributeDefinition::new(1, "priority", DataType::Integer)
            .default_value(3i64)
            .delete_on_default(),
        AttributeDefinition::new(2, "channel", DataType::Text),
        AttributeDefinition::new(3, "notes", DataType::Text).lazy(),
        AttributeDefinition::new(4, "created_at", DataType::Timestamp),
        AttributeDefinition::new(5, "created_by", DataType::Text),
        AttributeDefinition::new(6, "modified_at", DataType::Timestamp),
        AttributeDefinition::new(7, "modified_by", DataType::Text),
    ]
}

/// Entity types and attribute sets of the shop.
pub fn shop_catalog() -> Catalog {
    Catalog::new()
        .with_entity(EntityType::new(CUSTOMER, "customers"))
        .with_entity(
            EntityType::new(ORDER, "orders")
                .relation(
                    RelationDescriptor::has_many("lines", ORDER_LINE)
                        .link("id", "order_id")
                        .link_type(LinkType::FROM_PARENT_MAINT)
                        .cascade(),
                )
                .relation(
                    RelationDescriptor::has_one("customer", CUSTOMER)
                        .link("customer_id", "id")
                        .link_type(LinkType::FROM_CHILD)
                        .cascade_save(true),
                )
                .relation(RelationDescriptor::attributes("extra", ORDER_ATTRIBUTES)),
        )
        .with_entity(EntityType::new(ORDER_LINE, "order_lines"))
        .with_attributes(AttributeSetDef::new(ORDER_ATTRIBUTES).entity_type_id(ORDER_ENTITY_TYPE_ID))
}

/// Creates a connection with the shop tables and attribute definitions.
///
/// # Panics
///
/// Panics if seeding the definitions fails.
pub fn shop_connection() -> Arc<MemoryConnection> {
    let conn = Arc::new(MemoryConnection::new());
    for table in shop_tables() {
        conn.create_table(table);
    }
    let encoding = TextEncoding::default();
    for definition in order_attribute_definitions() {
        let row = definition
            .to_row(ORDER_ENTITY_TYPE_ID, &encoding)
            .expect("definition row");
        conn.insert("attribute_definitions", &row)
            .expect("seed attribute definition");
    }
    conn
}

/// A session on a fresh shop connection.
pub struct Shop {
    /// The session.
    pub session: Session,
    /// The connection behind the `default` resource.
    pub conn: Arc<MemoryConnection>,
}

impl Shop {
    /// Creates a shop with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a shop with `config`.
    pub fn with_config(config: Config) -> Self {
        Self::build(config, None)
    }

    /// Creates a shop whose session acts as `actor`.
    pub fn with_actor(actor: &str) -> Self {
        Self::build(Config::default(), Some(actor))
    }

    fn build(config: Config, actor: Option<&str>) -> Self {
        let conn = shop_connection();
        let registry = ResourceRegistry::new().with("default", conn.clone());
        let mut builder = Session::builder(registry, shop_catalog()).config(config);
        if let Some(actor) = actor {
            builder = builder.actor(actor);
        }
        Self {
            session: builder.build(),
            conn,
        }
    }

    /// Returns the stored rows of `table`.
    pub fn rows(&self, table: &str) -> Vec<cascade_store::Row> {
        self.conn.rows(table)
    }
}

impl Default for Shop {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for Shop {
    type Target = Session;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}
