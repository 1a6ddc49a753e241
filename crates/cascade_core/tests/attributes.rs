//! Integration tests for attribute stores inside cascades.

use cascade_core::{value_columns, LoadState};
use cascade_store::{Connection, Operation, Row};
use cascade_testkit::prelude::*;
use cascade_value::Value;

fn rows_for(shop: &Shop, attribute_id: i64) -> Vec<Row> {
    shop.rows("attribute_values")
        .into_iter()
        .filter(|row| row.get(value_columns::ATTRIBUTE_ID) == Some(&Value::Integer(attribute_id)))
        .collect()
}

fn store_value(shop: &Shop, object_id: i64, attribute_id: i64, raw: &str) {
    let mut row = Row::new();
    row.insert(value_columns::ENTITY_TYPE_ID.into(), Value::Integer(ORDER_ENTITY_TYPE_ID));
    row.insert(value_columns::OBJECT_ID.into(), Value::Integer(object_id));
    row.insert(value_columns::ATTRIBUTE_ID.into(), Value::Integer(attribute_id));
    row.insert(value_columns::VALUE.into(), Value::from(raw));
    shop.conn.insert("attribute_values", &row).unwrap();
}

#[test]
fn new_order_passes_its_key_to_attributes() {
    let shop = Shop::with_actor("ada");
    let mut order = shop.new_entity(ORDER).unwrap();
    order.set("note", "web order").unwrap();
    let extra = order.attributes_mut("extra").unwrap();
    extra.set("channel", "web").unwrap();
    assert_eq!(extra.state(), LoadState::NewPrepared);

    assert!(order.save_all().unwrap());

    let id = order.get("id").unwrap();
    let extra = order.attributes("extra").unwrap();
    assert_eq!(extra.object_id(), Some(&id));
    assert!(!extra.has_changes());
    let channel = rows_for(&shop, 2);
    assert_eq!(channel.len(), 1);
    assert_eq!(channel[0].get(value_columns::OBJECT_ID), Some(&id));
    assert_eq!(rows_for(&shop, 5)[0].get(value_columns::VALUE), Some(&Value::from("ada")));
    assert_eq!(rows_for(&shop, 4).len(), 1);
    assert_eq!(rows_for(&shop, 6).len(), 1);
}

#[test]
fn default_value_is_stored_as_absent_row() {
    let shop = Shop::new();
    let mut order = shop.new_entity(ORDER).unwrap();
    order.set("note", "x").unwrap();
    order.attributes_mut("extra").unwrap().set("priority", 7i64).unwrap();
    order.save_all().unwrap();

    let priority = rows_for(&shop, 1);
    assert_eq!(priority.len(), 1);
    assert_eq!(priority[0].get(value_columns::VALUE), Some(&Value::from("7")));

    order.attributes_mut("extra").unwrap().set("priority", 3i64).unwrap();
    assert!(order.save_all().unwrap());
    assert!(rows_for(&shop, 1).is_empty());

    let id = order.get("id").unwrap();
    let mut reopened = shop.attributes(ORDER_ATTRIBUTES, Some(id)).unwrap();
    assert_eq!(reopened.get("priority").unwrap(), Value::Integer(3));
}

#[test]
fn created_stamps_are_written_once() {
    let shop = Shop::new();
    let mut order = shop.new_entity(ORDER).unwrap();
    order.set("note", "x").unwrap();
    order.attributes_mut("extra").unwrap().set("channel", "web").unwrap();
    order.save_all().unwrap();
    let created = rows_for(&shop, 4)[0].get(value_columns::VALUE).cloned();

    order.attributes_mut("extra").unwrap().set("channel", "phone").unwrap();
    order.save_all().unwrap();

    assert_eq!(rows_for(&shop, 4).len(), 1);
    assert_eq!(rows_for(&shop, 4)[0].get(value_columns::VALUE).cloned(), created);
    assert_eq!(rows_for(&shop, 6).len(), 1);
}

#[test]
fn lazy_attribute_reads_like_any_other() {
    let shop = Shop::new();
    store_value(&shop, 41, 3, "fragile");
    store_value(&shop, 41, 2, "mail");

    let mut extra = shop.attributes(ORDER_ATTRIBUTES, Some(Value::Integer(41))).unwrap();
    assert_eq!(extra.get("channel").unwrap(), Value::from("mail"));
    assert!(extra.lazy_attributes().contains("notes"));

    assert_eq!(extra.get("notes").unwrap(), Value::from("fragile"));
    assert!(!extra.tracker().is_field_dirty("notes"));
    assert!(!extra.has_changes());
}

#[test]
fn lazy_attribute_without_row_has_its_default() {
    let shop = Shop::new();
    let mut extra = shop.attributes(ORDER_ATTRIBUTES, Some(Value::Integer(41))).unwrap();
    assert_eq!(extra.get("notes").unwrap(), Value::Null);
    assert!(extra.lazy_attributes().is_empty());
}

#[test]
fn attribute_failure_rolls_back_the_order() {
    let shop = Shop::new();
    let mut order = shop.new_entity(ORDER).unwrap();
    order.set("note", "x").unwrap();
    order.attributes_mut("extra").unwrap().set("channel", "web").unwrap();
    shop.conn.fail_next(Operation::Insert, Some("attribute_values"));

    assert!(!order.save_all().unwrap());

    assert!(order.is_new());
    assert!(shop.rows("orders").is_empty());
    let extra = order.attributes("extra").unwrap();
    assert_eq!(extra.object_id(), None);
    assert!(extra.tracker().is_field_dirty("channel"));
    assert_eq!(order.errors()[0].source, ORDER_ATTRIBUTES);
}

#[test]
fn loaded_order_reads_its_attributes() {
    let shop = Shop::new();
    let mut order = shop.new_entity(ORDER).unwrap();
    order.set("note", "x").unwrap();
    order.attributes_mut("extra").unwrap().set("channel", "web").unwrap();
    order.save_all().unwrap();
    let id = order.get("id").unwrap();

    let mut found = shop.find(ORDER, id).unwrap().unwrap();
    let extra = found.attributes_mut("extra").unwrap();
    assert_eq!(extra.get("channel").unwrap(), Value::from("web"));
    assert_eq!(extra.state(), LoadState::Loaded);
}
