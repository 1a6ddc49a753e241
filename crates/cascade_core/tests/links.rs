//! Integration tests for key propagation across link types.

use cascade_core::{Catalog, EntityNode, EntityType, LinkType, Pass, RelationDescriptor, Session};
use cascade_store::{ColumnSchema, MemoryConnection, Operation, ResourceRegistry, TableSchema};
use cascade_value::{DataType, Value};
use std::sync::Arc;

/// A `Head` owning one `Tail` through `link`, joined on `tail_id = id`.
/// Bidirectional links also join `id = head_id`.
fn pair(link: LinkType, tail_id_required: bool) -> (Session, Arc<MemoryConnection>) {
    let conn = Arc::new(MemoryConnection::new());
    let mut tail_id = ColumnSchema::new("tail_id", DataType::Integer);
    if tail_id_required {
        tail_id = tail_id.not_null();
    }
    conn.create_table(
        TableSchema::new("heads")
            .column(ColumnSchema::id("id"))
            .column(tail_id)
            .column(ColumnSchema::new("note", DataType::Text)),
    );
    conn.create_table(
        TableSchema::new("tails")
            .column(ColumnSchema::id("id"))
            .column(ColumnSchema::new("head_id", DataType::Integer))
            .column(ColumnSchema::new("label", DataType::Text)),
    );

    let mut relation = RelationDescriptor::has_one("tail", "Tail")
        .link("tail_id", "id")
        .link_type(link)
        .cascade_save(true);
    if link.rule(Pass::FromParent).is_some() {
        relation = relation.link("id", "head_id");
    }
    let catalog = Catalog::new()
        .with_entity(EntityType::new("Head", "heads").relation(relation))
        .with_entity(EntityType::new("Tail", "tails"));
    let registry = ResourceRegistry::new().with("default", conn.clone());
    (Session::builder(registry, catalog).build(), conn)
}

fn new_pair(session: &Session) -> EntityNode {
    let mut tail = session.new_entity("Tail").unwrap();
    tail.set("label", "t").unwrap();
    let mut head = session.new_entity("Head").unwrap();
    head.set("note", "h").unwrap();
    head.set_one("tail", tail).unwrap();
    head
}

fn stored(conn: &MemoryConnection, table: &str, column: &str) -> Value {
    conn.rows(table)[0].get(column).cloned().unwrap_or(Value::Null)
}

#[test]
fn bi_direct_links_both_new_records() {
    let (session, conn) = pair(LinkType::BI_DIRECT, false);
    let mut head = new_pair(&session);

    assert!(head.save_all().unwrap());

    let head_id = head.get("id").unwrap();
    let tail_id = head.one("tail").unwrap().get("id").unwrap();
    assert!(!head_id.is_null());
    assert_eq!(head.get("tail_id").unwrap(), tail_id);
    assert_eq!(head.one("tail").unwrap().get("head_id").unwrap(), head_id);
    assert_eq!(stored(&conn, "heads", "tail_id"), tail_id);
    assert_eq!(stored(&conn, "tails", "head_id"), head_id);
    assert!(!head.has_changes());
}

#[test]
fn bi_direct_copies_only_once() {
    let (session, conn) = pair(LinkType::BI_DIRECT, false);
    let mut head = new_pair(&session);
    head.save_all().unwrap();

    head.one_mut("tail").unwrap().set("head_id", 999i64).unwrap();
    assert!(head.save_all().unwrap());

    assert_eq!(stored(&conn, "tails", "head_id"), Value::Integer(999));
}

#[test]
fn maintained_parent_key_is_restored_on_every_save() {
    let (session, conn) = pair(LinkType::BI_DIRECT_MAINT_FROM_PARENT, false);
    let mut head = new_pair(&session);
    head.save_all().unwrap();
    let head_id = head.get("id").unwrap();

    head.set("note", "again").unwrap();
    head.one_mut("tail").unwrap().set("head_id", 999i64).unwrap();
    assert!(head.save_all().unwrap());

    assert_eq!(head.one("tail").unwrap().get("head_id").unwrap(), head_id);
    assert_eq!(stored(&conn, "tails", "head_id"), head_id);
}

#[test]
fn maintained_child_key_is_restored_on_every_save() {
    for link in [LinkType::FROM_CHILD_MAINT, LinkType::BI_DIRECT_MAINT_FROM_CHILD] {
        let (session, conn) = pair(link, false);
        let mut head = new_pair(&session);
        head.save_all().unwrap();
        let tail_id = head.one("tail").unwrap().get("id").unwrap();

        head.set("tail_id", 999i64).unwrap();
        head.set("note", "again").unwrap();
        assert!(head.save_all().unwrap());

        assert_eq!(head.get("tail_id").unwrap(), tail_id, "{link:?}");
        assert_eq!(stored(&conn, "heads", "tail_id"), tail_id, "{link:?}");
    }
}

#[test]
fn child_key_copied_once_keeps_later_edits() {
    let (session, conn) = pair(LinkType::FROM_CHILD, false);
    let mut head = new_pair(&session);
    head.save_all().unwrap();

    head.set("tail_id", 999i64).unwrap();
    assert!(head.save_all().unwrap());

    assert_eq!(stored(&conn, "heads", "tail_id"), Value::Integer(999));
}

#[test]
fn unwritten_child_leaves_parent_column_alone() {
    let (session, conn) = pair(LinkType::FROM_CHILD, false);
    let mut head = session.new_entity("Head").unwrap();
    head.set("tail_id", 5i64).unwrap();
    head.set_one("tail", session.new_entity("Tail").unwrap()).unwrap();

    assert!(head.save_all().unwrap());

    assert_eq!(head.get("tail_id").unwrap(), Value::Integer(5));
    assert_eq!(stored(&conn, "heads", "tail_id"), Value::Integer(5));
    assert!(conn.rows("tails").is_empty());
}

#[test]
fn read_only_child_leaves_parent_column_alone() {
    let (session, conn) = pair(LinkType::FROM_CHILD, false);
    let mut head = new_pair(&session);
    head.set("tail_id", 5i64).unwrap();
    head.one_mut("tail").unwrap().set_read_only(Some(true));

    assert!(head.save_all().unwrap());

    assert_eq!(head.warnings().len(), 1);
    assert_eq!(stored(&conn, "heads", "tail_id"), Value::Integer(5));
}

#[test]
fn required_column_filled_by_child_passes_validation() {
    let (session, conn) = pair(LinkType::FROM_CHILD, true);
    let mut head = new_pair(&session);

    assert!(head.save_all().unwrap(), "{:?}", head.errors());

    let tail_id = head.one("tail").unwrap().get("id").unwrap();
    assert_eq!(stored(&conn, "heads", "tail_id"), tail_id);
}

#[test]
fn required_column_without_child_still_fails() {
    let (session, conn) = pair(LinkType::FROM_CHILD, true);
    let mut head = session.new_entity("Head").unwrap();
    head.set("note", "alone").unwrap();

    assert!(!head.save_all().unwrap());

    assert_eq!(head.errors()[0].field.as_deref(), Some("tail_id"));
    assert!(conn.rows("heads").is_empty());
}

/// `Project` has many `Task`s, each task has many `Step`s.
fn three_levels() -> (Session, Arc<MemoryConnection>) {
    let conn = Arc::new(MemoryConnection::new());
    conn.create_table(
        TableSchema::new("projects")
            .column(ColumnSchema::id("id"))
            .column(ColumnSchema::new("name", DataType::Text)),
    );
    conn.create_table(
        TableSchema::new("tasks")
            .column(ColumnSchema::id("id"))
            .column(ColumnSchema::new("project_id", DataType::Integer).not_null())
            .column(ColumnSchema::new("title", DataType::Text)),
    );
    conn.create_table(
        TableSchema::new("steps")
            .column(ColumnSchema::id("id"))
            .column(ColumnSchema::new("task_id", DataType::Integer).not_null())
            .column(ColumnSchema::new("done", DataType::Boolean)),
    );
    let catalog = Catalog::new()
        .with_entity(
            EntityType::new("Project", "projects").relation(
                RelationDescriptor::has_many("tasks", "Task")
                    .link("id", "project_id")
                    .link_type(LinkType::FROM_PARENT)
                    .cascade(),
            ),
        )
        .with_entity(
            EntityType::new("Task", "tasks").relation(
                RelationDescriptor::has_many("steps", "Step")
                    .link("id", "task_id")
                    .link_type(LinkType::FROM_PARENT)
                    .cascade(),
            ),
        )
        .with_entity(EntityType::new("Step", "steps"));
    let registry = ResourceRegistry::new().with("default", conn.clone());
    (Session::builder(registry, catalog).build(), conn)
}

#[test]
fn failing_grandchild_restores_the_whole_graph() {
    let (session, conn) = three_levels();
    let mut project = session.new_entity("Project").unwrap();
    project.set("name", "launch").unwrap();
    for title in ["plan", "ship"] {
        let task = project.many_mut("tasks").unwrap().push_new().unwrap();
        task.set("title", title).unwrap();
        let steps = task.many_mut("steps").unwrap();
        steps.push_new().unwrap().set("done", false).unwrap();
        steps.push_new().unwrap().set("done", true).unwrap();
    }
    conn.fail_after(Operation::Insert, Some("steps"), 2);

    assert!(!project.save_all().unwrap());

    assert_eq!(project.errors().len(), 1);
    assert!(project.is_new());
    assert_eq!(project.get("id").unwrap(), Value::Null);
    assert!(project.is_field_dirty("name"));
    let tasks = project.many("tasks").unwrap();
    let keys: Vec<Value> = tasks.keys().cloned().collect();
    assert_eq!(keys, vec![Value::Integer(0), Value::Integer(1)]);
    for (_, task) in tasks.iter() {
        assert!(task.is_new());
        assert_eq!(task.get("project_id").unwrap(), Value::Null);
        assert!(task.is_field_dirty("title"));
        let steps = task.many("steps").unwrap();
        let keys: Vec<Value> = steps.keys().cloned().collect();
        assert_eq!(keys, vec![Value::Integer(0), Value::Integer(1)]);
        for (_, step) in steps.iter() {
            assert!(step.is_new());
            assert_eq!(step.get("task_id").unwrap(), Value::Null);
            assert!(step.is_field_dirty("done"));
        }
    }
    for table in ["projects", "tasks", "steps"] {
        assert!(conn.rows(table).is_empty(), "{table}");
    }

    assert!(project.save_all().unwrap());
    assert_eq!(conn.rows("steps").len(), 4);
    assert!(!project.has_changes());
}
