use chrono::{DateTime, Utc};

use crate::{FieldPath, Fields, Value};

/// An operation on a single field of a document.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Replaces the field with a value
    Set(Value),
    /// Replaces the field with the store's current time
    ServerTimestamp,
    /// Removes the field. Removing an absent field does nothing.
    Delete,
    /// Appends every value not already present in the array.
    /// A field that isn't an array is replaced by one.
    ArrayUnion(Vec<Value>),
    /// Removes every element structurally equal to one of the values.
    /// A field that isn't an array is replaced by an empty one.
    ArrayRemove(Vec<Value>),
}

/// An ordered set of field operations, applied atomically by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    ops: Vec<(FieldPath, FieldOp)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    fn op(mut self, path: impl Into<FieldPath>, op: FieldOp) -> Self {
        self.ops.push((path.into(), op));
        self
    }

    pub fn set(self, path: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        self.op(path, FieldOp::Set(value.into()))
    }

    pub fn server_timestamp(self, path: impl Into<FieldPath>) -> Self {
        self.op(path, FieldOp::ServerTimestamp)
    }

    pub fn delete(self, path: impl Into<FieldPath>) -> Self {
        self.op(path, FieldOp::Delete)
    }

    pub fn array_union(self, path: impl Into<FieldPath>, values: Vec<Value>) -> Self {
        self.op(path, FieldOp::ArrayUnion(values))
    }

    pub fn array_remove(self, path: impl Into<FieldPath>, values: Vec<Value>) -> Self {
        self.op(path, FieldOp::ArrayRemove(values))
    }

    /// Applies every operation in order, resolving server timestamps to `now`.
    pub fn apply(&self, fields: &mut Fields, now: DateTime<Utc>) {
        for (path, op) in &self.ops {
            let Some((leaf, parents)) = path.segments().split_last() else {
                continue;
            };

            if let FieldOp::Delete = op {
                if let Some(parent) = parent_map(fields, parents, false) {
                    parent.remove(leaf);
                }
                continue;
            }

            let Some(parent) = parent_map(fields, parents, true) else {
                continue;
            };

            match op {
                FieldOp::Set(value) => {
                    parent.insert(leaf.clone(), value.clone());
                }
                FieldOp::ServerTimestamp => {
                    parent.insert(leaf.clone(), Value::Timestamp(now));
                }
                FieldOp::ArrayUnion(values) => {
                    let items = array_entry(parent, leaf);

                    for value in values {
                        if !items.contains(value) {
                            items.push(value.clone());
                        }
                    }
                }
                FieldOp::ArrayRemove(values) => {
                    array_entry(parent, leaf).retain(|item| !values.contains(item));
                }
                FieldOp::Delete => unreachable!("deletes are handled above"),
            }
        }
    }
}

/// Walks to the map holding the leaf field, optionally creating missing maps.
fn parent_map<'a>(fields: &'a mut Fields, segments: &[String], create: bool) -> Option<&'a mut Fields> {
    let Some((first, rest)) = segments.split_first() else {
        return Some(fields);
    };

    if create {
        let entry = fields
            .entry(first.clone())
            .or_insert_with(|| Value::Map(Fields::new()));

        if !matches!(entry, Value::Map(_)) {
            *entry = Value::Map(Fields::new());
        }

        match entry {
            Value::Map(map) => parent_map(map, rest, true),
            _ => None,
        }
    } else {
        match fields.get_mut(first) {
            Some(Value::Map(map)) => parent_map(map, rest, false),
            _ => None,
        }
    }
}

fn array_entry<'a>(parent: &'a mut Fields, leaf: &str) -> &'a mut Vec<Value> {
    let entry = parent
        .entry(leaf.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));

    if !matches!(entry, Value::Array(_)) {
        *entry = Value::Array(Vec::new());
    }

    match entry {
        Value::Array(items) => items,
        _ => unreachable!("entry was just made an array"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, size: i64) -> Value {
        let mut fields = Fields::new();
        fields.insert("optionName".into(), name.into());
        fields.insert("size".into(), Value::Integer(size));
        Value::Map(fields)
    }

    #[test]
    fn nested_set_and_delete() {
        let now = Utc::now();
        let mut fields = Fields::new();

        Update::new()
            .server_timestamp(FieldPath::new(["players", "a.b"]))
            .set(FieldPath::new(["players", "c"]), Value::Null)
            .apply(&mut fields, now);

        let players = fields["players"].as_map().unwrap();
        assert_eq!(players["a.b"], Value::Timestamp(now));
        assert!(players["c"].is_null());

        Update::new()
            .delete(FieldPath::new(["players", "a.b"]))
            .delete(FieldPath::new(["players", "missing"]))
            .delete(FieldPath::new(["nothing", "here"]))
            .apply(&mut fields, now);

        let players = fields["players"].as_map().unwrap();
        assert_eq!(players.len(), 1);
        assert!(!fields.contains_key("nothing"));
    }

    #[test]
    fn array_union_skips_structural_duplicates() {
        let mut fields = Fields::new();

        Update::new()
            .array_union("items", vec![item("Pizza", 2), item("Pizza", 2), item("Tacos", 1)])
            .apply(&mut fields, Utc::now());

        assert_eq!(fields["items"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn array_remove_matches_by_value_and_type() {
        let mut fields = Fields::new();
        let now = Utc::now();

        Update::new()
            .array_union("items", vec![item("Pizza", 2), item("Tacos", 1)])
            .apply(&mut fields, now);

        let mut double_sized = Fields::new();
        double_sized.insert("optionName".into(), "Pizza".into());
        double_sized.insert("size".into(), Value::Double(2.0));

        Update::new()
            .array_remove("items", vec![Value::Map(double_sized)])
            .apply(&mut fields, now);
        assert_eq!(fields["items"].as_array().unwrap().len(), 2);

        Update::new()
            .array_remove("items", vec![item("Pizza", 2)])
            .apply(&mut fields, now);
        assert_eq!(fields["items"].as_array().unwrap(), &[item("Tacos", 1)]);
    }
}
