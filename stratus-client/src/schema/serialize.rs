//! Wire-format serialization for entity instances
//!
//! Translates between graph-side [`Instance`] values and the flat field
//! maps the datastore speaks. Relationship references flatten to primary
//! keys on the way out and are rebuilt from keys (or inlined objects) on
//! the way in. Unknown wire fields are ignored so a newer server schema
//! never breaks an older client.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::Error;
use crate::schema::descriptor::{Cardinality, EntityDescriptor, Property, SchemaRegistry};

/// A relationship reference held by an instance: the related object's
/// primary key (to-one) or keys (to-many).
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    ToOne(Option<String>),
    ToMany(Vec<String>),
}

/// A graph-side entity instance: a typed record of attribute values plus
/// relationship references. The adapter mediates persistence for instances
/// but never owns their lifetime.
#[derive(Debug, Clone, Default)]
pub struct Instance {
    pub type_name: String,
    pub values: Map<String, Value>,
    pub relations: HashMap<String, Relation>,
}

impl Instance {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            values: Map::new(),
            relations: HashMap::new(),
        }
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.values.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn set_relation(&mut self, name: impl Into<String>, relation: Relation) {
        self.relations.insert(name.into(), relation);
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    /// Generate and store a client-side object id in the primary key field.
    ///
    /// The same value survives the remote create unchanged: the temporary id
    /// becomes the permanent id, so graph references stay valid with no
    /// remapping.
    pub fn assign_object_id(&mut self, descriptor: &EntityDescriptor) -> Result<String, Error> {
        let field = descriptor.primary_key_field()?;
        let id = Uuid::new_v4().to_string();
        self.values.insert(field, Value::String(id.clone()));
        Ok(id)
    }

    /// The current primary key value, if one has been assigned.
    pub fn object_id(&self, descriptor: &EntityDescriptor) -> Result<Option<String>, Error> {
        let field = descriptor.primary_key_field()?;
        Ok(self
            .values
            .get(&field)
            .and_then(Value::as_str)
            .map(String::from))
    }

    /// Merge server-returned fields onto this instance without replacing its
    /// identity: the primary key is never touched, unknown wire fields are
    /// dropped, declared relationships are rebuilt from the returned keys.
    pub fn merge(
        &mut self,
        registry: &SchemaRegistry,
        descriptor: &EntityDescriptor,
        fields: &Map<String, Value>,
    ) -> Result<(), Error> {
        let primary_key = descriptor.primary_key_field()?;
        let merged = from_wire(registry, descriptor, fields)?;
        for (name, value) in merged.values {
            if name == primary_key {
                continue;
            }
            self.values.insert(name, value);
        }
        for (name, relation) in merged.relations {
            self.relations.insert(name, relation);
        }
        Ok(())
    }
}

/// Encode a binary attribute as an attachment string the datastore can tell
/// apart from plain text: content type and file name up front, base64
/// payload after a blank line.
pub fn encode_binary(name: &str, content_type: &str, data: &[u8]) -> String {
    format!(
        "Content-Type: {content_type}\nContent-Disposition: attachment; filename={name}\nContent-Transfer-Encoding: base64\n\n{}",
        BASE64.encode(data)
    )
}

/// Decode an attachment string produced by [`encode_binary`].
pub fn decode_binary(encoded: &str) -> Option<(String, String, Vec<u8>)> {
    let (headers, payload) = encoded.split_once("\n\n")?;
    let mut content_type = None;
    let mut name = None;
    for line in headers.lines() {
        if let Some(value) = line.strip_prefix("Content-Type: ") {
            content_type = Some(value.to_string());
        } else if let Some(value) = line.strip_prefix("Content-Disposition: attachment; filename=")
        {
            name = Some(value.to_string());
        }
    }
    let data = BASE64.decode(payload).ok()?;
    Some((name?, content_type?, data))
}

/// Flatten an instance into the wire field map: declared attributes pass
/// through as primitives, relationship references become the related
/// object's key (to-one) or key list (to-many).
pub fn to_wire(descriptor: &EntityDescriptor, instance: &Instance) -> Result<Value, Error> {
    let mut fields = Map::new();
    for property in &descriptor.properties {
        match property {
            Property::Attribute { name, .. } => {
                if let Some(value) = instance.values.get(name) {
                    fields.insert(name.clone(), value.clone());
                }
            }
            Property::Relationship { name, .. } => match instance.relations.get(name) {
                Some(Relation::ToOne(Some(key))) => {
                    fields.insert(name.clone(), Value::String(key.clone()));
                }
                Some(Relation::ToOne(None)) => {
                    fields.insert(name.clone(), Value::Null);
                }
                Some(Relation::ToMany(keys)) => {
                    fields.insert(
                        name.clone(),
                        Value::Array(keys.iter().cloned().map(Value::String).collect()),
                    );
                }
                None => {}
            },
        }
    }
    Ok(Value::Object(fields))
}

/// Flatten only the named fields of an instance, for partial updates.
pub fn to_wire_partial(
    descriptor: &EntityDescriptor,
    instance: &Instance,
    fields: &[String],
) -> Result<Value, Error> {
    let full = to_wire(descriptor, instance)?;
    let mut partial = Map::new();
    if let Value::Object(map) = full {
        for (name, value) in map {
            if fields.iter().any(|f| *f == name) {
                partial.insert(name, value);
            }
        }
    }
    Ok(Value::Object(partial))
}

/// Rebuild an instance from a wire field map. Unknown fields are ignored
/// for forward compatibility. Relationship fields accept a bare key, an
/// inlined object (reduced to its key) or an array of either.
pub fn from_wire(
    registry: &SchemaRegistry,
    descriptor: &EntityDescriptor,
    fields: &Map<String, Value>,
) -> Result<Instance, Error> {
    let mut instance = Instance::new(descriptor.name.clone());
    for property in &descriptor.properties {
        match property {
            Property::Attribute { name, .. } => {
                if let Some(value) = fields.get(name) {
                    instance.values.insert(name.clone(), value.clone());
                }
            }
            Property::Relationship {
                name,
                target,
                cardinality,
                ..
            } => {
                let Some(value) = fields.get(name) else {
                    continue;
                };
                match cardinality {
                    Cardinality::ToOne => {
                        let key = relation_key(registry, target, value)?;
                        instance
                            .relations
                            .insert(name.clone(), Relation::ToOne(key));
                    }
                    Cardinality::ToMany => {
                        let mut keys = Vec::new();
                        if let Value::Array(items) = value {
                            for item in items {
                                if let Some(key) = relation_key(registry, target, item)? {
                                    keys.push(key);
                                }
                            }
                        }
                        instance
                            .relations
                            .insert(name.clone(), Relation::ToMany(keys));
                    }
                }
            }
        }
    }
    Ok(instance)
}

/// Extract the related object's key from a relationship wire value, which
/// may be a bare key string or an inlined (expanded) object.
fn relation_key(
    registry: &SchemaRegistry,
    target: &str,
    value: &Value,
) -> Result<Option<String>, Error> {
    match value {
        Value::Null => Ok(None),
        Value::String(key) => Ok(Some(key.clone())),
        Value::Object(map) => {
            let target_descriptor = registry.descriptor(target)?;
            let primary_key = target_descriptor.primary_key_field()?;
            Ok(map.get(&primary_key).and_then(Value::as_str).map(String::from))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::descriptor::AttributeKind;
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                EntityDescriptor::new("Person")
                    .with_attribute("person_id", AttributeKind::String)
                    .with_attribute("first_name", AttributeKind::String)
                    .with_attribute("photo", AttributeKind::Binary)
                    .with_relationship(
                        "superpower",
                        "Superpower",
                        Cardinality::ToOne,
                        Some("owner"),
                    )
                    .with_relationship("friends", "Person", Cardinality::ToMany, None),
            )
            .unwrap();
        registry
            .register(
                EntityDescriptor::new("Superpower")
                    .with_attribute("superpower_id", AttributeKind::String)
                    .with_attribute("label", AttributeKind::String),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_assign_object_id_is_stable() {
        let registry = registry();
        let descriptor = registry.descriptor("Person").unwrap();
        let mut person = Instance::new("Person");
        let id = person.assign_object_id(descriptor).unwrap();
        assert_eq!(person.object_id(descriptor).unwrap().as_deref(), Some(id.as_str()));
    }

    #[test]
    fn test_to_wire_flattens_relations_to_keys() {
        let registry = registry();
        let descriptor = registry.descriptor("Person").unwrap();
        let mut person = Instance::new("Person");
        person.set("person_id", json!("p1"));
        person.set("first_name", json!("Ada"));
        person.set_relation("superpower", Relation::ToOne(Some("s1".into())));
        person.set_relation(
            "friends",
            Relation::ToMany(vec!["p2".into(), "p3".into()]),
        );

        let wire = to_wire(descriptor, &person).unwrap();
        assert_eq!(wire["person_id"], "p1");
        assert_eq!(wire["superpower"], "s1");
        assert_eq!(wire["friends"], json!(["p2", "p3"]));
    }

    #[test]
    fn test_to_wire_partial_restricts_fields() {
        let registry = registry();
        let descriptor = registry.descriptor("Person").unwrap();
        let mut person = Instance::new("Person");
        person.set("person_id", json!("p1"));
        person.set("first_name", json!("Ada"));

        let wire = to_wire_partial(descriptor, &person, &["first_name".to_string()]).unwrap();
        let map = wire.as_object().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["first_name"], "Ada");
    }

    #[test]
    fn test_from_wire_ignores_unknown_fields() {
        let registry = registry();
        let descriptor = registry.descriptor("Person").unwrap();
        let fields = json!({
            "person_id": "p1",
            "first_name": "Ada",
            "a_field_from_the_future": 42,
        });

        let person = from_wire(&registry, descriptor, fields.as_object().unwrap()).unwrap();
        assert_eq!(person.get("first_name"), Some(&json!("Ada")));
        assert!(person.get("a_field_from_the_future").is_none());
    }

    #[test]
    fn test_from_wire_accepts_keys_and_inlined_objects() {
        let registry = registry();
        let descriptor = registry.descriptor("Person").unwrap();

        let bare = json!({ "superpower": "s1" });
        let person = from_wire(&registry, descriptor, bare.as_object().unwrap()).unwrap();
        assert_eq!(
            person.relation("superpower"),
            Some(&Relation::ToOne(Some("s1".into())))
        );

        let inlined = json!({
            "superpower": { "superpower_id": "s2", "label": "flight" },
            "friends": [{ "person_id": "p2" }, "p3"],
        });
        let person = from_wire(&registry, descriptor, inlined.as_object().unwrap()).unwrap();
        assert_eq!(
            person.relation("superpower"),
            Some(&Relation::ToOne(Some("s2".into())))
        );
        assert_eq!(
            person.relation("friends"),
            Some(&Relation::ToMany(vec!["p2".into(), "p3".into()]))
        );
    }

    #[test]
    fn test_merge_preserves_primary_key() {
        let registry = registry();
        let descriptor = registry.descriptor("Person").unwrap();
        let mut person = Instance::new("Person");
        person.set("person_id", json!("p1"));
        person.set("first_name", json!("Ada"));

        let server_fields = json!({
            "person_id": "server-assigned-should-be-ignored",
            "first_name": "Ada",
            "unknown_server_field": true,
        });
        person
            .merge(&registry, descriptor, server_fields.as_object().unwrap())
            .unwrap();

        assert_eq!(person.get("person_id"), Some(&json!("p1")));
        assert!(person.get("unknown_server_field").is_none());
    }

    #[test]
    fn test_binary_attachment_round_trip() {
        let encoded = encode_binary("photo.png", "image/png", b"\x89PNG data");
        assert!(encoded.starts_with("Content-Type: image/png\n"));
        assert!(encoded.contains("filename=photo.png"));

        let (name, content_type, data) = decode_binary(&encoded).unwrap();
        assert_eq!(name, "photo.png");
        assert_eq!(content_type, "image/png");
        assert_eq!(data, b"\x89PNG data");
    }
}
