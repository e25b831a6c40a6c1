//! Entity type descriptors and the schema registry
//!
//! Descriptors carry the static metadata the serialization bridge needs:
//! the remote schema name, the primary key field and the declared
//! attributes and relationships. The registry is built explicitly at
//! startup; no runtime reflection is involved.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Attribute data types understood by the wire format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AttributeKind {
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
    /// Encoded on the wire as an attachment string carrying a content type,
    /// file name and base64 payload.
    Binary,
}

/// Relationship cardinality.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Cardinality {
    ToOne,
    ToMany,
}

/// A declared property of an entity type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Property {
    Attribute {
        name: String,
        kind: AttributeKind,
    },
    Relationship {
        name: String,
        /// Type name of the related entity.
        target: String,
        cardinality: Cardinality,
        /// Name of the inverse relationship on the target type, if declared.
        inverse: Option<String>,
    },
}

impl Property {
    pub fn name(&self) -> &str {
        match self {
            Property::Attribute { name, .. } => name,
            Property::Relationship { name, .. } => name,
        }
    }
}

/// Normalize a type name into its remote schema identifier.
pub fn schema_name(type_name: &str) -> String {
    type_name.to_lowercase()
}

/// Static metadata for one entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// Local type name, e.g. "Person".
    pub name: String,
    /// Declared primary key field, overriding the `<schema>_id` convention.
    pub primary_key_override: Option<String>,
    pub properties: Vec<Property>,
}

impl EntityDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key_override: None,
            properties: Vec::new(),
        }
    }

    pub fn with_primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key_override = Some(field.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, kind: AttributeKind) -> Self {
        self.properties.push(Property::Attribute {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn with_relationship(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        cardinality: Cardinality,
        inverse: Option<&str>,
    ) -> Self {
        self.properties.push(Property::Relationship {
            name: name.into(),
            target: target.into(),
            cardinality,
            inverse: inverse.map(String::from),
        });
        self
    }

    /// The remote schema this type maps to.
    pub fn schema_name(&self) -> String {
        schema_name(&self.name)
    }

    /// Resolve the primary key field: the declared override if present,
    /// otherwise the `<schema>_id` convention, which must then exist among
    /// the declared attributes.
    pub fn primary_key_field(&self) -> Result<String, Error> {
        if let Some(field) = &self.primary_key_override {
            return Ok(field.clone());
        }
        let conventional = format!("{}_id", self.schema_name());
        let declared = self
            .properties
            .iter()
            .any(|p| matches!(p, Property::Attribute { name, .. } if *name == conventional));
        if declared {
            Ok(conventional)
        } else {
            Err(Error::IncompatibleEntityType {
                entity: self.name.clone(),
            })
        }
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }

    /// Declared relationships in declaration order.
    pub fn relationships(&self) -> impl Iterator<Item = &Property> {
        self.properties
            .iter()
            .filter(|p| matches!(p, Property::Relationship { .. }))
    }

    pub fn attribute_kind(&self, name: &str) -> Option<AttributeKind> {
        match self.property(name) {
            Some(Property::Attribute { kind, .. }) => Some(*kind),
            _ => None,
        }
    }
}

/// The statically registered descriptor table, keyed by both type name and
/// schema name.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    by_schema: HashMap<String, EntityDescriptor>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor, validating its primary key resolution up
    /// front so misdeclared types fail at startup rather than mid-commit.
    pub fn register(&mut self, descriptor: EntityDescriptor) -> Result<(), Error> {
        descriptor.primary_key_field()?;
        self.by_schema
            .insert(descriptor.schema_name(), descriptor);
        Ok(())
    }

    /// Look up a descriptor by type name or schema name.
    pub fn descriptor(&self, type_name: &str) -> Result<&EntityDescriptor, Error> {
        self.by_schema
            .get(&schema_name(type_name))
            .ok_or_else(|| Error::UnknownEntityType {
                entity: type_name.to_string(),
            })
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.by_schema.contains_key(&schema_name(type_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> EntityDescriptor {
        EntityDescriptor::new("Person")
            .with_attribute("person_id", AttributeKind::String)
            .with_attribute("first_name", AttributeKind::String)
            .with_relationship("superpower", "Superpower", Cardinality::ToOne, Some("owner"))
    }

    #[test]
    fn test_schema_name_is_lowercased() {
        assert_eq!(schema_name("Person"), "person");
        assert_eq!(person().schema_name(), "person");
    }

    #[test]
    fn test_primary_key_falls_back_to_convention() {
        assert_eq!(person().primary_key_field().unwrap(), "person_id");
    }

    #[test]
    fn test_primary_key_override_wins() {
        let descriptor = EntityDescriptor::new("Account")
            .with_primary_key("account_number")
            .with_attribute("account_number", AttributeKind::String);
        assert_eq!(descriptor.primary_key_field().unwrap(), "account_number");
    }

    #[test]
    fn test_missing_primary_key_is_incompatible() {
        let descriptor =
            EntityDescriptor::new("Orphan").with_attribute("label", AttributeKind::String);
        let err = descriptor.primary_key_field().unwrap_err();
        assert!(matches!(err, Error::IncompatibleEntityType { .. }));
    }

    #[test]
    fn test_registry_lookup_by_type_or_schema_name() {
        let mut registry = SchemaRegistry::new();
        registry.register(person()).unwrap();
        assert!(registry.descriptor("Person").is_ok());
        assert!(registry.descriptor("person").is_ok());
        assert!(matches!(
            registry.descriptor("Unknown").unwrap_err(),
            Error::UnknownEntityType { .. }
        ));
    }

    #[test]
    fn test_registry_rejects_incompatible_types() {
        let mut registry = SchemaRegistry::new();
        let orphan = EntityDescriptor::new("Orphan").with_attribute("label", AttributeKind::String);
        assert!(registry.register(orphan).is_err());
    }
}
