//! Serialization bridge between the object graph and the wire format
//!
//! Derives remote schema names and primary key fields from entity type
//! descriptors, flattens instances to wire field maps (and back), and
//! computes the relationship-expansion declarations the datastore needs to
//! inline nested objects in one round trip.

pub mod descriptor;
pub mod expand;
pub mod serialize;

pub use descriptor::{
    AttributeKind, Cardinality, EntityDescriptor, Property, SchemaRegistry, schema_name,
};
pub use expand::relationship_header;
pub use serialize::{
    Instance, Relation, decode_binary, encode_binary, from_wire, to_wire, to_wire_partial,
};
