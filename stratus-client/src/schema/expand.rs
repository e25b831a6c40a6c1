//! Relationship-expansion header construction
//!
//! When an object with nested relationships is posted, or a read wants
//! related objects inlined, the datastore is told which relationship paths
//! to follow via a header of `path=target_schema` segments joined by `&`,
//! e.g. `superpower=superpower&superpower.interest=interest`. Traversal is
//! depth-limited and keeps a visited set of entity types per path, so
//! mutually referencing or self-referential types terminate: once a type
//! reappears on the current path its edge is still emitted but not
//! descended into.

use crate::error::Error;
use crate::options::MAX_EXPAND_DEPTH;
use crate::schema::descriptor::{EntityDescriptor, Property, SchemaRegistry, schema_name};

/// Build the relationship-expansion header value for a type, following
/// declared relationships up to `max_depth` hops. Returns an empty string
/// for a type with no relationships or a zero depth.
pub fn relationship_header(
    registry: &SchemaRegistry,
    type_name: &str,
    max_depth: u8,
) -> Result<String, Error> {
    if max_depth > MAX_EXPAND_DEPTH {
        return Err(Error::InvalidOption {
            reason: format!("expand depth {max_depth} exceeds maximum {MAX_EXPAND_DEPTH}"),
        });
    }
    let descriptor = registry.descriptor(type_name)?;
    let mut segments = Vec::new();
    if max_depth > 0 {
        let mut visited = vec![schema_name(type_name)];
        walk(registry, descriptor, "", max_depth, &mut visited, &mut segments)?;
    }
    Ok(segments.join("&"))
}

fn walk(
    registry: &SchemaRegistry,
    descriptor: &EntityDescriptor,
    prefix: &str,
    depth_left: u8,
    visited: &mut Vec<String>,
    segments: &mut Vec<String>,
) -> Result<(), Error> {
    for property in descriptor.relationships() {
        let Property::Relationship { name, target, .. } = property else {
            continue;
        };
        let target_schema = schema_name(target);
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        segments.push(format!("{path}={target_schema}"));

        // Descend unless the target type already appears on this path.
        if depth_left > 1 && !visited.contains(&target_schema) {
            let target_descriptor = registry.descriptor(target)?;
            visited.push(target_schema);
            walk(
                registry,
                target_descriptor,
                &path,
                depth_left - 1,
                visited,
                segments,
            )?;
            visited.pop();
        }
    }
    Ok(())
}
