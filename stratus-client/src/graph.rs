//! Object-graph adapter
//!
//! [`GraphStore`] is the bridge between a persistence framework's object
//! graph and the REST datastore. It accepts batches of pending inserts,
//! updates and deletes, translates them through the serialization bridge,
//! and reconciles server responses back onto the caller's instances without
//! ever replacing their identity: the client-assigned primary key survives
//! the create round trip as the permanent id. The adapter makes no
//! cross-request ordering guarantee: the last response merged wins, and
//! stronger consistency is the caller's merge policy's concern.

use std::sync::Arc;

use log::debug;
use serde_json::{Map, Value};

use crate::datastore::{DataStore, HEADER_RELATIONS};
use crate::error::Error;
use crate::options::{MAX_EXPAND_DEPTH, RequestOptions};
use crate::query::Query;
use crate::schema::descriptor::{Property, SchemaRegistry};
use crate::schema::{Instance, Relation, from_wire, relationship_header, to_wire, to_wire_partial};

/// A pending update: the instance plus the names of its changed fields.
/// Only those fields travel; the datastore applies them all-or-nothing.
#[derive(Debug, Clone)]
pub struct PendingUpdate {
    pub instance: Instance,
    pub changed_fields: Vec<String>,
}

/// A pending delete, by type and object id. The caller removes the local
/// node only after the delete is reported successful.
#[derive(Debug, Clone)]
pub struct PendingDelete {
    pub type_name: String,
    pub object_id: String,
}

/// The batch of pending graph changes pushed down by the persistence layer.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub inserts: Vec<Instance>,
    pub updates: Vec<PendingUpdate>,
    pub deletes: Vec<PendingDelete>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// A per-object failure from a save, carrying the context the caller needs
/// to decide whether to resubmit.
#[derive(Debug)]
pub struct SaveFailure {
    pub schema: String,
    pub object_id: Option<String>,
    /// The wire payload that was attempted, when one was built.
    pub payload: Option<Value>,
    pub error: Error,
}

/// Outcome of a [`GraphStore::save`]: ids that committed and per-object
/// failures. Objects fail independently; one failure never rolls back the
/// others.
#[derive(Debug, Default)]
pub struct SaveReport {
    pub succeeded: Vec<String>,
    pub failures: Vec<SaveFailure>,
}

impl SaveReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Bridges graph-level operations onto the REST datastore.
#[derive(Clone)]
pub struct GraphStore {
    registry: Arc<SchemaRegistry>,
    datastore: DataStore,
}

impl GraphStore {
    pub fn new(registry: Arc<SchemaRegistry>, datastore: DataStore) -> Self {
        Self {
            registry,
            datastore,
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn datastore(&self) -> &DataStore {
        &self.datastore
    }

    /// Persist a batch of pending changes. Inserts and updates merge the
    /// server's returned fields back onto the instances in place, leaving
    /// every primary key untouched.
    pub async fn save(&self, changeset: &mut ChangeSet, options: &RequestOptions) -> SaveReport {
        let mut report = SaveReport::default();

        for instance in &mut changeset.inserts {
            match self.insert_one(instance, options).await {
                Ok(id) => report.succeeded.push(id),
                Err(failure) => report.failures.push(failure),
            }
        }
        for update in &mut changeset.updates {
            match self.update_one(update, options).await {
                Ok(id) => report.succeeded.push(id),
                Err(failure) => report.failures.push(failure),
            }
        }
        for delete in &changeset.deletes {
            let schema = crate::schema::schema_name(&delete.type_name);
            match self
                .datastore
                .delete(&schema, &delete.object_id, options)
                .await
            {
                Ok(()) => report.succeeded.push(delete.object_id.clone()),
                Err(error) => report.failures.push(SaveFailure {
                    schema,
                    object_id: Some(delete.object_id.clone()),
                    payload: None,
                    error,
                }),
            }
        }

        debug!(
            "changeset saved: {} succeeded, {} failed",
            report.succeeded.len(),
            report.failures.len()
        );
        report
    }

    async fn insert_one(
        &self,
        instance: &mut Instance,
        options: &RequestOptions,
    ) -> Result<String, SaveFailure> {
        let schema = crate::schema::schema_name(&instance.type_name);
        let fail = |object_id: Option<String>, payload: Option<Value>, error: Error| SaveFailure {
            schema: schema.clone(),
            object_id,
            payload,
            error,
        };

        let descriptor = self
            .registry
            .descriptor(&instance.type_name)
            .map_err(|e| fail(None, None, e))?;
        let primary_key_field = descriptor
            .primary_key_field()
            .map_err(|e| fail(None, None, e))?;
        let object_id = instance
            .object_id(descriptor)
            .map_err(|e| fail(None, None, e))?
            .ok_or_else(|| {
                fail(
                    None,
                    None,
                    Error::MissingPrimaryKey {
                        schema: schema.clone(),
                    },
                )
            })?;

        let payload =
            to_wire(descriptor, instance).map_err(|e| fail(Some(object_id.clone()), None, e))?;

        let mut per_object = options.clone();
        // Declare nested relationship paths so the datastore can wire up
        // related objects posted in the same graph commit.
        if instance.relations.values().any(|r| !matches!(r, Relation::ToOne(None))) {
            let header = relationship_header(&self.registry, &instance.type_name, MAX_EXPAND_DEPTH)
                .map_err(|e| fail(Some(object_id.clone()), Some(payload.clone()), e))?;
            if !header.is_empty() {
                per_object
                    .headers
                    .insert(HEADER_RELATIONS.to_string(), header);
            }
        }

        let response = self
            .datastore
            .create_with_key(&schema, &primary_key_field, &payload, &per_object)
            .await
            .map_err(|e| fail(Some(object_id.clone()), Some(payload.clone()), e))?;

        if let Value::Object(fields) = response {
            instance
                .merge(&self.registry, descriptor, &fields)
                .map_err(|e| fail(Some(object_id.clone()), Some(payload.clone()), e))?;
        }
        Ok(object_id)
    }

    async fn update_one(
        &self,
        update: &mut PendingUpdate,
        options: &RequestOptions,
    ) -> Result<String, SaveFailure> {
        let schema = crate::schema::schema_name(&update.instance.type_name);
        let fail = |object_id: Option<String>, payload: Option<Value>, error: Error| SaveFailure {
            schema: schema.clone(),
            object_id,
            payload,
            error,
        };

        let descriptor = self
            .registry
            .descriptor(&update.instance.type_name)
            .map_err(|e| fail(None, None, e))?;
        let object_id = update
            .instance
            .object_id(descriptor)
            .map_err(|e| fail(None, None, e))?
            .ok_or_else(|| {
                fail(
                    None,
                    None,
                    Error::MissingPrimaryKey {
                        schema: schema.clone(),
                    },
                )
            })?;

        let payload = to_wire_partial(descriptor, &update.instance, &update.changed_fields)
            .map_err(|e| fail(Some(object_id.clone()), None, e))?;

        let response = self
            .datastore
            .update(&schema, &object_id, &payload, options)
            .await
            .map_err(|e| fail(Some(object_id.clone()), Some(payload.clone()), e))?;

        if let Value::Object(fields) = response {
            update
                .instance
                .merge(&self.registry, descriptor, &fields)
                .map_err(|e| fail(Some(object_id.clone()), Some(payload.clone()), e))?;
        }
        Ok(object_id)
    }

    /// Fetch one object by primary key and rebuild it as an instance.
    pub async fn fetch(
        &self,
        type_name: &str,
        id: &str,
        options: &RequestOptions,
    ) -> Result<Instance, Error> {
        let descriptor = self.registry.descriptor(type_name)?;
        let schema = descriptor.schema_name();
        let fields = self.datastore.read(&schema, id, options).await?;
        match fields {
            Value::Object(map) => from_wire(&self.registry, descriptor, &map),
            other => Err(Error::Api {
                status: 200,
                context: schema,
                body: other.to_string(),
            }),
        }
    }

    /// Run a query and rebuild each result as an instance.
    pub async fn fetch_all(
        &self,
        query: &Query,
        options: &RequestOptions,
    ) -> Result<Vec<Instance>, Error> {
        let descriptor = self.registry.descriptor(query.schema())?;
        let objects = self.datastore.perform_query(query, options).await?;
        let mut instances = Vec::with_capacity(objects.len());
        for object in objects {
            if let Value::Object(map) = object {
                instances.push(from_wire(&self.registry, descriptor, &map)?);
            }
        }
        Ok(instances)
    }

    /// Resolve a declared relationship of an instance into the related
    /// instances. A to-one reference yields zero or one; a to-many yields a
    /// key-set query. When no reference is held locally but the target
    /// declares an inverse, the inverse is queried instead.
    pub async fn fetch_relationship(
        &self,
        instance: &Instance,
        relationship: &str,
        options: &RequestOptions,
    ) -> Result<Vec<Instance>, Error> {
        let descriptor = self.registry.descriptor(&instance.type_name)?;
        let Some(Property::Relationship {
            target, inverse, ..
        }) = descriptor.property(relationship)
        else {
            return Err(Error::UnknownRelationship {
                entity: instance.type_name.clone(),
                relationship: relationship.to_string(),
            });
        };

        let target_descriptor = self.registry.descriptor(target)?;
        let target_pk = target_descriptor.primary_key_field()?;

        match instance.relation(relationship) {
            Some(Relation::ToOne(Some(key))) => {
                Ok(vec![self.fetch(target, key, options).await?])
            }
            Some(Relation::ToOne(None)) => Ok(Vec::new()),
            Some(Relation::ToMany(keys)) if keys.is_empty() => Ok(Vec::new()),
            Some(Relation::ToMany(keys)) => {
                let query = Query::new(target_descriptor.schema_name()).where_in(
                    target_pk,
                    keys.iter().cloned().map(Value::String).collect(),
                );
                self.fetch_all(&query, options).await
            }
            None => match (inverse, instance.object_id(descriptor)?) {
                (Some(inverse), Some(object_id)) => {
                    let query = Query::new(target_descriptor.schema_name())
                        .where_eq(inverse, Value::String(object_id));
                    self.fetch_all(&query, options).await
                }
                _ => Ok(Vec::new()),
            },
        }
    }

    /// Push merged field values onto an existing graph node without
    /// replacing its identity. Applied unconditionally: across concurrent
    /// responses for the same object, the last merge wins.
    pub fn merge_into(
        &self,
        instance: &mut Instance,
        fields: &Map<String, Value>,
    ) -> Result<(), Error> {
        let descriptor = self.registry.descriptor(&instance.type_name)?;
        instance.merge(&self.registry, descriptor, fields)
    }
}
