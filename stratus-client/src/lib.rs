//! Stratus datastore client
//!
//! A client SDK that adapts an application's object graph onto a remote
//! schemaless REST datastore. It covers the full round trip: OAuth2 session
//! management with silent single-flight token refresh, schema-driven
//! serialization between graph instances and wire field maps, translation of
//! structured queries into the datastore's parameter and header conventions,
//! and a graph adapter that commits batched inserts, updates and deletes
//! while keeping client-assigned primary keys as permanent ids.
//!
//! Most applications construct one [`Client`] at startup, register their
//! entity schemas on it, and work through the [`DataStore`] and
//! [`GraphStore`] views it hands out.

pub mod client;
pub mod datastore;
pub mod error;
pub mod graph;
pub mod options;
pub mod query;
pub mod schema;
pub mod session;
pub mod transport;

pub use client::{
    Client, ClientConfig, DEFAULT_API_HOST, DEFAULT_PASSWORD_FIELD, DEFAULT_USER_ID_FIELD,
    DEFAULT_USER_SCHEMA,
};
pub use datastore::{CustomRequest, DataStore};
pub use error::Error;
pub use graph::{ChangeSet, GraphStore, PendingDelete, PendingUpdate, SaveFailure, SaveReport};
pub use options::{MAX_EXPAND_DEPTH, RequestOptions, ServiceUnavailableRetry};
pub use query::{Filter, Operator, OrderBy, Query};
pub use schema::{
    AttributeKind, Cardinality, EntityDescriptor, Instance, Property, Relation, SchemaRegistry,
};
pub use session::{Credentials, Provider, UserSession};
pub use transport::{HttpTransport, Method, RequestBody, Transport, WireRequest, WireResponse};
