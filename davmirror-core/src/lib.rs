//! Davmirror Core - replicated file storage over independent WebDAV-style endpoints
//!
//! One logical store backed by N remote locations:
//! - writes and deletes fan out to every location, all-or-nothing, no rollback
//! - reads go to one location picked at random, with an optional 404 fallback
//! - existence is an OR across locations, size is best-effort

pub mod endpoint;
pub mod error;
pub mod location;
pub mod naming;
pub mod store;

pub use endpoint::{DEFAULT_TIMEOUT, Endpoint, EndpointResponse, HttpEndpoint, UploadSource};
pub use error::{DavError, FailureCause, ReplicaOperation, Result};
pub use location::Location;
pub use naming::hashed_name;
pub use store::{ReplicatedStore, ReplicatedStoreBuilder, ReplicationMode, StoredObject};
