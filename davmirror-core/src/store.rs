use crate::{
    DEFAULT_TIMEOUT, DavError, Endpoint, FailureCause, HttpEndpoint, Location, ReplicaOperation,
    Result, UploadSource,
};
use bytes::{Buf, Bytes};
use futures_util::future::join_all;
use rand::seq::IndexedRandom;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// How save and delete reach the configured locations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationMode {
    /// One location after the other; the first failure stops the fan-out.
    #[default]
    Sequential,
    /// All locations at once; every request finishes before the result is
    /// reported.
    Concurrent,
}

#[derive(Clone, Default)]
pub struct ReplicatedStoreBuilder {
    locations: Vec<String>,
    fallback: Option<String>,
    public_base_url: Option<String>,
    timeout: Option<Duration>,
    replication_mode: ReplicationMode,
    endpoint: Option<Arc<dyn Endpoint>>,
}

impl ReplicatedStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn locations<I, S>(mut self, locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.locations = locations.into_iter().map(Into::into).collect();
        self
    }

    pub fn fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    pub fn public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = Some(url.into());
        self
    }

    /// A zero duration means the default timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn replication_mode(mut self, mode: ReplicationMode) -> Self {
        self.replication_mode = mode;
        self
    }

    pub fn endpoint(mut self, endpoint: Arc<dyn Endpoint>) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    fn resolve_timeout(&self) -> Duration {
        match self.timeout {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => DEFAULT_TIMEOUT,
        }
    }

    pub fn build(&self) -> Result<ReplicatedStore> {
        if self.locations.is_empty() {
            return Err(DavError::Config(
                "at least one location is required".to_string(),
            ));
        }

        let locations = self
            .locations
            .iter()
            .map(|raw| Location::parse(raw))
            .collect::<Result<Vec<_>>>()?;

        let fallback = self
            .fallback
            .as_deref()
            .map(Location::parse)
            .transpose()?;

        let public_base = match self.public_base_url.as_deref() {
            Some(url) => Location::parse(url)?,
            None => locations[0].clone(),
        };

        let timeout = self.resolve_timeout();
        let endpoint: Arc<dyn Endpoint> = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => Arc::new(HttpEndpoint::new(timeout)?),
        };

        Ok(ReplicatedStore {
            locations: locations.into(),
            fallback,
            public_base,
            timeout,
            replication_mode: self.replication_mode,
            endpoint,
        })
    }
}

/// A logical store mirrored over every configured location.
///
/// Writes and deletes go to all locations and succeed only if every location
/// accepts them. They are not atomic: a failure part way leaves the earlier
/// locations changed and nothing is rolled back. Reads are served by one
/// location picked at random, with an optional fallback on 404.
#[derive(Clone)]
pub struct ReplicatedStore {
    locations: Arc<[Location]>,
    fallback: Option<Location>,
    public_base: Location,
    timeout: Duration,
    replication_mode: ReplicationMode,
    endpoint: Arc<dyn Endpoint>,
}

impl ReplicatedStore {
    pub fn builder() -> ReplicatedStoreBuilder {
        ReplicatedStoreBuilder::new()
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn fallback(&self) -> Option<&Location> {
        self.fallback.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn replication_mode(&self) -> ReplicationMode {
        self.replication_mode
    }

    /// Uploads `content` to every location and returns `name` unchanged.
    pub async fn save(&self, name: &str, content: &UploadSource) -> Result<String> {
        tracing::debug!("saving {}", name);
        content.ensure_readable().await?;
        tracing::debug!("uploading from {}", content.kind());

        self.fan_out(|location| self.put_at(location, name, content))
            .await?;

        tracing::debug!("{} successfully saved", name);
        Ok(name.to_string())
    }

    /// True as soon as one location answers HEAD with 200.
    ///
    /// A location that cannot be reached counts as not holding the object.
    pub async fn exists(&self, name: &str) -> bool {
        tracing::debug!("checking existence of {}", name);

        for location in self.locations.iter() {
            tracing::debug!("checking via location {}", location);
            match self.endpoint.head(location, name).await {
                Ok(response) if response.status == StatusCode::OK => {
                    tracing::debug!("file found");
                    return true;
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(
                        "skipping location {} while checking {}: {}",
                        location,
                        name,
                        error
                    );
                }
            }
        }

        tracing::debug!("file does not exist");
        false
    }

    pub async fn open(&self, name: &str) -> Result<StoredObject> {
        tracing::debug!("opening {}", name);

        let mut location = self.pick_read_location()?;
        tracing::debug!("getting via {}", location);
        let mut response = self.endpoint.get(location, name).await?;

        if response.status == StatusCode::NOT_FOUND {
            if let Some(fallback) = &self.fallback {
                tracing::debug!("{} missing at {}, trying fallback {}", name, location, fallback);
                location = fallback;
                response = self.endpoint.get(location, name).await?;
            }
        }

        if response.status != StatusCode::OK {
            let error = DavError::ReadFailed {
                url: location.display_target(name),
                status: response.status.as_u16(),
            };
            tracing::error!("{}", error);
            return Err(error);
        }

        Ok(StoredObject {
            name: name.to_string(),
            url: location.join(name)?,
            body: response.body,
        })
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        tracing::debug!("deleting {}", name);

        self.fan_out(|location| self.delete_at(location, name))
            .await?;

        tracing::debug!("{} deleted", name);
        Ok(())
    }

    /// Content-Length reported by the first location that answers at all.
    ///
    /// The answer is taken whatever its status, so a reachable location
    /// without the object yields `None` without asking the others. `None` is
    /// also returned when no location can be reached.
    pub async fn size(&self, name: &str) -> Option<u64> {
        tracing::debug!("getting {} size", name);

        for location in self.locations.iter() {
            tracing::debug!("getting via {}", location);
            match self.endpoint.head(location, name).await {
                Ok(response) => return response.content_length(),
                Err(error) => {
                    tracing::warn!("size lookup failed at {}: {}", location, error);
                }
            }
        }

        tracing::error!("file size not found for {}", name);
        None
    }

    pub fn url(&self, name: &str) -> String {
        self.public_base.display_target(name)
    }

    fn pick_read_location(&self) -> Result<&Location> {
        let picked = self.locations.choose(&mut rand::rng());
        picked.ok_or_else(|| DavError::Internal("no locations configured".to_string()))
    }

    async fn fan_out<'a, F, Fut>(&'a self, step: F) -> Result<()>
    where
        F: Fn(&'a Location) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        match self.replication_mode {
            ReplicationMode::Sequential => {
                for location in self.locations.iter() {
                    step(location).await?;
                }
                Ok(())
            }
            ReplicationMode::Concurrent => {
                let results = join_all(self.locations.iter().map(step)).await;
                results.into_iter().collect()
            }
        }
    }

    async fn put_at(&self, location: &Location, name: &str, content: &UploadSource) -> Result<()> {
        tracing::debug!("saving in {}", location);
        let status = self.endpoint.put(location, name, content).await;
        check_replica_status(
            ReplicaOperation::Save,
            location,
            name,
            status,
            &[StatusCode::CREATED, StatusCode::NO_CONTENT],
        )
    }

    async fn delete_at(&self, location: &Location, name: &str) -> Result<()> {
        tracing::debug!("deleting in {}", location);
        let status = self.endpoint.delete(location, name).await;
        check_replica_status(
            ReplicaOperation::Delete,
            location,
            name,
            status,
            &[StatusCode::NO_CONTENT],
        )
    }
}

fn check_replica_status(
    operation: ReplicaOperation,
    location: &Location,
    name: &str,
    status: Result<StatusCode>,
    accepted: &[StatusCode],
) -> Result<()> {
    let url = location.display_target(name);
    let error = match status {
        Ok(status) if accepted.contains(&status) => return Ok(()),
        Ok(status) => DavError::Replication {
            operation,
            url,
            cause: FailureCause::Status(status.as_u16()),
        },
        Err(error) => error.into_replication(operation, url),
    };

    tracing::error!("{}", error);
    Err(error)
}

/// Body of an object read from one replica.
#[derive(Debug, Clone)]
pub struct StoredObject {
    name: String,
    url: Url,
    body: Bytes,
}

impl StoredObject {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the body was actually read from.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    pub fn into_bytes(self) -> Bytes {
        self.body
    }

    pub fn reader(&self) -> bytes::buf::Reader<Bytes> {
        self.body.clone().reader()
    }
}
