//! REST collections and the resource trait shared by all proxies.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use grano_core::{FileSet, Result, ResourceData};

use crate::client::{expect_success, Client};
use crate::query::{Cursor, Query};

/// A server-side object mirrored locally as a [`ResourceData`] document.
pub trait Resource: Sized + Send {
    /// Human-readable resource name, used in errors and logs.
    const KIND: &'static str;

    /// Extra context needed to address the resource beyond its document
    /// (e.g. the owning project of a schema).
    type Scope: Clone + Send + Sync;

    fn from_data(client: Client, scope: &Self::Scope, data: ResourceData) -> Self;

    fn data(&self) -> &ResourceData;

    /// Normalise a creation document before it is posted.
    fn prepare_create(_data: &mut ResourceData) {}
}

/// A REST collection of resources of type `R`, optionally pre-filtered
/// (e.g. the entities of one project).
pub struct Collection<R: Resource> {
    client: Client,
    endpoint: String,
    params: BTreeMap<String, String>,
    scope: R::Scope,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Resource> Clone for Collection<R> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            params: self.params.clone(),
            scope: self.scope.clone(),
            _marker: PhantomData,
        }
    }
}

impl<R: Resource> std::fmt::Debug for Collection<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("kind", &R::KIND)
            .field("endpoint", &self.endpoint)
            .field("params", &self.params)
            .finish()
    }
}

impl<R: Resource> Collection<R> {
    pub fn new(client: Client, endpoint: impl Into<String>, scope: R::Scope) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            params: BTreeMap::new(),
            scope,
            _marker: PhantomData,
        }
    }

    /// A copy of this collection restricted by an additional base filter.
    pub fn scoped(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut scoped = self.clone();
        scoped.params.insert(name.into(), value.into());
        scoped
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Begin querying the collection. Refine with [`Query::filter`].
    pub fn query(&self) -> Query<R> {
        Query::new(
            self.client.clone(),
            self.endpoint.clone(),
            self.params.clone(),
            self.scope.clone(),
        )
    }

    /// Iterate over every resource in the collection, page by page.
    pub fn all(&self) -> Cursor<R> {
        self.query().cursor()
    }

    /// Load one resource by its key (id, slug or name).
    pub async fn by_key(&self, key: &str) -> Result<R> {
        let body = expect_success(
            self.client
                .get(&format!("{}/{key}", self.endpoint), &[])
                .await?,
        )?;
        let data = ResourceData::from_value(body)?;
        Ok(R::from_data(self.client.clone(), &self.scope, data))
    }

    /// Create a resource from a document and file attachments.
    ///
    /// A `project` scope filter on the collection is copied into the document
    /// unless it already names a project.
    pub async fn create(&self, mut data: ResourceData, files: &FileSet) -> Result<R> {
        if let Some(project) = self.params.get("project") {
            if !data.contains("project") {
                data.set("project", project.clone());
            }
        }
        R::prepare_create(&mut data);

        let response = self
            .client
            .post(&self.endpoint, &data.into_value(), files)
            .await?;
        let status = response.0;
        let body = expect_success(response)?;
        tracing::debug!(kind = R::KIND, status, endpoint = %self.endpoint, "Created resource");

        let data = ResourceData::from_value(body)?;
        Ok(R::from_data(self.client.clone(), &self.scope, data))
    }
}

/// POST a full document to a resource endpoint and return the server's copy.
pub(crate) async fn save_document(
    client: &Client,
    endpoint: &str,
    data: &ResourceData,
    files: &FileSet,
) -> Result<ResourceData> {
    let body = expect_success(client.post(endpoint, &data.to_value(), files).await?)?;
    ResourceData::from_value(body)
}
