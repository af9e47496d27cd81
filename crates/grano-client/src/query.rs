//! Filterable, paginated queries over a collection.
//!
//! A [`Query`] is an immutable value: every refinement returns a new query,
//! so partial chains can be shared and reused. Fetching yields a [`Page`];
//! a [`Cursor`] walks all pages lazily, one request per page.

use std::collections::{BTreeMap, VecDeque};
use std::marker::PhantomData;

use grano_core::{GranoError, Result, ResourceData};
use serde_json::Value;

use crate::client::{expect_success, Client};
use crate::collection::Resource;

/// Query parameter matching the current value of a property.
pub fn property_filter(name: &str) -> String {
    format!("property-{name}")
}

/// Query parameter matching the current or any historical value of a property.
pub fn alias_filter(name: &str) -> String {
    format!("property-aliases-{name}")
}

pub struct Query<R: Resource> {
    client: Client,
    endpoint: String,
    params: BTreeMap<String, String>,
    scope: R::Scope,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Resource> Clone for Query<R> {
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

impl<R: Resource> std::fmt::Debug for Query<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("kind", &R::KIND)
            .field("endpoint", &self.endpoint)
            .field("params", &self.params)
            .finish()
    }
}

impl<R: Resource> Query<R> {
    pub(crate) fn new(
        client: Client,
        endpoint: String,
        params: BTreeMap<String, String>,
        scope: R::Scope,
    ) -> Self {
        Self {
            client,
            endpoint,
            params,
            scope,
            _marker: PhantomData,
        }
    }

    /// A new query with an added filter. A filter of the same name is replaced.
    pub fn filter(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut refined = self.clone();
        refined.params.insert(name.into(), value.into());
        refined
    }

    pub fn limit(&self, limit: u64) -> Self {
        self.filter("limit", limit.to_string())
    }

    pub fn offset(&self, offset: u64) -> Self {
        self.filter("offset", offset.to_string())
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch the page this query addresses.
    pub async fn page(&self) -> Result<Page<R>> {
        let params: Vec<(String, String)> = self
            .params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let body = expect_success(self.client.get(&self.endpoint, &params).await?)?;
        Page::from_body(self.client.clone(), self.scope.clone(), body)
    }

    /// The total number of matches across all pages.
    pub async fn total(&self) -> Result<u64> {
        Ok(self.page().await?.total)
    }

    /// The first match in server order, if any.
    pub async fn first(&self) -> Result<Option<R>> {
        Ok(self.page().await?.results.into_iter().next())
    }

    /// A lazy cursor over all matches. Each call starts from the first page.
    pub fn cursor(&self) -> Cursor<R> {
        Cursor {
            pending: Some(self.clone()),
            buffer: VecDeque::new(),
            pages: 0,
        }
    }
}

/// One page of query results.
pub struct Page<R: Resource> {
    pub results: Vec<R>,
    pub total: u64,
    next_url: Option<String>,
    prev_url: Option<String>,
    client: Client,
    scope: R::Scope,
}

impl<R: Resource> Page<R> {
    fn from_body(client: Client, scope: R::Scope, body: Value) -> Result<Self> {
        let envelope = ResourceData::from_value(body)?;
        let items = envelope.array("results").ok_or(GranoError::MissingField {
            resource: "Page",
            field: "results",
        })?;
        let mut results = Vec::new();
        for item in items {
            let data = ResourceData::from_value(item.clone())?;
            results.push(R::from_data(client.clone(), &scope, data));
        }
        let total = envelope.u64("total").unwrap_or(results.len() as u64);

        Ok(Self {
            results,
            total,
            next_url: envelope.str("next_url").map(str::to_string),
            prev_url: envelope.str("prev_url").map(str::to_string),
            client,
            scope,
        })
    }

    pub fn has_next(&self) -> bool {
        self.next_url.is_some()
    }

    pub fn has_prev(&self) -> bool {
        self.prev_url.is_some()
    }

    /// Query for the following page, if the server announced one.
    pub fn next(&self) -> Option<Query<R>> {
        self.link(self.next_url.as_deref())
    }

    /// Query for the preceding page, if the server announced one.
    pub fn prev(&self) -> Option<Query<R>> {
        self.link(self.prev_url.as_deref())
    }

    fn link(&self, url: Option<&str>) -> Option<Query<R>> {
        url.map(|url| {
            Query::new(
                self.client.clone(),
                url.to_string(),
                BTreeMap::new(),
                self.scope.clone(),
            )
        })
    }
}

/// Lazy iteration over every match of a query, following `next_url` links.
///
/// ```rust,ignore
/// let mut cursor = project.entities().all();
/// while let Some(entity) = cursor.next().await? {
///     println!("{}", entity.id()?);
/// }
/// ```
pub struct Cursor<R: Resource> {
    pending: Option<Query<R>>,
    buffer: VecDeque<R>,
    pages: usize,
}

impl<R: Resource> Cursor<R> {
    /// The next resource, fetching another page when the current one is spent.
    ///
    /// A failed page fetch is retried on the next call.
    #[allow(clippy::should_implement_trait)]
    pub async fn next(&mut self) -> Result<Option<R>> {
        loop {
            if let Some(resource) = self.buffer.pop_front() {
                return Ok(Some(resource));
            }
            let Some(query) = self.pending.take() else {
                return Ok(None);
            };
            let page = match query.page().await {
                Ok(page) => page,
                Err(e) => {
                    self.pending = Some(query);
                    return Err(e);
                }
            };
            self.pages += 1;
            self.pending = page.next();
            self.buffer.extend(page.results);
        }
    }

    /// Number of pages fetched so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// Drain the cursor into a vector.
    pub async fn try_collect(mut self) -> Result<Vec<R>> {
        let mut all = Vec::new();
        while let Some(resource) = self.next().await? {
            all.push(resource);
        }
        Ok(all)
    }
}
