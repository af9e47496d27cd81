//! State shared by entity and relation builders.
//!
//! A builder collects schemata, properties, files and unique criteria in a
//! [`Draft`], then resolves exactly once into a server resource (or into a
//! recorded failure). Resolution is tracked by [`Resolution`], which wraps a
//! `tokio::sync::OnceCell` so concurrent `save()` calls share one attempt.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use grano_client::{alias_filter, property_filter, Query, Resource};
use grano_core::types::schema_name;
use grano_core::{FileSet, GranoError, Property, PropertyValue, ResourceData};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::OnceCell;

use crate::error::{LoaderError, Result};
use crate::signature::Signature;

// ── Unique criteria ───────────────────────────────────────────────

/// A property whose value identifies a record.
///
/// With `only_active = false` historical values of the property match too.
/// Criteria order by `(name, only_active)`, which fixes signature order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct UniqueCriterion {
    pub name: String,
    pub only_active: bool,
}

impl UniqueCriterion {
    pub fn new(name: impl Into<String>, only_active: bool) -> Self {
        Self {
            name: name.into(),
            only_active,
        }
    }

    /// Query parameter that filters on this criterion.
    pub fn filter_name(&self) -> String {
        if self.only_active {
            property_filter(&self.name)
        } else {
            alias_filter(&self.name)
        }
    }
}

// ── Resolution state ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildState {
    Pending,
    Resolving,
    Resolved,
    Failed,
}

/// A validation failure recorded instead of a resolved resource.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub kind: &'static str,
    pub signature: String,
    pub message: String,
    pub description: Option<String>,
    pub at: DateTime<Utc>,
}

impl Diagnostic {
    pub(crate) fn from_error(kind: &'static str, signature: &Signature, err: &GranoError) -> Self {
        let fault = err.fault();
        Self {
            kind,
            signature: signature.to_string(),
            message: fault
                .and_then(|f| f.message.clone())
                .unwrap_or_else(|| err.to_string()),
            description: fault.and_then(|f| f.description.clone()),
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Outcome<R> {
    Resolved(R),
    Failed(Diagnostic),
}

/// Write-once resolution slot of a builder.
#[derive(Debug)]
pub(crate) struct Resolution<R> {
    cell: OnceCell<Outcome<R>>,
    resolving: AtomicBool,
}

/// Lowers the resolving flag however the attempt ends.
struct ResolvingFlag<'a>(&'a AtomicBool);

impl<'a> ResolvingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ResolvingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<R> Resolution<R> {
    pub(crate) fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            resolving: AtomicBool::new(false),
        }
    }

    pub(crate) fn state(&self) -> BuildState {
        match self.cell.get() {
            Some(Outcome::Resolved(_)) => BuildState::Resolved,
            Some(Outcome::Failed(_)) => BuildState::Failed,
            None if self.resolving.load(Ordering::SeqCst) => BuildState::Resolving,
            None => BuildState::Pending,
        }
    }

    pub(crate) fn get(&self) -> Option<&Outcome<R>> {
        self.cell.get()
    }

    /// Run `init` unless an outcome is already stored. Concurrent callers
    /// wait for the running attempt. An `Err` leaves the slot empty.
    pub(crate) async fn get_or_resolve<F, Fut>(&self, init: F) -> Result<&Outcome<R>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Outcome<R>>>,
    {
        self.cell
            .get_or_try_init(|| async {
                let _flag = ResolvingFlag::raise(&self.resolving);
                init().await
            })
            .await
    }
}

/// Map a create/update result onto an outcome, containing validation errors.
pub(crate) fn contain_validation<R>(
    kind: &'static str,
    signature: &Signature,
    result: grano_core::Result<R>,
    on_failure: impl FnOnce(&Diagnostic),
) -> Result<Outcome<R>> {
    match result {
        Ok(resource) => Ok(Outcome::Resolved(resource)),
        Err(err) if err.is_validation() => {
            let diagnostic = Diagnostic::from_error(kind, signature, &err);
            tracing::warn!(
                kind,
                signature = %signature,
                error = %err,
                "Validation error, record skipped"
            );
            on_failure(&diagnostic);
            Ok(Outcome::Failed(diagnostic))
        }
        Err(err) => Err(err.into()),
    }
}

// ── Draft ─────────────────────────────────────────────────────────

/// Everything a builder has been told before it resolves.
#[derive(Debug, Clone, Default)]
pub(crate) struct Draft {
    pub schemata: Vec<String>,
    pub properties: BTreeMap<String, Property>,
    pub files: FileSet,
    pub criteria: BTreeSet<UniqueCriterion>,
    pub source_url: Option<String>,
}

impl Draft {
    pub(crate) fn new(schemata: Vec<String>, source_url: Option<String>) -> Self {
        Self {
            schemata,
            source_url,
            ..Self::default()
        }
    }

    pub(crate) fn set(&mut self, name: String, value: PropertyValue, source_url: Option<String>) {
        let source_url = source_url.or_else(|| self.source_url.clone());
        if source_url.is_none() {
            tracing::warn!(property = %name, "No source for property");
        }
        let property = Property::new(name.clone(), value, source_url);
        match &property.file {
            Some(blob) => {
                self.files.insert(name.clone(), blob.clone());
            }
            None => {
                self.files.remove(&name);
            }
        }
        self.properties.insert(name, property);
    }

    pub(crate) fn unique(&mut self, name: String, only_active: bool) {
        self.criteria.insert(UniqueCriterion::new(name, only_active));
    }

    /// Current value of a non-file property.
    pub(crate) fn value(&self, name: &str) -> Option<&str> {
        self.properties
            .get(name)
            .filter(|p| !p.is_file())
            .and_then(|p| p.value.as_deref())
    }

    /// Append this draft's unique values, in criterion order.
    pub(crate) fn extend_signature(&self, signature: &mut Signature) {
        for criterion in &self.criteria {
            signature.push_value(self.value(&criterion.name).map(str::to_string));
        }
    }

    /// Unique criteria paired with their values, failing on the first one
    /// without a usable value.
    pub(crate) fn unique_values(&self) -> Result<Vec<(UniqueCriterion, String)>> {
        self.criteria
            .iter()
            .map(|criterion| {
                self.value(&criterion.name)
                    .map(|value| (criterion.clone(), value.to_string()))
                    .ok_or_else(|| LoaderError::MissingUniqueValue {
                        property: criterion.name.clone(),
                    })
            })
            .collect()
    }

    /// The `properties` object of a create payload.
    pub(crate) fn properties_value(&self) -> Value {
        let map: Map<String, Value> = self
            .properties
            .iter()
            .map(|(name, property)| (name.clone(), property.to_value()))
            .collect();
        Value::Object(map)
    }

    /// Upsert this draft's properties by name into an existing document.
    pub(crate) fn merge_properties(&self, data: &mut ResourceData) {
        let properties = data.object_mut("properties");
        for (name, property) in &self.properties {
            properties.insert(name.clone(), property.to_value());
        }
    }
}

/// Existing schemata in order, followed by new names not yet present.
pub(crate) fn merge_schemata(existing: Option<&Vec<Value>>, new: &[String]) -> Vec<Value> {
    let mut names: Vec<String> = Vec::new();
    let incoming = existing
        .into_iter()
        .flatten()
        .filter_map(schema_name)
        .map(str::to_string)
        .chain(new.iter().cloned());
    for name in incoming {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names.into_iter().map(Value::String).collect()
}

/// Add one filter per unique criterion.
pub(crate) fn apply_criteria<R: Resource>(
    mut query: Query<R>,
    values: &[(UniqueCriterion, String)],
) -> Query<R> {
    for (criterion, value) in values {
        query = query.filter(criterion.filter_name(), value.as_str());
    }
    query
}
