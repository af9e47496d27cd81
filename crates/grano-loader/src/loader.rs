//! Batch loader: the coordinator of one ingestion run.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use grano_client::Project;
use serde::Serialize;
use uuid::Uuid;

use crate::builder::Diagnostic;
use crate::entity::EntityBuilder;
use crate::locks::LockTable;
use crate::relation::RelationBuilder;

/// Counters over every builder a loader has resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    /// Saves that found more than one candidate record.
    pub ambiguous: usize,
}

/// Produces entity and relation builders for one project and owns the
/// lock table they serialize on.
///
/// Cloning is cheap; clones share the lock table, stats and diagnostics.
///
/// ```rust,ignore
/// let loader = Loader::new(grano.project("demo").await?, Some("http://source".into()));
/// let merkel = loader.make_entity(["person"], None);
/// merkel.set("name", "Angela Merkel");
/// let scholz = loader.make_entity(["person"], None);
/// scholz.set("name", "Olaf Scholz");
/// loader.make_relation("knows", &merkel, &scholz, None).save().await?;
/// ```
#[derive(Debug, Clone)]
pub struct Loader {
    inner: Arc<LoaderInner>,
}

#[derive(Debug)]
struct LoaderInner {
    project: Project,
    source_url: Option<String>,
    locks: LockTable,
    batch_id: Uuid,
    stats: Mutex<LoadStats>,
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl Loader {
    pub fn new(project: Project, source_url: Option<String>) -> Self {
        let batch_id = Uuid::new_v4();
        tracing::info!(
            project = project.slug().unwrap_or("?"),
            batch_id = %batch_id,
            "Loader created"
        );
        Self {
            inner: Arc::new(LoaderInner {
                project,
                source_url,
                locks: LockTable::new(),
                batch_id,
                stats: Mutex::new(LoadStats::default()),
                diagnostics: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn project(&self) -> &Project {
        &self.inner.project
    }

    pub fn source_url(&self) -> Option<&str> {
        self.inner.source_url.as_deref()
    }

    pub fn batch_id(&self) -> Uuid {
        self.inner.batch_id
    }

    pub fn locks(&self) -> &LockTable {
        &self.inner.locks
    }

    /// A builder for an entity with the given schemata (`base` is implied).
    ///
    /// `source_url` becomes the default source of its properties, falling
    /// back to the loader's.
    pub fn make_entity<I, S>(&self, schemata: I, source_url: Option<&str>) -> Arc<EntityBuilder>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let source_url = source_url
            .map(str::to_string)
            .or_else(|| self.inner.source_url.clone());
        Arc::new(EntityBuilder::new(
            self.clone(),
            schemata.into_iter().map(Into::into).collect(),
            source_url,
        ))
    }

    /// A builder for a relation between two entity builders.
    pub fn make_relation(
        &self,
        schema: impl Into<String>,
        source: &Arc<EntityBuilder>,
        target: &Arc<EntityBuilder>,
        source_url: Option<&str>,
    ) -> RelationBuilder {
        let source_url = source_url
            .map(str::to_string)
            .or_else(|| self.inner.source_url.clone());
        RelationBuilder::new(
            self.clone(),
            schema.into(),
            Arc::clone(source),
            Arc::clone(target),
            source_url,
        )
    }

    pub fn stats(&self) -> LoadStats {
        *lock(&self.inner.stats)
    }

    /// Validation failures recorded so far, in the order they happened.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        lock(&self.inner.diagnostics).clone()
    }

    pub(crate) fn note_created(&self) {
        lock(&self.inner.stats).created += 1;
    }

    pub(crate) fn note_updated(&self, candidates: usize) {
        let mut stats = lock(&self.inner.stats);
        stats.updated += 1;
        if candidates > 1 {
            stats.ambiguous += 1;
        }
    }

    pub(crate) fn note_failed(&self, diagnostic: &Diagnostic) {
        lock(&self.inner.stats).failed += 1;
        lock(&self.inner.diagnostics).push(diagnostic.clone());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
