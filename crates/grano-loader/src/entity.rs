//! Entity builders: find-or-create entities by their unique properties.

use std::sync::{Mutex, MutexGuard, PoisonError};

use grano_client::{Entity, Resource};
use grano_core::{Property, PropertyValue, ResourceData};
use serde_json::Value;

use crate::builder::{
    apply_criteria, contain_validation, merge_schemata, BuildState, Diagnostic, Draft, Outcome,
    Resolution, UniqueCriterion,
};
use crate::error::{LoaderError, Result};
use crate::loader::Loader;
use crate::signature::Signature;

pub const BASE_SCHEMA: &str = "base";

/// Describes one entity and resolves it against the project exactly once.
///
/// Every entity is unique by `name`, including historic names; further
/// criteria are added with [`EntityBuilder::unique`].
#[derive(Debug)]
pub struct EntityBuilder {
    loader: Loader,
    draft: Mutex<Draft>,
    resolution: Resolution<Entity>,
}

impl EntityBuilder {
    pub(crate) fn new(loader: Loader, mut schemata: Vec<String>, source_url: Option<String>) -> Self {
        schemata.push(BASE_SCHEMA.to_string());
        let mut draft = Draft::new(schemata, source_url);
        draft.unique("name".to_string(), false);
        Self {
            loader,
            draft: Mutex::new(draft),
            resolution: Resolution::new(),
        }
    }

    fn draft(&self) -> MutexGuard<'_, Draft> {
        self.draft.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a change to the draft while resolution has not begun.
    ///
    /// The state is read under the draft lock. Resolution raises its flag
    /// before it snapshots the draft, so a change is either in the snapshot
    /// or ignored.
    fn edit(&self, action: &str, change: impl FnOnce(&mut Draft)) {
        let mut draft = self.draft();
        let state = self.resolution.state();
        if state == BuildState::Pending {
            change(&mut draft);
        } else {
            tracing::debug!(action, ?state, "Entity already resolving, ignored");
        }
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<PropertyValue>) -> &Self {
        self.edit("set", |draft| draft.set(name.into(), value.into(), None));
        self
    }

    pub fn set_with_source(
        &self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
        source_url: &str,
    ) -> &Self {
        self.edit("set", |draft| {
            draft.set(name.into(), value.into(), Some(source_url.to_string()))
        });
        self
    }

    pub fn unique(&self, name: impl Into<String>, only_active: bool) -> &Self {
        self.edit("unique", |draft| draft.unique(name.into(), only_active));
        self
    }

    pub fn schemata(&self) -> Vec<String> {
        self.draft().schemata.clone()
    }

    pub fn property(&self, name: &str) -> Option<Property> {
        self.draft().properties.get(name).cloned()
    }

    pub fn files(&self) -> grano_core::FileSet {
        self.draft().files.clone()
    }

    pub fn criteria(&self) -> Vec<UniqueCriterion> {
        self.draft().criteria.iter().cloned().collect()
    }

    pub fn signature(&self) -> Signature {
        let mut signature = Signature::new();
        self.draft().extend_signature(&mut signature);
        signature
    }

    pub fn state(&self) -> BuildState {
        self.resolution.state()
    }

    pub fn diagnostic(&self) -> Option<Diagnostic> {
        match self.resolution.get() {
            Some(Outcome::Failed(diagnostic)) => Some(diagnostic.clone()),
            _ => None,
        }
    }

    /// Resolve against the server: update the matching entity, or create one.
    ///
    /// Returns `None` when the server rejected the data; the failure is kept
    /// as a [`Diagnostic`]. Repeated calls return the first outcome.
    pub async fn save(&self) -> Result<Option<Entity>> {
        let outcome = self.resolution.get_or_resolve(|| self.resolve()).await?;
        Ok(match outcome {
            Outcome::Resolved(entity) => Some(entity.clone()),
            Outcome::Failed(_) => None,
        })
    }

    /// The resolved entity, saving first if needed.
    pub async fn entity(&self) -> Result<Entity> {
        match self.save().await? {
            Some(entity) => Ok(entity),
            None => Err(LoaderError::Unresolved {
                kind: "Entity",
                message: self
                    .diagnostic()
                    .map(|d| d.message)
                    .unwrap_or_else(|| "validation failed".to_string()),
            }),
        }
    }

    async fn resolve(&self) -> Result<Outcome<Entity>> {
        let draft = self.draft().clone();
        let values = draft.unique_values()?;
        let mut signature = Signature::new();
        draft.extend_signature(&mut signature);

        let lock = self.loader.locks().lock_for(signature.key()?);
        let _guard = lock.lock().await;

        let query = apply_criteria(self.loader.project().entities()?.query(), &values);
        let page = query.page().await?;
        let candidates = page.results.len();

        let result = match page.results.into_iter().next() {
            None => self.create(&draft).await,
            Some(existing) => {
                if candidates > 1 {
                    tracing::warn!(
                        signature = %signature,
                        candidates,
                        total = page.total,
                        "Ambiguous entity match, updating the first"
                    );
                }
                self.update(existing, &draft, candidates).await
            }
        };

        contain_validation("Entity", &signature, result, |d| self.loader.note_failed(d))
    }

    async fn create(&self, draft: &Draft) -> grano_core::Result<Entity> {
        let mut data = ResourceData::new();
        data.set(
            "schemata",
            Value::Array(merge_schemata(None, &draft.schemata)),
        );
        data.set("properties", draft.properties_value());

        let entity = self
            .loader
            .project()
            .entities()?
            .create(data, &draft.files)
            .await?;
        self.loader.note_created();
        tracing::debug!(entity_id = entity.id().unwrap_or("?"), "Created entity");
        Ok(entity)
    }

    async fn update(&self, mut entity: Entity, draft: &Draft, candidates: usize) -> grano_core::Result<Entity> {
        let schemata = merge_schemata(entity.data().array("schemata"), &draft.schemata);
        entity.data_mut().set("schemata", Value::Array(schemata));
        draft.merge_properties(entity.data_mut());
        entity.files_mut().extend(draft.files.clone());

        entity.save().await?;
        self.loader.note_updated(candidates);
        tracing::debug!(entity_id = entity.id().unwrap_or("?"), "Updated entity");
        Ok(entity)
    }
}
