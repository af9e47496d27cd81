//! Relation builders: find-or-create relations between two entity builders.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use grano_client::Relation;
use grano_core::{Property, PropertyValue, ResourceData};

use crate::builder::{
    apply_criteria, contain_validation, BuildState, Diagnostic, Draft, Outcome, Resolution,
    UniqueCriterion,
};
use crate::entity::EntityBuilder;
use crate::error::{LoaderError, Result};
use crate::loader::Loader;
use crate::signature::Signature;

/// Describes one relation of a single schema. Source and target are entity
/// builders, resolved (if they are not yet) when the relation is saved.
#[derive(Debug)]
pub struct RelationBuilder {
    loader: Loader,
    schema: String,
    source: Arc<EntityBuilder>,
    target: Arc<EntityBuilder>,
    draft: Mutex<Draft>,
    resolution: Resolution<Relation>,
}

impl RelationBuilder {
    pub(crate) fn new(
        loader: Loader,
        schema: String,
        source: Arc<EntityBuilder>,
        target: Arc<EntityBuilder>,
        source_url: Option<String>,
    ) -> Self {
        Self {
            loader,
            draft: Mutex::new(Draft::new(vec![schema.clone()], source_url)),
            schema,
            source,
            target,
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
            tracing::debug!(action, ?state, "Relation already resolving, ignored");
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

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn schemata(&self) -> Vec<String> {
        self.draft().schemata.clone()
    }

    pub fn source(&self) -> &Arc<EntityBuilder> {
        &self.source
    }

    pub fn target(&self) -> &Arc<EntityBuilder> {
        &self.target
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

    /// Source signature, target signature, then this relation's own unique values.
    pub fn signature(&self) -> Signature {
        let draft = self.draft().clone();
        self.signature_of(&draft)
    }

    fn signature_of(&self, draft: &Draft) -> Signature {
        let mut signature = Signature::new();
        signature.push_nested(self.source.signature());
        signature.push_nested(self.target.signature());
        draft.extend_signature(&mut signature);
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

    /// Resolve both endpoints, then update the matching relation or create one.
    ///
    /// A rejected endpoint makes this fail with
    /// [`LoaderError::UnresolvedEndpoint`]; a rejected relation yields `None`.
    pub async fn save(&self) -> Result<Option<Relation>> {
        let outcome = self.resolution.get_or_resolve(|| self.resolve()).await?;
        Ok(match outcome {
            Outcome::Resolved(relation) => Some(relation.clone()),
            Outcome::Failed(_) => None,
        })
    }

    /// The resolved relation, saving first if needed.
    pub async fn relation(&self) -> Result<Relation> {
        match self.save().await? {
            Some(relation) => Ok(relation),
            None => Err(LoaderError::Unresolved {
                kind: "Relation",
                message: self
                    .diagnostic()
                    .map(|d| d.message)
                    .unwrap_or_else(|| "validation failed".to_string()),
            }),
        }
    }

    async fn resolve(&self) -> Result<Outcome<Relation>> {
        let source = self
            .source
            .save()
            .await?
            .ok_or(LoaderError::UnresolvedEndpoint { endpoint: "source" })?;
        let target = self
            .target
            .save()
            .await?
            .ok_or(LoaderError::UnresolvedEndpoint { endpoint: "target" })?;
        let source_id = source.id()?.to_string();
        let target_id = target.id()?.to_string();

        let draft = self.draft().clone();
        let values = draft.unique_values()?;
        let signature = self.signature_of(&draft);

        let lock = self.loader.locks().lock_for(signature.key()?);
        let _guard = lock.lock().await;

        let query = self
            .loader
            .project()
            .relations()?
            .query()
            .filter("source", source_id.as_str())
            .filter("target", target_id.as_str());
        let page = apply_criteria(query, &values).page().await?;
        let candidates = page.results.len();

        let result = match page.results.into_iter().next() {
            None => self.create(&draft, &source_id, &target_id).await,
            Some(existing) => {
                if candidates > 1 {
                    tracing::warn!(
                        signature = %signature,
                        candidates,
                        total = page.total,
                        "Ambiguous relation match, updating the first"
                    );
                }
                self.update(existing, &draft, &source_id, &target_id, candidates)
                    .await
            }
        };

        contain_validation("Relation", &signature, result, |d| self.loader.note_failed(d))
    }

    async fn create(&self, draft: &Draft, source_id: &str, target_id: &str) -> grano_core::Result<Relation> {
        let mut data = ResourceData::new();
        data.set("schema", self.schema.as_str());
        data.set("source", source_id);
        data.set("target", target_id);
        data.set("properties", draft.properties_value());

        let relation = self
            .loader
            .project()
            .relations()?
            .create(data, &draft.files)
            .await?;
        self.loader.note_created();
        tracing::debug!(
            relation_id = relation.id().unwrap_or("?"),
            schema = %self.schema,
            "Created relation"
        );
        Ok(relation)
    }

    async fn update(
        &self,
        mut relation: Relation,
        draft: &Draft,
        source_id: &str,
        target_id: &str,
        candidates: usize,
    ) -> grano_core::Result<Relation> {
        relation.set_schema(self.schema.as_str());
        relation.set_source(source_id);
        relation.set_target(target_id);
        draft.merge_properties(relation.data_mut());
        relation.files_mut().extend(draft.files.clone());

        relation.save().await?;
        self.loader.note_updated(candidates);
        tracing::debug!(relation_id = relation.id().unwrap_or("?"), "Updated relation");
        Ok(relation)
    }
}
