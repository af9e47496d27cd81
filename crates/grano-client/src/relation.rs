//! Relations: directed, typed connections between two entities.

use grano_core::types::schema_name;
use grano_core::{FileBlob, FileSet, Result, ResourceData};
use serde_json::{Map, Value};

use crate::client::Client;
use crate::collection::{save_document, Collection, Resource};
use crate::entity::Entity;

pub const RELATIONS_ENDPOINT: &str = "/relations";

pub type RelationCollection = Collection<Relation>;

/// A relation connects a source entity to a target entity and can carry
/// properties of its own.
#[derive(Debug, Clone)]
pub struct Relation {
    client: Client,
    data: ResourceData,
    files: FileSet,
}

impl Resource for Relation {
    const KIND: &'static str = "Relation";
    type Scope = ();

    fn from_data(client: Client, _scope: &(), data: ResourceData) -> Self {
        Self {
            client,
            data,
            files: FileSet::new(),
        }
    }

    fn data(&self) -> &ResourceData {
        &self.data
    }

    fn prepare_create(data: &mut ResourceData) {
        normalize_references(data);
    }
}

impl Relation {
    pub fn id(&self) -> Result<&str> {
        self.data.require_str(Self::KIND, "id")
    }

    pub fn endpoint(&self) -> Result<String> {
        Ok(format!("{RELATIONS_ENDPOINT}/{}", self.id()?))
    }

    pub fn data_mut(&mut self) -> &mut ResourceData {
        &mut self.data
    }

    /// Name of the relation's schema.
    pub fn schema(&self) -> Option<&str> {
        self.data.get("schema").and_then(schema_name)
    }

    pub fn set_schema(&mut self, schema: impl Into<String>) {
        self.data.set("schema", schema.into());
    }

    pub fn source_id(&self) -> Option<&str> {
        self.data.get("source").and_then(reference_id)
    }

    pub fn target_id(&self) -> Option<&str> {
        self.data.get("target").and_then(reference_id)
    }

    /// The source entity, when the server embedded its document.
    pub fn source(&self) -> Option<Entity> {
        self.embedded_entity("source")
    }

    /// The target entity, when the server embedded its document.
    pub fn target(&self) -> Option<Entity> {
        self.embedded_entity("target")
    }

    pub fn set_source(&mut self, entity_id: impl Into<String>) {
        self.data.set("source", entity_id.into());
    }

    pub fn set_target(&mut self, entity_id: impl Into<String>) {
        self.data.set("target", entity_id.into());
    }

    pub fn properties(&self) -> Option<&Map<String, Value>> {
        self.data.object("properties")
    }

    pub fn property_value(&self, name: &str) -> Option<&str> {
        self.properties()?
            .get(name)?
            .get("value")
            .and_then(Value::as_str)
    }

    pub fn files(&self) -> &FileSet {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut FileSet {
        &mut self.files
    }

    pub fn attach(&mut self, property: impl Into<String>, file: FileBlob) {
        self.files.insert(property.into(), file);
    }

    /// Write the full document (and queued files) back to the server.
    pub async fn save(&mut self) -> Result<()> {
        let endpoint = self.endpoint()?;
        normalize_references(&mut self.data);
        self.data = save_document(&self.client, &endpoint, &self.data, &self.files).await?;
        self.files.clear();
        tracing::debug!(endpoint = %endpoint, "Saved relation");
        Ok(())
    }

    fn embedded_entity(&self, key: &str) -> Option<Entity> {
        let doc = self.data.object(key)?;
        Some(Entity::from_data(
            self.client.clone(),
            &(),
            ResourceData::from(doc.clone()),
        ))
    }
}

impl RelationCollection {
    /// All relations on the server, across projects.
    pub fn relations(client: Client) -> Self {
        Collection::new(client, RELATIONS_ENDPOINT, ())
    }

    pub async fn by_id(&self, id: &str) -> Result<Relation> {
        self.by_key(id).await
    }
}

/// Id of an entity reference, given either as a plain id or as an embedded document.
fn reference_id(value: &Value) -> Option<&str> {
    match value {
        Value::String(id) => Some(id.as_str()),
        Value::Object(doc) => doc.get("id").and_then(Value::as_str),
        _ => None,
    }
}

/// Reduce schema and endpoint references to names and ids.
fn normalize_references(data: &mut ResourceData) {
    if let Some(name) = data.get("schema").and_then(schema_name).map(str::to_string) {
        data.set("schema", name);
    }
    for key in ["source", "target"] {
        if let Some(id) = data.get(key).and_then(reference_id).map(str::to_string) {
            data.set(key, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryServer;
    use serde_json::json;

    #[test]
    fn test_normalize_references() {
        let mut data = ResourceData::from_value(json!({
            "schema": {"name": "knows"},
            "source": {"id": "e1", "properties": {}},
            "target": "e2"
        }))
        .unwrap();
        normalize_references(&mut data);
        assert_eq!(data.str("schema"), Some("knows"));
        assert_eq!(data.str("source"), Some("e1"));
        assert_eq!(data.str("target"), Some("e2"));
    }

    #[tokio::test]
    async fn test_relation_accessors_and_retarget() {
        let server = MemoryServer::new();
        server.insert_project("demo", "Demo");
        let a = server.insert_entity("demo", &["base"], &[("name", "A")]);
        let b = server.insert_entity("demo", &["base"], &[("name", "B")]);
        let c = server.insert_entity("demo", &["base"], &[("name", "C")]);
        let rel_id = server.insert_relation("demo", "knows", &a, &b, &[("since", "2001")]);

        let relations = RelationCollection::relations(server.client());
        let mut relation = relations.by_id(&rel_id).await.unwrap();
        assert_eq!(relation.schema(), Some("knows"));
        assert_eq!(relation.source_id(), Some(a.as_str()));
        assert_eq!(relation.target().unwrap().id().unwrap(), b);
        assert_eq!(relation.property_value("since"), Some("2001"));

        relation.set_target(c.clone());
        relation.save().await.unwrap();
        assert_eq!(relation.target_id(), Some(c.as_str()));
    }
}
