//! Entities: the nodes of a grano project graph.

use grano_core::types::schema_name;
use grano_core::{FileBlob, FileSet, Result, ResourceData};
use serde_json::{Map, Value};

use crate::client::{expect_success, Client};
use crate::collection::{save_document, Collection, Resource};
use crate::project::Project;
use crate::relation::RelationCollection;

pub const ENTITIES_ENDPOINT: &str = "/entities";

pub type EntityCollection = Collection<Entity>;

/// An entity stores data as properties and takes part in relations.
#[derive(Debug, Clone)]
pub struct Entity {
    client: Client,
    data: ResourceData,
    files: FileSet,
}

impl Resource for Entity {
    const KIND: &'static str = "Entity";
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
        normalize_schemata(data);
    }
}

impl Entity {
    pub fn id(&self) -> Result<&str> {
        self.data.require_str(Self::KIND, "id")
    }

    pub fn endpoint(&self) -> Result<String> {
        Ok(format!("{ENTITIES_ENDPOINT}/{}", self.id()?))
    }

    pub fn data_mut(&mut self) -> &mut ResourceData {
        &mut self.data
    }

    /// Names of the schemata the entity belongs to.
    pub fn schemata(&self) -> Vec<&str> {
        self.data
            .array("schemata")
            .into_iter()
            .flatten()
            .filter_map(schema_name)
            .collect()
    }

    pub fn properties(&self) -> Option<&Map<String, Value>> {
        self.data.object("properties")
    }

    /// Current value of a property.
    pub fn property_value(&self, name: &str) -> Option<&str> {
        self.properties()?
            .get(name)?
            .get("value")
            .and_then(Value::as_str)
    }

    /// The project this entity belongs to, as embedded in the document.
    pub fn project(&self) -> Option<Project> {
        let project = self.data.object("project")?;
        Some(Project::from_data(
            self.client.clone(),
            &(),
            ResourceData::from(project.clone()),
        ))
    }

    /// Relations pointing at this entity.
    pub fn inbound(&self) -> Result<RelationCollection> {
        Ok(RelationCollection::relations(self.client.clone()).scoped("target", self.id()?))
    }

    /// Relations starting at this entity.
    pub fn outbound(&self) -> Result<RelationCollection> {
        Ok(RelationCollection::relations(self.client.clone()).scoped("source", self.id()?))
    }

    /// The neighbourhood graph around this entity, up to `depth` hops.
    pub async fn graph(&self, depth: u32) -> Result<Value> {
        let endpoint = format!("{}/graph", self.endpoint()?);
        expect_success(
            self.client
                .get(&endpoint, &[("depth".to_string(), depth.to_string())])
                .await?,
        )
    }

    /// Files queued for upload with the next [`Entity::save`].
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
        normalize_schemata(&mut self.data);
        self.data = save_document(&self.client, &endpoint, &self.data, &self.files).await?;
        self.files.clear();
        tracing::debug!(endpoint = %endpoint, "Saved entity");
        Ok(())
    }

    /// Re-fetch the document from the server.
    pub async fn reload(&mut self) -> Result<()> {
        let body = expect_success(self.client.get(&self.endpoint()?, &[]).await?)?;
        self.data = ResourceData::from_value(body)?;
        Ok(())
    }
}

impl EntityCollection {
    /// All entities on the server, across projects.
    pub fn entities(client: Client) -> Self {
        Collection::new(client, ENTITIES_ENDPOINT, ())
    }

    pub async fn by_id(&self, id: &str) -> Result<Entity> {
        self.by_key(id).await
    }
}

/// Reduce schema references to their names.
fn normalize_schemata(data: &mut ResourceData) {
    if data.array("schemata").is_none() {
        return;
    }
    let schemata = data.array_mut("schemata");
    for schema in schemata.iter_mut() {
        if let Some(name) = schema_name(schema).map(str::to_string) {
            *schema = Value::String(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryServer;
    use serde_json::json;

    #[test]
    fn test_normalize_schemata() {
        let mut data = ResourceData::from_value(json!({
            "schemata": [{"name": "base", "label": "Base"}, "person"]
        }))
        .unwrap();
        normalize_schemata(&mut data);
        assert_eq!(data.get("schemata"), Some(&json!(["base", "person"])));
    }

    #[tokio::test]
    async fn test_entity_accessors_and_save() {
        let server = MemoryServer::new();
        server.insert_project("demo", "Demo");
        let id = server.insert_entity("demo", &["base", "person"], &[("name", "Alice")]);

        let entities = EntityCollection::entities(server.client());
        let mut entity = entities.by_id(&id).await.unwrap();
        assert_eq!(entity.id().unwrap(), id);
        assert_eq!(entity.schemata(), vec!["base", "person"]);
        assert_eq!(entity.property_value("name"), Some("Alice"));
        assert_eq!(entity.project().unwrap().slug().unwrap(), "demo");

        entity
            .data_mut()
            .object_mut("properties")
            .insert("city".into(), json!({"name": "city", "value": "Berlin", "active": true}));
        entity.attach("photo", FileBlob::new("alice.png", vec![1, 2, 3]));
        entity.save().await.unwrap();

        assert!(entity.files().is_empty());
        let reloaded = entities.by_id(&id).await.unwrap();
        assert_eq!(reloaded.property_value("city"), Some("Berlin"));
        assert_eq!(server.last_request().unwrap().files, vec!["photo".to_string()]);
    }

    #[tokio::test]
    async fn test_entity_relation_directions() {
        let server = MemoryServer::new();
        server.insert_project("demo", "Demo");
        let a = server.insert_entity("demo", &["base"], &[("name", "A")]);
        let b = server.insert_entity("demo", &["base"], &[("name", "B")]);
        server.insert_relation("demo", "knows", &a, &b, &[]);

        let entities = EntityCollection::entities(server.client());
        let entity_a = entities.by_id(&a).await.unwrap();
        let entity_b = entities.by_id(&b).await.unwrap();

        let outbound = entity_a.outbound().unwrap().all().try_collect().await.unwrap();
        assert_eq!(outbound.len(), 1);
        let inbound = entity_a.inbound().unwrap().all().try_collect().await.unwrap();
        assert!(inbound.is_empty());
        let inbound_b = entity_b.inbound().unwrap().all().try_collect().await.unwrap();
        assert_eq!(inbound_b.len(), 1);
    }

    #[tokio::test]
    async fn test_entity_graph() {
        let server = MemoryServer::new();
        server.insert_project("demo", "Demo");
        let id = server.insert_entity("demo", &["base"], &[("name", "A")]);

        let entity = EntityCollection::entities(server.client())
            .by_id(&id)
            .await
            .unwrap();
        let graph = entity.graph(2).await.unwrap();
        assert_eq!(graph["depth"], 2);
    }
}
