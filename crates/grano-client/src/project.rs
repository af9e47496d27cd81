//! Projects: the namespaces holding a graph's schemata, entities and relations.

use grano_core::{FileSet, Result, ResourceData};

use crate::client::Client;
use crate::collection::{save_document, Collection, Resource};
use crate::entity::EntityCollection;
use crate::relation::RelationCollection;
use crate::schema::SchemaCollection;

pub const PROJECTS_ENDPOINT: &str = "/projects";

pub type ProjectCollection = Collection<Project>;

#[derive(Debug, Clone)]
pub struct Project {
    client: Client,
    data: ResourceData,
}

impl Resource for Project {
    const KIND: &'static str = "Project";
    type Scope = ();

    fn from_data(client: Client, _scope: &(), data: ResourceData) -> Self {
        Self { client, data }
    }

    fn data(&self) -> &ResourceData {
        &self.data
    }
}

impl Project {
    pub fn slug(&self) -> Result<&str> {
        self.data.require_str(Self::KIND, "slug")
    }

    pub fn label(&self) -> Option<&str> {
        self.data.str("label")
    }

    pub fn endpoint(&self) -> Result<String> {
        Ok(format!("{PROJECTS_ENDPOINT}/{}", self.slug()?))
    }

    pub fn data_mut(&mut self) -> &mut ResourceData {
        &mut self.data
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Entities of this project.
    pub fn entities(&self) -> Result<EntityCollection> {
        Ok(EntityCollection::entities(self.client.clone()).scoped("project", self.slug()?))
    }

    /// Relations of this project.
    pub fn relations(&self) -> Result<RelationCollection> {
        Ok(RelationCollection::relations(self.client.clone()).scoped("project", self.slug()?))
    }

    /// Schemata defined in this project.
    pub fn schemata(&self) -> Result<SchemaCollection> {
        Ok(SchemaCollection::schemata(self.client.clone(), self.slug()?))
    }

    pub async fn save(&mut self) -> Result<()> {
        let endpoint = self.endpoint()?;
        self.data = save_document(&self.client, &endpoint, &self.data, &FileSet::new()).await?;
        Ok(())
    }
}

impl ProjectCollection {
    pub fn projects(client: Client) -> Self {
        Collection::new(client, PROJECTS_ENDPOINT, ())
    }

    pub async fn by_slug(&self, slug: &str) -> Result<Project> {
        self.by_key(slug).await
    }
}
