//! Schemata: the entity and relation types defined within a project.

use grano_core::{FileSet, Result, ResourceData};

use crate::client::Client;
use crate::collection::{save_document, Collection, Resource};

pub type SchemaCollection = Collection<Schema>;

#[derive(Debug, Clone)]
pub struct Schema {
    client: Client,
    project_slug: String,
    data: ResourceData,
}

impl Resource for Schema {
    const KIND: &'static str = "Schema";
    /// Slug of the owning project.
    type Scope = String;

    fn from_data(client: Client, scope: &String, data: ResourceData) -> Self {
        Self {
            client,
            project_slug: scope.clone(),
            data,
        }
    }

    fn data(&self) -> &ResourceData {
        &self.data
    }
}

impl Schema {
    pub fn name(&self) -> Result<&str> {
        self.data.require_str(Self::KIND, "name")
    }

    pub fn label(&self) -> Option<&str> {
        self.data.str("label")
    }

    pub fn project_slug(&self) -> &str {
        &self.project_slug
    }

    pub fn endpoint(&self) -> Result<String> {
        Ok(format!(
            "{}/{}",
            schemata_endpoint(&self.project_slug),
            self.name()?
        ))
    }

    pub fn data_mut(&mut self) -> &mut ResourceData {
        &mut self.data
    }

    pub async fn save(&mut self) -> Result<()> {
        let endpoint = self.endpoint()?;
        self.data = save_document(&self.client, &endpoint, &self.data, &FileSet::new()).await?;
        Ok(())
    }
}

impl SchemaCollection {
    pub fn schemata(client: Client, project_slug: &str) -> Self {
        Collection::new(
            client,
            schemata_endpoint(project_slug),
            project_slug.to_string(),
        )
    }

    pub async fn by_name(&self, name: &str) -> Result<Schema> {
        self.by_key(name).await
    }
}

fn schemata_endpoint(project_slug: &str) -> String {
    format!("/projects/{project_slug}/schemata")
}
