//! Entry point to a grano server.

use grano_core::{ClientConfig, Result};

use crate::client::Client;
use crate::entity::EntityCollection;
use crate::project::{Project, ProjectCollection};
use crate::relation::RelationCollection;

/// Access to the core grano APIs: projects, plus global (cross-project)
/// views of entities and relations. The project-scoped collections on
/// [`Project`] are usually the better choice for the latter.
///
/// ```rust,ignore
/// let grano = Grano::from_env()?;
/// let project = grano.project("my-project").await?;
/// let mut cursor = project.entities()?.all();
/// ```
#[derive(Debug, Clone)]
pub struct Grano {
    client: Client,
}

impl Grano {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Ok(Self {
            client: Client::new(config)?,
        })
    }

    /// Configure from `~/.grano.ini` and `GRANO_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn projects(&self) -> ProjectCollection {
        ProjectCollection::projects(self.client.clone())
    }

    pub async fn project(&self, slug: &str) -> Result<Project> {
        self.projects().by_slug(slug).await
    }

    pub fn entities(&self) -> EntityCollection {
        EntityCollection::entities(self.client.clone())
    }

    pub fn relations(&self) -> RelationCollection {
        RelationCollection::relations(self.client.clone())
    }
}
