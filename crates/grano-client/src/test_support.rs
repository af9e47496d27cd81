//! In-memory grano server for tests.
//!
//! [`MemoryServer`] implements [`Transport`] and answers the subset of the
//! grano API used by this client: project, schema, entity and relation
//! collections with `property-*` / `property-aliases-*` filters, pagination
//! via `next_url` / `prev_url`, and 400/404 error bodies. Every request is
//! recorded so tests can assert on the traffic a client produced.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use grano_core::types::schema_name;
use grano_core::{ClientConfig, GranoError, Result};
use reqwest::Url;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::client::Client;
use crate::transport::{ApiRequest, Method, RawResponse, Transport};

pub const TEST_HOST: &str = "http://grano.test";

const DEFAULT_PAGE_SIZE: usize = 50;

/// A request as seen by the server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    /// Path below the API prefix, e.g. `entities/<id>`.
    pub path: String,
    pub params: BTreeMap<String, String>,
    pub data: Option<Value>,
    /// Names of the uploaded file parts.
    pub files: Vec<String>,
}

#[derive(Debug, Clone)]
struct Stored {
    doc: Map<String, Value>,
    /// Every value each property has ever had, current value included.
    aliases: BTreeMap<String, Vec<String>>,
}

#[derive(Debug)]
struct State {
    base_url: String,
    page_size: usize,
    latency: Option<Duration>,
    projects: Vec<Map<String, Value>>,
    schemata: Vec<(String, Map<String, Value>)>,
    entities: Vec<Stored>,
    relations: Vec<Stored>,
    required_properties: Vec<String>,
    rejected_schemata: Vec<String>,
    /// Canned answers for `(method, path)`, served instead of the real handler.
    faults: Vec<(Method, String, RawResponse)>,
    requests: Vec<RecordedRequest>,
}

/// Shared handle to an in-memory grano server. Clones see the same data.
#[derive(Clone)]
pub struct MemoryServer {
    config: ClientConfig,
    state: Arc<Mutex<State>>,
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryServer {
    pub fn new() -> Self {
        let config = ClientConfig::default().with_host(TEST_HOST);
        Self {
            state: Arc::new(Mutex::new(State {
                base_url: config.base_url(),
                page_size: DEFAULT_PAGE_SIZE,
                latency: None,
                projects: Vec::new(),
                schemata: Vec::new(),
                entities: Vec::new(),
                relations: Vec::new(),
                required_properties: Vec::new(),
                rejected_schemata: Vec::new(),
                faults: Vec::new(),
                requests: Vec::new(),
            })),
            config,
        }
    }

    /// Default number of results per page when a query sets no `limit`.
    pub fn with_page_size(self, page_size: usize) -> Self {
        self.state().page_size = page_size.max(1);
        self
    }

    /// Delay every request, widening the window for interleavings.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state().latency = Some(latency);
        self
    }

    pub fn config(&self) -> ClientConfig {
        self.config.clone()
    }

    /// A client whose requests are answered by this server.
    pub fn client(&self) -> Client {
        Client::with_transport(self.config(), Arc::new(self.clone()))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Seeding and failure injection ─────────────────────────────

    pub fn insert_project(&self, slug: &str, label: &str) {
        let mut doc = Map::new();
        doc.insert("slug".into(), json!(slug));
        doc.insert("label".into(), json!(label));
        self.state().projects.push(doc);
    }

    /// Insert an entity directly, bypassing validation. Returns its id.
    pub fn insert_entity(&self, project: &str, schemata: &[&str], properties: &[(&str, &str)]) -> String {
        let mut state = self.state();
        let doc = json!({
            "project": project,
            "schemata": schemata,
            "properties": property_docs(properties),
        });
        let body = doc.as_object().cloned().unwrap_or_default();
        let stored = state.build_entity(None, &body, &[]);
        let id = stored.doc["id"].as_str().unwrap_or_default().to_string();
        state.entities.push(stored);
        id
    }

    /// Insert a relation directly, bypassing validation. Returns its id.
    pub fn insert_relation(
        &self,
        project: &str,
        schema: &str,
        source: &str,
        target: &str,
        properties: &[(&str, &str)],
    ) -> String {
        let mut state = self.state();
        let doc = json!({
            "project": project,
            "schema": schema,
            "source": source,
            "target": target,
            "properties": property_docs(properties),
        });
        let body = doc.as_object().cloned().unwrap_or_default();
        let stored = state.build_relation(None, &body, &[]);
        let id = stored.doc["id"].as_str().unwrap_or_default().to_string();
        state.relations.push(stored);
        id
    }

    /// Reject entity writes that lack a value for `name`.
    pub fn require_property(&self, name: &str) {
        self.state().required_properties.push(name.to_string());
    }

    /// Reject any write that uses schema `name`.
    pub fn reject_schema(&self, name: &str) {
        self.state().rejected_schemata.push(name.to_string());
    }

    /// Answer every `method` request to `path` (below the API prefix) with
    /// the given status and raw body.
    pub fn fail_requests(&self, method: Method, path: &str, status: u16, body: &str) {
        self.state()
            .faults
            .push((method, path.to_string(), RawResponse::new(status, body)));
    }

    // ── Inspection ────────────────────────────────────────────────

    pub fn entities(&self) -> Vec<Value> {
        let state = self.state();
        state.entities.iter().map(|e| Value::Object(e.doc.clone())).collect()
    }

    pub fn entity(&self, id: &str) -> Option<Value> {
        let state = self.state();
        state
            .find_entity(id)
            .map(|e| Value::Object(e.doc.clone()))
    }

    pub fn relations(&self) -> Vec<Value> {
        let state = self.state();
        state
            .relations
            .iter()
            .map(|r| state.render_relation(r))
            .collect()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state().requests.clone()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.state().requests.last().cloned()
    }

    /// Number of requests with the given method whose path starts with `path`.
    pub fn count_requests(&self, method: Method, path: &str) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|r| r.method == method && r.path.starts_with(path))
            .count()
    }

    pub fn clear_requests(&self) {
        self.state().requests.clear();
    }

    // ── Request handling ──────────────────────────────────────────

    fn handle(&self, request: ApiRequest) -> Result<RawResponse> {
        let url = Url::parse(&request.url).map_err(|e| GranoError::Transport(e.to_string()))?;
        let base = Url::parse(&self.config.base_url())
            .map_err(|e| GranoError::Transport(e.to_string()))?;
        let Some(path) = url.path().strip_prefix(base.path()) else {
            return Ok(error(404, "NotFound", "Unknown API path"));
        };
        let path = path.trim_end_matches('/').to_string();

        let mut params: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
        params.extend(request.params.iter().cloned());

        let data = match request.data.as_deref() {
            Some(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(value) => Some(value),
                Err(_) => return Ok(error(400, "Invalid", "data: not valid JSON")),
            },
            None => None,
        };
        let files: Vec<String> = request.files.keys().cloned().collect();

        let mut state = self.state();
        state.requests.push(RecordedRequest {
            method: request.method,
            path: path.clone(),
            params: params.clone(),
            data: data.clone(),
            files: files.clone(),
        });

        let fault = state
            .faults
            .iter()
            .find(|(method, fault_path, _)| *method == request.method && *fault_path == path)
            .map(|(_, _, response)| response.clone());
        if let Some(response) = fault {
            return Ok(response);
        }

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let body = data.as_ref().and_then(Value::as_object).cloned().unwrap_or_default();
        let file_names: Vec<(String, String)> = request
            .files
            .iter()
            .map(|(name, blob)| (name.clone(), blob.file_name.clone()))
            .collect();

        let response = match (request.method, segments.as_slice()) {
            (Method::Get, ["projects"]) => {
                let docs: Vec<Value> = state.projects.iter().cloned().map(Value::Object).collect();
                state.paginate(&path, &params, docs)
            }
            (Method::Get, ["projects", slug]) => match state.find_project(slug) {
                Some(doc) => ok(200, Value::Object(doc.clone())),
                None => not_found("Project"),
            },
            (Method::Post, ["projects"]) => state.create_project(&body),
            (Method::Post, ["projects", slug]) => state.update_project(slug, &body),
            (Method::Get, ["projects", slug, "schemata"]) => {
                let docs: Vec<Value> = state
                    .schemata
                    .iter()
                    .filter(|(project, _)| project == slug)
                    .map(|(_, doc)| Value::Object(doc.clone()))
                    .collect();
                state.paginate(&path, &params, docs)
            }
            (Method::Get, ["projects", slug, "schemata", name]) => {
                match state.find_schema(slug, name) {
                    Some(doc) => ok(200, Value::Object(doc.clone())),
                    None => not_found("Schema"),
                }
            }
            (Method::Post, ["projects", slug, "schemata"]) => state.save_schema(slug, None, &body),
            (Method::Post, ["projects", slug, "schemata", name]) => {
                state.save_schema(slug, Some(*name), &body)
            }
            (Method::Get, ["entities"]) => {
                let docs: Vec<Value> = state
                    .entities
                    .iter()
                    .filter(|e| matches_filters(e, &params))
                    .map(|e| Value::Object(e.doc.clone()))
                    .collect();
                state.paginate(&path, &params, docs)
            }
            (Method::Get, ["entities", id]) => match state.find_entity(id) {
                Some(entity) => ok(200, Value::Object(entity.doc.clone())),
                None => not_found("Entity"),
            },
            (Method::Get, ["entities", id, "graph"]) => state.entity_graph(id, &params),
            (Method::Post, ["entities"]) => state.write_entity(None, &body, &file_names),
            (Method::Post, ["entities", id]) => state.write_entity(Some(*id), &body, &file_names),
            (Method::Get, ["relations"]) => {
                let docs: Vec<Value> = state
                    .relations
                    .iter()
                    .filter(|r| matches_filters(r, &params))
                    .map(|r| state.render_relation(r))
                    .collect();
                state.paginate(&path, &params, docs)
            }
            (Method::Get, ["relations", id]) => match state.find_relation(id) {
                Some(relation) => ok(200, state.render_relation(relation)),
                None => not_found("Relation"),
            },
            (Method::Post, ["relations"]) => state.write_relation(None, &body, &file_names),
            (Method::Post, ["relations", id]) => {
                state.write_relation(Some(*id), &body, &file_names)
            }
            _ => error(404, "NotFound", "Unknown API path"),
        };

        Ok(response)
    }
}

#[async_trait::async_trait]
impl Transport for MemoryServer {
    async fn send(&self, request: ApiRequest) -> Result<RawResponse> {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.handle(request)
    }
}

impl State {
    fn find_project(&self, slug: &str) -> Option<&Map<String, Value>> {
        self.projects
            .iter()
            .find(|p| p.get("slug").and_then(Value::as_str) == Some(slug))
    }

    fn find_schema(&self, project: &str, name: &str) -> Option<&Map<String, Value>> {
        self.schemata
            .iter()
            .find(|(p, doc)| p == project && doc.get("name").and_then(Value::as_str) == Some(name))
            .map(|(_, doc)| doc)
    }

    fn find_entity(&self, id: &str) -> Option<&Stored> {
        self.entities
            .iter()
            .find(|e| e.doc.get("id").and_then(Value::as_str) == Some(id))
    }

    fn find_relation(&self, id: &str) -> Option<&Stored> {
        self.relations
            .iter()
            .find(|r| r.doc.get("id").and_then(Value::as_str) == Some(id))
    }

    fn paginate(&self, path: &str, params: &BTreeMap<String, String>, docs: Vec<Value>) -> RawResponse {
        let total = docs.len();
        let limit = params
            .get("limit")
            .and_then(|l| l.parse().ok())
            .unwrap_or(self.page_size)
            .max(1);
        let offset: usize = params
            .get("offset")
            .and_then(|o| o.parse().ok())
            .unwrap_or(0);

        let results: Vec<Value> = docs.into_iter().skip(offset).take(limit).collect();
        let link = |offset: usize| {
            let Ok(mut url) = Url::parse(&format!("{}{path}", self.base_url)) else {
                return Value::Null;
            };
            url.query_pairs_mut()
                .extend_pairs(params.iter().filter(|(k, _)| *k != "offset" && *k != "limit"))
                .append_pair("limit", &limit.to_string())
                .append_pair("offset", &offset.to_string());
            Value::String(url.to_string())
        };
        let next_url = if offset + limit < total {
            link(offset + limit)
        } else {
            Value::Null
        };
        let prev_url = if offset > 0 {
            link(offset.saturating_sub(limit))
        } else {
            Value::Null
        };

        ok(
            200,
            json!({
                "results": results,
                "total": total,
                "next_url": next_url,
                "prev_url": prev_url,
            }),
        )
    }

    fn create_project(&mut self, body: &Map<String, Value>) -> RawResponse {
        let Some(slug) = body.get("slug").and_then(Value::as_str) else {
            return error(400, "Invalid", "slug: Required");
        };
        if self.find_project(slug).is_some() {
            return error(400, "Invalid", "slug: Already exists");
        }
        self.projects.push(body.clone());
        ok(201, Value::Object(body.clone()))
    }

    fn update_project(&mut self, slug: &str, body: &Map<String, Value>) -> RawResponse {
        let Some(project) = self
            .projects
            .iter_mut()
            .find(|p| p.get("slug").and_then(Value::as_str) == Some(slug))
        else {
            return not_found("Project");
        };
        for (k, v) in body {
            if k != "slug" {
                project.insert(k.clone(), v.clone());
            }
        }
        ok(200, Value::Object(project.clone()))
    }

    fn save_schema(&mut self, project: &str, name: Option<&str>, body: &Map<String, Value>) -> RawResponse {
        if self.find_project(project).is_none() {
            return not_found("Project");
        }
        let Some(new_name) = body.get("name").and_then(Value::as_str).or(name) else {
            return error(400, "Invalid", "name: Required");
        };
        let mut doc = body.clone();
        doc.insert("name".into(), json!(new_name));
        match name {
            Some(name) => {
                let Some(slot) = self
                    .schemata
                    .iter_mut()
                    .find(|(p, d)| p == project && d.get("name").and_then(Value::as_str) == Some(name))
                else {
                    return not_found("Schema");
                };
                slot.1 = doc.clone();
                ok(200, Value::Object(doc))
            }
            None => {
                self.schemata.push((project.to_string(), doc.clone()));
                ok(201, Value::Object(doc))
            }
        }
    }

    fn project_ref(&self, value: Option<&Value>) -> Option<Value> {
        let slug = match value? {
            Value::String(slug) => slug.as_str(),
            Value::Object(doc) => doc.get("slug")?.as_str()?,
            _ => return None,
        };
        self.find_project(slug)
            .map(|p| json!({"slug": p.get("slug"), "label": p.get("label")}))
    }

    fn validate_schemata(&self, names: &[String]) -> Option<RawResponse> {
        names
            .iter()
            .find(|n| self.rejected_schemata.contains(n))
            .map(|n| error(400, "Invalid", &format!("schemata: {n} is not permitted")))
    }

    fn build_entity(&self, id: Option<&str>, body: &Map<String, Value>, files: &[(String, String)]) -> Stored {
        let id = id.map(str::to_string).unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let mut names: Vec<String> = Vec::new();
        for name in body
            .get("schemata")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(schema_name)
        {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }

        let properties = normalize_properties(body.get("properties"), files);
        let mut doc = Map::new();
        doc.insert("id".into(), json!(id));
        doc.insert(
            "project".into(),
            self.project_ref(body.get("project")).unwrap_or(Value::Null),
        );
        doc.insert(
            "schemata".into(),
            Value::Array(names.iter().map(|n| json!({"name": n})).collect()),
        );
        doc.insert("properties".into(), Value::Object(properties));

        let mut stored = Stored {
            doc,
            aliases: BTreeMap::new(),
        };
        stored.record_aliases();
        stored
    }

    fn write_entity(&mut self, id: Option<&str>, body: &Map<String, Value>, files: &[(String, String)]) -> RawResponse {
        if self.project_ref(body.get("project")).is_none() {
            return error(400, "Invalid", "project: Required");
        }
        let schemata: Vec<String> = body
            .get("schemata")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(schema_name)
            .map(str::to_string)
            .collect();
        if schemata.is_empty() {
            return error(400, "Invalid", "schemata: Required");
        }
        if let Some(rejection) = self.validate_schemata(&schemata) {
            return rejection;
        }
        let properties = normalize_properties(body.get("properties"), files);
        for required in &self.required_properties {
            let present = properties
                .get(required)
                .and_then(|p| p.get("value"))
                .is_some_and(|v| !v.is_null());
            if !present {
                return error(400, "Invalid", &format!("properties.{required}: Required"));
            }
        }

        match id {
            Some(id) => {
                let Some(index) = self
                    .entities
                    .iter()
                    .position(|e| e.doc.get("id").and_then(Value::as_str) == Some(id))
                else {
                    return not_found("Entity");
                };
                let mut updated = self.build_entity(Some(id), body, files);
                let mut aliases = self.entities[index].aliases.clone();
                for (name, values) in updated.aliases {
                    let known = aliases.entry(name).or_default();
                    for value in values {
                        if !known.contains(&value) {
                            known.push(value);
                        }
                    }
                }
                updated.aliases = aliases;
                let doc = updated.doc.clone();
                self.entities[index] = updated;
                ok(200, Value::Object(doc))
            }
            None => {
                let stored = self.build_entity(None, body, files);
                let doc = stored.doc.clone();
                self.entities.push(stored);
                ok(201, Value::Object(doc))
            }
        }
    }

    fn build_relation(&self, id: Option<&str>, body: &Map<String, Value>, files: &[(String, String)]) -> Stored {
        let id = id.map(str::to_string).unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let reference = |key: &str| match body.get(key) {
            Some(Value::String(id)) => json!(id),
            Some(Value::Object(doc)) => doc.get("id").cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        };
        let schema = body.get("schema").and_then(schema_name).map(str::to_string);

        let mut doc = Map::new();
        doc.insert("id".into(), json!(id));
        doc.insert(
            "project".into(),
            self.project_ref(body.get("project")).unwrap_or(Value::Null),
        );
        doc.insert("schema".into(), json!({"name": schema}));
        doc.insert("source".into(), reference("source"));
        doc.insert("target".into(), reference("target"));
        doc.insert(
            "properties".into(),
            Value::Object(normalize_properties(body.get("properties"), files)),
        );

        let mut stored = Stored {
            doc,
            aliases: BTreeMap::new(),
        };
        stored.record_aliases();
        stored
    }

    fn write_relation(&mut self, id: Option<&str>, body: &Map<String, Value>, files: &[(String, String)]) -> RawResponse {
        if self.project_ref(body.get("project")).is_none() {
            return error(400, "Invalid", "project: Required");
        }
        let Some(schema) = body.get("schema").and_then(schema_name).map(str::to_string) else {
            return error(400, "Invalid", "schema: Required");
        };
        if let Some(rejection) = self.validate_schemata(&[schema]) {
            return rejection;
        }

        let stored = self.build_relation(id, body, files);
        for key in ["source", "target"] {
            let endpoint = stored.doc.get(key).and_then(Value::as_str);
            if endpoint.and_then(|e| self.find_entity(e)).is_none() {
                return error(400, "Invalid", &format!("{key}: Unknown entity"));
            }
        }
        let rendered = self.render_relation(&stored);

        match id {
            Some(id) => {
                let Some(index) = self
                    .relations
                    .iter()
                    .position(|r| r.doc.get("id").and_then(Value::as_str) == Some(id))
                else {
                    return not_found("Relation");
                };
                self.relations[index] = stored;
                ok(200, rendered)
            }
            None => {
                self.relations.push(stored);
                ok(201, rendered)
            }
        }
    }

    /// Relation document with its endpoints embedded as entity documents.
    fn render_relation(&self, relation: &Stored) -> Value {
        let mut doc = relation.doc.clone();
        for key in ["source", "target"] {
            let embedded = doc
                .get(key)
                .and_then(Value::as_str)
                .and_then(|id| self.find_entity(id))
                .map(|e| Value::Object(e.doc.clone()));
            if let Some(embedded) = embedded {
                doc.insert(key.to_string(), embedded);
            }
        }
        Value::Object(doc)
    }

    fn entity_graph(&self, id: &str, params: &BTreeMap<String, String>) -> RawResponse {
        let Some(entity) = self.find_entity(id) else {
            return not_found("Entity");
        };
        let depth: u64 = params.get("depth").and_then(|d| d.parse().ok()).unwrap_or(1);
        let edges: Vec<Value> = self
            .relations
            .iter()
            .filter(|r| {
                r.doc.get("source").and_then(Value::as_str) == Some(id)
                    || r.doc.get("target").and_then(Value::as_str) == Some(id)
            })
            .map(|r| Value::Object(r.doc.clone()))
            .collect();
        ok(
            200,
            json!({"depth": depth, "nodes": [Value::Object(entity.doc.clone())], "edges": edges}),
        )
    }
}

impl Stored {
    fn record_aliases(&mut self) {
        let Some(properties) = self.doc.get("properties").and_then(Value::as_object) else {
            return;
        };
        for (name, prop) in properties {
            if let Some(value) = prop.get("value").and_then(Value::as_str) {
                let known = self.aliases.entry(name.clone()).or_default();
                if !known.iter().any(|v| v == value) {
                    known.push(value.to_string());
                }
            }
        }
    }

    fn current_value(&self, name: &str) -> Option<&str> {
        self.doc
            .get("properties")?
            .get(name)?
            .get("value")?
            .as_str()
    }

    fn reference(&self, key: &str) -> Option<&str> {
        self.doc.get(key).and_then(Value::as_str)
    }

    fn project_slug(&self) -> Option<&str> {
        self.doc.get("project")?.get("slug")?.as_str()
    }
}

fn matches_filters(stored: &Stored, params: &BTreeMap<String, String>) -> bool {
    params.iter().all(|(key, expected)| {
        if let Some(name) = key.strip_prefix("property-aliases-") {
            stored
                .aliases
                .get(name)
                .is_some_and(|values| values.iter().any(|v| v == expected))
        } else if let Some(name) = key.strip_prefix("property-") {
            stored.current_value(name) == Some(expected.as_str())
        } else {
            match key.as_str() {
                "project" => stored.project_slug() == Some(expected.as_str()),
                "source" | "target" => stored.reference(key) == Some(expected.as_str()),
                _ => true,
            }
        }
    })
}

/// Normalise submitted properties to `{name, value, source_url, active}`;
/// uploaded files become the value of their property.
fn normalize_properties(value: Option<&Value>, files: &[(String, String)]) -> Map<String, Value> {
    let mut properties = Map::new();
    for (name, prop) in value.and_then(Value::as_object).into_iter().flatten() {
        let field = |key: &str| prop.get(key).cloned().unwrap_or(Value::Null);
        properties.insert(
            name.clone(),
            json!({
                "name": name,
                "value": field("value"),
                "source_url": field("source_url"),
                "active": prop.get("active").cloned().unwrap_or(Value::Bool(true)),
            }),
        );
    }
    for (name, file_name) in files {
        let entry = properties
            .entry(name.clone())
            .or_insert_with(|| json!({"name": name, "source_url": null, "active": true}));
        entry["value"] = json!(format!("file:{file_name}"));
    }
    properties
}

fn property_docs(properties: &[(&str, &str)]) -> Value {
    let map: Map<String, Value> = properties
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                json!({"name": name, "value": value, "source_url": null, "active": true}),
            )
        })
        .collect();
    Value::Object(map)
}

fn ok(status: u16, body: Value) -> RawResponse {
    RawResponse::new(status, body.to_string())
}

fn error(status: u16, name: &str, message: &str) -> RawResponse {
    ok(
        status,
        json!({"status": status, "name": name, "message": message, "description": message}),
    )
}

fn not_found(kind: &str) -> RawResponse {
    error(404, "NotFound", &format!("No such {kind}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_alias_filter_matches_historic_values() {
        let server = MemoryServer::new();
        server.insert_project("demo", "Demo");
        let id = server.insert_entity("demo", &["base"], &[("name", "Old Name")]);

        let client = server.client();
        let body = json!({
            "project": "demo",
            "schemata": ["base"],
            "properties": {"name": {"name": "name", "value": "New Name", "active": true}}
        });
        client
            .post(&format!("/entities/{id}"), &body, &Default::default())
            .await
            .unwrap();

        let params = |k: &str, v: &str| vec![(k.to_string(), v.to_string())];
        let (_, current) = client
            .get("/entities", &params("property-name", "Old Name"))
            .await
            .unwrap();
        assert_eq!(current["total"], 0);

        let (_, historic) = client
            .get("/entities", &params("property-aliases-name", "Old Name"))
            .await
            .unwrap();
        assert_eq!(historic["total"], 1);
    }

    #[tokio::test]
    async fn test_required_property_is_validation_error() {
        let server = MemoryServer::new();
        server.insert_project("demo", "Demo");
        server.require_property("name");

        let body = json!({"project": "demo", "schemata": ["base"], "properties": {}});
        let err = server
            .client()
            .post("/entities", &body, &Default::default())
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(server.entities().len(), 0);
    }

    #[tokio::test]
    async fn test_pagination_links() {
        let server = MemoryServer::new().with_page_size(2);
        server.insert_project("demo", "Demo");
        for i in 0..3 {
            server.insert_entity("demo", &["base"], &[("name", format!("E{i}").as_str())]);
        }
        let client = server.client();
        let (_, first) = client.get("/entities", &[]).await.unwrap();
        let next = first["next_url"].as_str().unwrap().to_string();
        assert!(first["prev_url"].is_null());

        let (_, second) = client.get(&next, &[]).await.unwrap();
        assert_eq!(second["results"].as_array().unwrap().len(), 1);
        assert!(second["next_url"].is_null());
        assert!(second["prev_url"].is_string());
    }
}
