//! Record-file ingestion.
//!
//! A record file is newline-delimited JSON. Each line is an entity or a
//! relation; relations name their endpoints by the record-local `key` of an
//! entity line:
//!
//! ```text
//! {"kind": "entity", "key": "merkel", "schemata": ["person"], "properties": {"name": "Angela Merkel"}}
//! {"kind": "entity", "key": "scholz", "schemata": ["person"], "properties": {"name": "Olaf Scholz"}}
//! {"kind": "relation", "schema": "knows", "source": "merkel", "target": "scholz"}
//! ```
//!
//! Entities are saved first, then relations, each phase spread over a
//! bounded number of tokio tasks sharing one [`Loader`].

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use grano_core::{FileBlob, PropertyValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::builder::Diagnostic;
use crate::entity::EntityBuilder;
use crate::error::{LoaderError, Result};
use crate::loader::Loader;
use crate::relation::RelationBuilder;

// ── Record format ─────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    Entity(EntityRecord),
    Relation(RelationRecord),
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityRecord {
    pub key: String,
    #[serde(default)]
    pub schemata: Vec<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    /// Property name -> path of a file to upload as its value.
    #[serde(default)]
    pub files: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub unique: Vec<UniqueSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelationRecord {
    pub schema: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default)]
    pub files: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub unique: Vec<UniqueSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UniqueSpec {
    pub name: String,
    #[serde(default = "default_true")]
    pub only_active: bool,
}

fn default_true() -> bool {
    true
}

/// A record together with the line it came from.
#[derive(Debug, Clone)]
pub struct NumberedRecord {
    pub line: usize,
    pub record: Record,
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entities: usize,
    pub relations: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    pub ambiguous: usize,
    /// Records that could not be saved for reasons other than validation.
    pub errors: usize,
    pub diagnostics: Vec<Diagnostic>,
}

// ── Parsing ───────────────────────────────────────────────────────

/// Parse newline-delimited JSON records. Blank lines are skipped.
pub fn parse_records(reader: impl BufRead) -> Result<Vec<NumberedRecord>> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| LoaderError::Records {
            line: line_no,
            message: e.to_string(),
        })?;
        records.push(NumberedRecord {
            line: line_no,
            record,
        });
    }
    Ok(records)
}

/// Read and parse a record file.
pub fn read_records(path: &Path) -> Result<Vec<NumberedRecord>> {
    let file = std::fs::File::open(path)?;
    parse_records(std::io::BufReader::new(file))
}

// ── Building ──────────────────────────────────────────────────────

/// Builders for a parsed record file, ready to save.
pub struct Plan {
    pub entities: Vec<Arc<EntityBuilder>>,
    pub relations: Vec<Arc<RelationBuilder>>,
}

/// Turn records into builders, checking keys before anything is sent.
///
/// Relative file paths resolve against `base_dir`.
pub fn plan(loader: &Loader, records: &[NumberedRecord], base_dir: &Path) -> Result<Plan> {
    let mut by_key: BTreeMap<&str, Arc<EntityBuilder>> = BTreeMap::new();
    let mut entities = Vec::new();

    for numbered in records {
        let Record::Entity(record) = &numbered.record else {
            continue;
        };
        if by_key.contains_key(record.key.as_str()) {
            return Err(LoaderError::Records {
                line: numbered.line,
                message: format!("duplicate entity key '{}'", record.key),
            });
        }
        let builder = loader.make_entity(record.schemata.iter().cloned(), record.source_url.as_deref());
        for (name, value) in &record.properties {
            builder.set(name.as_str(), property_value(numbered.line, value)?);
        }
        for (name, path) in &record.files {
            builder.set(name.as_str(), read_file(numbered.line, base_dir, path)?);
        }
        for spec in &record.unique {
            builder.unique(spec.name.as_str(), spec.only_active);
        }
        by_key.insert(record.key.as_str(), builder.clone());
        entities.push(builder);
    }

    let mut relations = Vec::new();
    for numbered in records {
        let Record::Relation(record) = &numbered.record else {
            continue;
        };
        let endpoint = |key: &str| {
            by_key.get(key).ok_or_else(|| LoaderError::Records {
                line: numbered.line,
                message: format!("unknown entity key '{key}'"),
            })
        };
        let builder = loader.make_relation(
            record.schema.as_str(),
            endpoint(&record.source)?,
            endpoint(&record.target)?,
            record.source_url.as_deref(),
        );
        for (name, value) in &record.properties {
            builder.set(name.as_str(), property_value(numbered.line, value)?);
        }
        for (name, path) in &record.files {
            builder.set(name.as_str(), read_file(numbered.line, base_dir, path)?);
        }
        for spec in &record.unique {
            builder.unique(spec.name.as_str(), spec.only_active);
        }
        relations.push(Arc::new(builder));
    }

    Ok(Plan {
        entities,
        relations,
    })
}

fn property_value(line: usize, value: &Value) -> Result<PropertyValue> {
    PropertyValue::try_from(value).map_err(|e| LoaderError::Records {
        line,
        message: e.to_string(),
    })
}

fn read_file(line: usize, base_dir: &Path, path: &Path) -> Result<FileBlob> {
    let full = base_dir.join(path);
    FileBlob::from_path(&full).map_err(|e| LoaderError::Records {
        line,
        message: format!("cannot read {}: {e}", full.display()),
    })
}

// ── Loading ───────────────────────────────────────────────────────

/// Save every builder of the plan with at most `workers` saves in flight.
pub async fn load(loader: &Loader, plan: Plan, workers: usize) -> Result<LoadReport> {
    let started_at = Utc::now();
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let entity_count = plan.entities.len();
    let relation_count = plan.relations.len();

    tracing::info!(
        batch_id = %loader.batch_id(),
        entities = entity_count,
        relations = relation_count,
        workers,
        "Loading records"
    );

    let mut errors = 0;
    let mut handles = Vec::new();
    for builder in plan.entities {
        let permit = acquire(&semaphore).await?;
        handles.push(tokio::spawn(async move {
            let _permit = permit;
            builder.save().await.map(|_| ())
        }));
    }
    errors += join_all(handles, "entity").await?;

    let mut handles = Vec::new();
    for builder in plan.relations {
        let permit = acquire(&semaphore).await?;
        handles.push(tokio::spawn(async move {
            let _permit = permit;
            builder.save().await.map(|_| ())
        }));
    }
    errors += join_all(handles, "relation").await?;

    let stats = loader.stats();
    let report = LoadReport {
        batch_id: loader.batch_id(),
        started_at,
        finished_at: Utc::now(),
        entities: entity_count,
        relations: relation_count,
        created: stats.created,
        updated: stats.updated,
        failed: stats.failed,
        ambiguous: stats.ambiguous,
        errors,
        diagnostics: loader.diagnostics(),
    };

    tracing::info!(
        batch_id = %report.batch_id,
        created = report.created,
        updated = report.updated,
        failed = report.failed,
        ambiguous = report.ambiguous,
        errors = report.errors,
        duration_ms = (report.finished_at - report.started_at).num_milliseconds(),
        "Load complete"
    );
    Ok(report)
}

async fn acquire(semaphore: &Arc<Semaphore>) -> Result<tokio::sync::OwnedSemaphorePermit> {
    semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|e| LoaderError::Worker(e.to_string()))
}

/// Wait for every task; returns how many ended in an error.
async fn join_all(handles: Vec<tokio::task::JoinHandle<Result<()>>>, kind: &str) -> Result<usize> {
    let mut errors = 0;
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(kind, error = %e, "Record failed");
                errors += 1;
            }
            Err(e) => return Err(LoaderError::Worker(e.to_string())),
        }
    }
    Ok(errors)
}
