pub mod json;

pub use json::JsonEntityStore;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Environment used when none is given
pub const DEFAULT_ENVIRONMENT: &str = "Prod";

/// Kind of billing party an identifier belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Client,
    LawFirm,
}

/// A named external identifier for a client or law firm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    pub kind: EntityKind,
    pub name: String,
    pub ext_id: String,
    pub environment: String,
}

/// Trait for entity persistence backends
pub trait EntityStore: Send + Sync {
    /// Insert or update an entity; (kind, ext_id, environment) is unique
    fn upsert(
        &self,
        kind: EntityKind,
        name: &str,
        ext_id: &str,
        environment: &str,
    ) -> Result<Entity>;

    /// Edit an existing entity's name, ext_id and environment in place.
    /// Fails if the id is unknown or the new key belongs to another entity.
    fn update(&self, id: &Uuid, name: &str, ext_id: &str, environment: &str) -> Result<Entity>;

    /// Load an entity by ID
    fn load(&self, id: &Uuid) -> Result<Option<Entity>>;

    /// List entities of a kind, optionally filtered by environment
    fn list(&self, kind: EntityKind, environment: Option<&str>) -> Result<Vec<Entity>>;

    /// Distinct environments in use for a kind
    fn environments(&self, kind: EntityKind) -> Result<Vec<String>>;

    /// Delete an entity, returning whether it existed
    fn delete(&self, id: &Uuid) -> Result<bool>;

    /// Mark an entity as the default for its kind
    fn set_default(&self, kind: EntityKind, id: &Uuid) -> Result<()>;

    /// The default entity for a kind, if one is set and still exists
    fn get_default(&self, kind: EntityKind) -> Result<Option<Entity>>;
}
