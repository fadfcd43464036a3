use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};
use uuid::Uuid;

use super::{Entity, EntityKind, EntityStore, DEFAULT_ENVIRONMENT};

/// JSON file-based entity store
pub struct JsonEntityStore {
    base_path: PathBuf,
}

impl JsonEntityStore {
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).with_context(|| {
            format!("Failed to create store directory: {}", base_path.display())
        })?;

        info!(path = %base_path.display(), "Initialized JSON entity store");

        Ok(Self { base_path })
    }

    fn entity_path(&self, id: &Uuid) -> PathBuf {
        self.base_path.join(format!("{}.json", id))
    }

    fn index_path(&self) -> PathBuf {
        self.base_path.join("index.json")
    }

    fn load_index(&self) -> Result<EntityIndex> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(EntityIndex::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read index: {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse index")
    }

    fn save_index(&self, index: &EntityIndex) -> Result<()> {
        let path = self.index_path();
        let content = serde_json::to_string_pretty(index)?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write index: {}", path.display()))?;
        Ok(())
    }

    fn save_entity(&self, entity: &Entity) -> Result<()> {
        let path = self.entity_path(&entity.id);
        let content = serde_json::to_string_pretty(entity)?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write entity: {}", path.display()))?;
        Ok(())
    }
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct EntityIndex {
    entities: Vec<EntityIndexEntry>,
    #[serde(default)]
    defaults: HashMap<EntityKind, Uuid>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct EntityIndexEntry {
    id: Uuid,
    kind: EntityKind,
    ext_id: String,
    environment: String,
}

fn normalize_environment(environment: &str) -> String {
    let trimmed = environment.trim();
    if trimmed.is_empty() {
        DEFAULT_ENVIRONMENT.to_string()
    } else {
        trimmed.to_string()
    }
}

impl EntityStore for JsonEntityStore {
    fn upsert(
        &self,
        kind: EntityKind,
        name: &str,
        ext_id: &str,
        environment: &str,
    ) -> Result<Entity> {
        let environment = normalize_environment(environment);
        let mut index = self.load_index()?;

        let existing = index
            .entities
            .iter()
            .find(|e| e.kind == kind && e.ext_id == ext_id && e.environment == environment)
            .map(|e| e.id);

        let entity = Entity {
            id: existing.unwrap_or_else(Uuid::new_v4),
            kind,
            name: name.trim().to_string(),
            ext_id: ext_id.trim().to_string(),
            environment,
        };

        self.save_entity(&entity)?;

        if existing.is_none() {
            index.entities.push(EntityIndexEntry {
                id: entity.id,
                kind,
                ext_id: entity.ext_id.clone(),
                environment: entity.environment.clone(),
            });
            self.save_index(&index)?;
        }

        debug!(id = %entity.id, ext_id = %entity.ext_id, "Saved entity");

        Ok(entity)
    }

    fn update(&self, id: &Uuid, name: &str, ext_id: &str, environment: &str) -> Result<Entity> {
        let environment = normalize_environment(environment);
        let ext_id = ext_id.trim();
        let mut index = self.load_index()?;

        let Some(pos) = index.entities.iter().position(|e| e.id == *id) else {
            anyhow::bail!("No entity with id {}", id);
        };
        let kind = index.entities[pos].kind;

        let taken = index.entities.iter().any(|e| {
            e.id != *id && e.kind == kind && e.ext_id == ext_id && e.environment == environment
        });
        if taken {
            anyhow::bail!(
                "{:?} id {} already exists in environment {}",
                kind,
                ext_id,
                environment
            );
        }

        let entity = Entity {
            id: *id,
            kind,
            name: name.trim().to_string(),
            ext_id: ext_id.to_string(),
            environment,
        };
        self.save_entity(&entity)?;

        let entry = &mut index.entities[pos];
        entry.ext_id = entity.ext_id.clone();
        entry.environment = entity.environment.clone();
        self.save_index(&index)?;

        debug!(id = %entity.id, ext_id = %entity.ext_id, "Updated entity");

        Ok(entity)
    }

    fn load(&self, id: &Uuid) -> Result<Option<Entity>> {
        let path = self.entity_path(id);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read entity: {}", path.display()))?;

        let entity = serde_json::from_str(&content).context("Failed to parse entity")?;

        Ok(Some(entity))
    }

    fn list(&self, kind: EntityKind, environment: Option<&str>) -> Result<Vec<Entity>> {
        let index = self.load_index()?;

        let mut entities = Vec::new();
        for entry in index.entities.iter().filter(|e| {
            e.kind == kind
                && environment.map_or(true, |env| env == "All" || e.environment == env)
        }) {
            if let Some(entity) = self.load(&entry.id)? {
                entities.push(entity);
            }
        }

        entities.sort_by_key(|e| e.name.to_lowercase());

        Ok(entities)
    }

    fn environments(&self, kind: EntityKind) -> Result<Vec<String>> {
        let index = self.load_index()?;

        let mut envs: Vec<String> = index
            .entities
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.environment.clone())
            .collect();
        envs.sort();
        envs.dedup();

        if envs.is_empty() {
            envs.push(DEFAULT_ENVIRONMENT.to_string());
        }

        Ok(envs)
    }

    fn delete(&self, id: &Uuid) -> Result<bool> {
        let mut index = self.load_index()?;
        let before = index.entities.len();
        index.entities.retain(|e| e.id != *id);
        index.defaults.retain(|_, default| default != id);

        let removed = index.entities.len() < before;
        self.save_index(&index)?;

        let path = self.entity_path(id);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to delete entity: {}", path.display()))?;
        }

        debug!(id = %id, removed, "Deleted entity");

        Ok(removed)
    }

    fn set_default(&self, kind: EntityKind, id: &Uuid) -> Result<()> {
        let mut index = self.load_index()?;

        let known = index.entities.iter().any(|e| e.id == *id && e.kind == kind);
        if !known {
            anyhow::bail!("No {:?} entity with id {}", kind, id);
        }

        index.defaults.insert(kind, *id);
        self.save_index(&index)
    }

    fn get_default(&self, kind: EntityKind) -> Result<Option<Entity>> {
        let index = self.load_index()?;

        match index.defaults.get(&kind) {
            Some(id) => self.load(id),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_upsert_and_load() {
        let dir = tempdir().unwrap();
        let store = JsonEntityStore::new(dir.path()).unwrap();

        let entity = store
            .upsert(EntityKind::Client, "Acme Insurance", "02-4388252", "")
            .unwrap();
        assert_eq!(entity.environment, "Prod");

        let loaded = store.load(&entity.id).unwrap().unwrap();
        assert_eq!(loaded, entity);
    }

    #[test]
    fn test_upsert_is_unique_per_environment() {
        let dir = tempdir().unwrap();
        let store = JsonEntityStore::new(dir.path()).unwrap();

        let first = store
            .upsert(EntityKind::LawFirm, "Smith LLP", "02-1234567", "Prod")
            .unwrap();
        let renamed = store
            .upsert(EntityKind::LawFirm, "Smith & Jones LLP", "02-1234567", "Prod")
            .unwrap();
        assert_eq!(first.id, renamed.id);

        let other_env = store
            .upsert(EntityKind::LawFirm, "Smith LLP", "02-1234567", "QA")
            .unwrap();
        assert_ne!(first.id, other_env.id);

        let all = store.list(EntityKind::LawFirm, None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(store.list(EntityKind::LawFirm, Some("QA")).unwrap().len(), 1);
        assert_eq!(store.list(EntityKind::LawFirm, Some("All")).unwrap().len(), 2);
        assert!(store.list(EntityKind::Client, None).unwrap().is_empty());

        let prod = store.list(EntityKind::LawFirm, Some("Prod")).unwrap();
        assert_eq!(prod[0].name, "Smith & Jones LLP");
    }

    #[test]
    fn test_update_rekeys_entity() {
        let dir = tempdir().unwrap();
        let store = JsonEntityStore::new(dir.path()).unwrap();

        let acme = store.upsert(EntityKind::Client, "Acme", "C-1", "Prod").unwrap();
        let other = store.upsert(EntityKind::Client, "Globex", "C-2", "UAT").unwrap();
        store.set_default(EntityKind::Client, &acme.id).unwrap();

        let updated = store.update(&acme.id, "Acme Corp", "C-9", "UAT").unwrap();
        assert_eq!(updated.id, acme.id);
        assert_eq!(updated.kind, EntityKind::Client);
        assert_eq!(store.load(&acme.id).unwrap(), Some(updated.clone()));
        assert_eq!(store.get_default(EntityKind::Client).unwrap(), Some(updated));

        assert!(store.list(EntityKind::Client, Some("Prod")).unwrap().is_empty());
        assert_eq!(store.list(EntityKind::Client, Some("UAT")).unwrap().len(), 2);

        // Upserting under the new key finds the same row
        let again = store.upsert(EntityKind::Client, "Acme", "C-9", "UAT").unwrap();
        assert_eq!(again.id, acme.id);

        assert!(store.update(&acme.id, "Acme", "C-2", "UAT").is_err());
        assert!(store.update(&Uuid::new_v4(), "Nobody", "X", "Prod").is_err());
        assert_eq!(store.load(&other.id).unwrap().unwrap().ext_id, "C-2");
    }

    #[test]
    fn test_list_sorted_case_insensitive() {
        let dir = tempdir().unwrap();
        let store = JsonEntityStore::new(dir.path()).unwrap();

        store.upsert(EntityKind::Client, "beta corp", "B", "Prod").unwrap();
        store.upsert(EntityKind::Client, "Alpha Corp", "A", "Prod").unwrap();
        store.upsert(EntityKind::Client, "Gamma", "G", "Prod").unwrap();

        let names: Vec<String> = store
            .list(EntityKind::Client, None)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["Alpha Corp", "beta corp", "Gamma"]);
    }

    #[test]
    fn test_environments() {
        let dir = tempdir().unwrap();
        let store = JsonEntityStore::new(dir.path()).unwrap();
        assert_eq!(store.environments(EntityKind::Client).unwrap(), vec!["Prod"]);

        store.upsert(EntityKind::Client, "A", "1", "UAT").unwrap();
        store.upsert(EntityKind::Client, "B", "2", "Prod").unwrap();
        store.upsert(EntityKind::Client, "C", "3", "UAT").unwrap();
        assert_eq!(
            store.environments(EntityKind::Client).unwrap(),
            vec!["Prod", "UAT"]
        );
    }

    #[test]
    fn test_defaults_and_delete() {
        let dir = tempdir().unwrap();
        let store = JsonEntityStore::new(dir.path()).unwrap();

        let client = store.upsert(EntityKind::Client, "Acme", "C-1", "Prod").unwrap();
        assert!(store.get_default(EntityKind::Client).unwrap().is_none());
        assert!(store.set_default(EntityKind::LawFirm, &client.id).is_err());

        store.set_default(EntityKind::Client, &client.id).unwrap();
        assert_eq!(store.get_default(EntityKind::Client).unwrap(), Some(client.clone()));

        assert!(store.delete(&client.id).unwrap());
        assert!(!store.delete(&client.id).unwrap());
        assert!(store.load(&client.id).unwrap().is_none());
        assert!(store.get_default(EntityKind::Client).unwrap().is_none());
    }
}
