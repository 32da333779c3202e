//! Project persistence

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::deploy::fsm::ProjectStatus;
use crate::errors::PilotError;
use crate::filesys::file::File;
use crate::projects::model::Project;
use crate::storage::settings::StoreKind;

/// Port given to the first project ever recorded
pub const FIRST_PORT: u16 = 3000;

/// Durable collection of projects.
///
/// Every operation touches exactly one record.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Project>, PilotError>;

    async fn get(&self, id: &str) -> Result<Option<Project>, PilotError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Project>, PilotError>;

    /// Insert a new record; fails if the name is taken
    async fn insert(&self, project: Project) -> Result<Project, PilotError>;

    /// Replace the record with the same id
    async fn replace(&self, project: Project) -> Result<Project, PilotError>;

    async fn set_status(&self, id: &str, status: ProjectStatus) -> Result<Project, PilotError>;

    async fn delete(&self, id: &str) -> Result<Option<Project>, PilotError>;

    /// Highest port among all records
    async fn max_port(&self) -> Result<Option<u16>, PilotError>;
}

/// Port for a new project given the highest port already in use
pub fn port_after(highest: Option<u16>) -> Result<u16, PilotError> {
    match highest {
        Some(max) => max
            .checked_add(1)
            .ok_or_else(|| PilotError::StorageError("No free port above 65535".to_string())),
        None => Ok(FIRST_PORT),
    }
}

/// Record a finished deploy: insert when the name is new, full replace otherwise.
///
/// On replace the stored id and creation time are kept; everything else comes
/// from `project`.
pub async fn upsert_by_name(
    store: &dyn ProjectStore,
    mut project: Project,
) -> Result<Project, PilotError> {
    match store.find_by_name(&project.name).await? {
        Some(existing) => {
            debug!("Overwriting project {} ({})", existing.name, existing.id);
            project.id = existing.id;
            project.created_at = existing.created_at;
            project.updated_at = Utc::now();
            store.replace(project).await
        }
        None => {
            debug!("Inserting project {}", project.name);
            store.insert(project).await
        }
    }
}

/// Open the store configured in settings
pub async fn open_store(kind: StoreKind, file: File) -> Result<Arc<dyn ProjectStore>, PilotError> {
    let store: Arc<dyn ProjectStore> = match kind {
        StoreKind::Memory => Arc::new(MemoryProjectStore::new()),
        StoreKind::Json => Arc::new(JsonProjectStore::open(file).await?),
    };
    Ok(store)
}

// ================================= RECORD SET =================================== //

fn insert_into(projects: &mut Vec<Project>, project: Project) -> Result<Project, PilotError> {
    if projects.iter().any(|p| p.name == project.name) {
        return Err(PilotError::Conflict(format!(
            "Project '{}' already exists",
            project.name
        )));
    }
    projects.push(project.clone());
    Ok(project)
}

fn replace_in(projects: &mut [Project], project: Project) -> Result<Project, PilotError> {
    let slot = projects
        .iter_mut()
        .find(|p| p.id == project.id)
        .ok_or_else(|| PilotError::NotFound(format!("Project {}", project.id)))?;
    *slot = project.clone();
    Ok(project)
}

fn set_status_in(
    projects: &mut [Project],
    id: &str,
    status: ProjectStatus,
) -> Result<Project, PilotError> {
    let slot = projects
        .iter_mut()
        .find(|p| p.id == id)
        .ok_or_else(|| PilotError::NotFound(format!("Project {}", id)))?;
    slot.status = status;
    slot.updated_at = Utc::now();
    Ok(slot.clone())
}

fn remove_from(projects: &mut Vec<Project>, id: &str) -> Option<Project> {
    let index = projects.iter().position(|p| p.id == id)?;
    Some(projects.remove(index))
}

// ================================== IN MEMORY =================================== //

/// Store that lives only as long as the process
#[derive(Default)]
pub struct MemoryProjectStore {
    projects: Mutex<Vec<Project>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn list(&self) -> Result<Vec<Project>, PilotError> {
        Ok(self.projects.lock().await.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<Project>, PilotError> {
        Ok(self.projects.lock().await.iter().find(|p| p.id == id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Project>, PilotError> {
        Ok(self
            .projects
            .lock()
            .await
            .iter()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn insert(&self, project: Project) -> Result<Project, PilotError> {
        insert_into(&mut *self.projects.lock().await, project)
    }

    async fn replace(&self, project: Project) -> Result<Project, PilotError> {
        replace_in(&mut self.projects.lock().await, project)
    }

    async fn set_status(&self, id: &str, status: ProjectStatus) -> Result<Project, PilotError> {
        set_status_in(&mut self.projects.lock().await, id, status)
    }

    async fn delete(&self, id: &str) -> Result<Option<Project>, PilotError> {
        Ok(remove_from(&mut *self.projects.lock().await, id))
    }

    async fn max_port(&self) -> Result<Option<u16>, PilotError> {
        Ok(self.projects.lock().await.iter().map(|p| p.port).max())
    }
}

// ==================================== JSON ====================================== //

/// Store persisted as a single JSON document, rewritten atomically on every change
pub struct JsonProjectStore {
    file: File,
    projects: Mutex<Vec<Project>>,
}

impl JsonProjectStore {
    pub async fn open(file: File) -> Result<Self, PilotError> {
        let projects: Vec<Project> = file.read_json_or_default().await?;
        info!(
            "Loaded {} projects from {}",
            projects.len(),
            file.path().display()
        );
        Ok(Self {
            file,
            projects: Mutex::new(projects),
        })
    }

    /// Apply `change` to a copy of the records and persist it; memory is only
    /// updated once the write succeeded.
    async fn mutate<T>(
        &self,
        change: impl FnOnce(&mut Vec<Project>) -> Result<T, PilotError>,
    ) -> Result<T, PilotError> {
        let mut guard = self.projects.lock().await;
        let mut next = guard.clone();
        let result = change(&mut next)?;
        self.file
            .write_json_atomic(&next)
            .await
            .map_err(|e| PilotError::StorageError(format!("Failed to persist projects: {}", e)))?;
        *guard = next;
        Ok(result)
    }
}

#[async_trait]
impl ProjectStore for JsonProjectStore {
    async fn list(&self) -> Result<Vec<Project>, PilotError> {
        Ok(self.projects.lock().await.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<Project>, PilotError> {
        Ok(self.projects.lock().await.iter().find(|p| p.id == id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Project>, PilotError> {
        Ok(self
            .projects
            .lock()
            .await
            .iter()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn insert(&self, project: Project) -> Result<Project, PilotError> {
        self.mutate(|projects| insert_into(projects, project)).await
    }

    async fn replace(&self, project: Project) -> Result<Project, PilotError> {
        self.mutate(|projects| replace_in(projects, project)).await
    }

    async fn set_status(&self, id: &str, status: ProjectStatus) -> Result<Project, PilotError> {
        self.mutate(|projects| set_status_in(projects, id, status))
            .await
    }

    async fn delete(&self, id: &str) -> Result<Option<Project>, PilotError> {
        self.mutate(|projects| Ok(remove_from(projects, id))).await
    }

    async fn max_port(&self) -> Result<Option<u16>, PilotError> {
        Ok(self.projects.lock().await.iter().map(|p| p.port).max())
    }
}
