use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct PersistedAuth {
    student_id: String,
}

/// Where the auth context keeps the student id between runs.
pub trait AuthStore {
    fn load(&self) -> Result<Option<String>>;
    fn save(&self, student_id: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// JSON file backed store.
#[derive(Debug, Clone)]
pub struct FileAuthStore {
    path: PathBuf,
}

impl FileAuthStore {
    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuthStore for FileAuthStore {
    fn load(&self) -> Result<Option<String>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match sonic_rs::from_slice::<PersistedAuth>(&raw) {
            Ok(auth) if !auth.student_id.is_empty() => Ok(Some(auth.student_id)),
            Ok(_) => Ok(None),
            Err(e) => {
                tracing::warn!("Ignoring unreadable auth store {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    fn save(&self, student_id: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = sonic_rs::to_string(&PersistedAuth {
            student_id: student_id.to_string(),
        })
        .map_err(|e| AppError::Internal(format!("Auth serialization failed: {}", e)))?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// The single owner of the signed-in student.
///
/// Persisted state is read once in [`AuthContext::init`]; afterwards the
/// in-memory value is authoritative and every change is written through.
pub struct AuthContext<S: AuthStore> {
    store: S,
    student_id: Option<String>,
}

impl<S: AuthStore> AuthContext<S> {
    pub fn init(store: S) -> Result<Self> {
        let student_id = store.load()?;
        if let Some(ref id) = student_id {
            tracing::debug!("Restored signed-in student {}", id);
        }
        Ok(Self { store, student_id })
    }

    pub fn login(&mut self, student_id: &str) -> Result<()> {
        let student_id = student_id.trim();
        if student_id.is_empty() {
            return Err(AppError::Validation("Student ID cannot be empty".to_string()));
        }
        self.store.save(student_id)?;
        self.student_id = Some(student_id.to_string());
        tracing::info!("Signed in as {}", student_id);
        Ok(())
    }

    pub fn logout(&mut self) -> Result<()> {
        self.store.clear()?;
        if let Some(id) = self.student_id.take() {
            tracing::info!("Signed out {}", id);
        }
        Ok(())
    }

    pub fn student_id(&self) -> Option<&str> {
        self.student_id.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.student_id.is_some()
    }
}
