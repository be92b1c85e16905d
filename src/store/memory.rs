//! In-memory store with optional JSON file persistence.

use super::{Store, StoreError};
use crate::models::{Field, Form, Response};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// On-disk document layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    forms: Vec<Form>,
    #[serde(default)]
    responses: Vec<Response>,
}

#[derive(Debug, Default)]
struct Collections {
    forms: HashMap<String, Form>,
    responses: HashMap<String, Vec<Response>>,
}

impl Collections {
    fn from_document(doc: Document) -> Self {
        let mut collections = Collections::default();
        for form in doc.forms {
            collections.forms.insert(form.id.clone(), form);
        }
        for response in doc.responses {
            collections
                .responses
                .entry(response.form_id.clone())
                .or_default()
                .push(response);
        }
        collections
    }

    fn to_document(&self) -> Document {
        let mut forms: Vec<Form> = self.forms.values().cloned().collect();
        forms.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut responses: Vec<Response> = self.responses.values().flatten().cloned().collect();
        responses.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Document { forms, responses }
    }
}

/// Thread-safe store keeping all documents in memory.
///
/// When opened with a data file, every write rewrites the file
/// atomically (temp file + rename).
pub struct MemoryStore {
    data: RwLock<Collections>,
    path: Option<PathBuf>,
}

impl MemoryStore {
    /// Create an empty, non-persistent store.
    pub fn in_memory() -> Self {
        Self {
            data: RwLock::new(Collections::default()),
            path: None,
        }
    }

    /// Open a store backed by `path`, loading it if it exists.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let collections = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let doc: Document = if content.trim().is_empty() {
                Document::default()
            } else {
                serde_json::from_str(&content)?
            };
            info!(
                path = %path.display(),
                forms = doc.forms.len(),
                responses = doc.responses.len(),
                "Loaded data file"
            );
            Collections::from_document(doc)
        } else {
            debug!(path = %path.display(), "Data file not found, starting empty");
            Collections::default()
        };

        Ok(Self {
            data: RwLock::new(collections),
            path: Some(path.to_path_buf()),
        })
    }

    /// Write the current contents to the data file, if there is one.
    ///
    /// Called with the write lock held so concurrent writers cannot
    /// interleave their renames.
    fn persist(&self, data: &Collections) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(&data.to_document())?;
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

impl Store for MemoryStore {
    fn create_form(&self, form: Form) -> Result<Form, StoreError> {
        let mut data = self.data.write();
        data.forms.insert(form.id.clone(), form.clone());
        self.persist(&data)?;
        Ok(form)
    }

    fn find_form(&self, id: &str) -> Result<Form, StoreError> {
        self.data
            .read()
            .forms
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("form {}", id)))
    }

    fn update_form(
        &self,
        id: &str,
        title: String,
        fields: Vec<Field>,
    ) -> Result<Form, StoreError> {
        let mut data = self.data.write();
        let form = data
            .forms
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("form {}", id)))?;
        form.title = title;
        form.fields = fields;
        let updated = form.clone();
        self.persist(&data)?;
        Ok(updated)
    }

    fn insert_response(&self, response: Response) -> Result<Response, StoreError> {
        let mut data = self.data.write();
        data.responses
            .entry(response.form_id.clone())
            .or_default()
            .push(response.clone());
        self.persist(&data)?;
        Ok(response)
    }

    fn insert_responses(&self, responses: Vec<Response>) -> Result<usize, StoreError> {
        let count = responses.len();
        let mut data = self.data.write();
        for response in responses {
            data.responses
                .entry(response.form_id.clone())
                .or_default()
                .push(response);
        }
        self.persist(&data)?;
        Ok(count)
    }

    fn find_responses(&self, form_id: &str) -> Result<Vec<Response>, StoreError> {
        Ok(self
            .data
            .read()
            .responses
            .get(form_id)
            .cloned()
            .unwrap_or_default())
    }
}
