//! Document storage for forms and responses.
//!
//! The live analytics path only needs to read forms and response sets;
//! the HTTP layer also creates and edits them. Everything goes through
//! the [`Store`] trait so the backing implementation can be swapped.

mod memory;

pub use memory::MemoryStore;

use crate::models::{Field, Form, Response};

/// Errors raised by a store implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Create/read/update/find access to forms and responses.
pub trait Store: Send + Sync {
    /// Persist a new form. The form must already carry its id.
    fn create_form(&self, form: Form) -> Result<Form, StoreError>;

    /// Fetch a form by id.
    fn find_form(&self, id: &str) -> Result<Form, StoreError>;

    /// Replace the title and fields of an existing form.
    fn update_form(&self, id: &str, title: String, fields: Vec<Field>)
        -> Result<Form, StoreError>;

    /// Persist a response.
    fn insert_response(&self, response: Response) -> Result<Response, StoreError>;

    /// Persist a batch of responses in one write. Returns how many were stored.
    fn insert_responses(&self, responses: Vec<Response>) -> Result<usize, StoreError>;

    /// All responses recorded for a form, in no particular order.
    fn find_responses(&self, form_id: &str) -> Result<Vec<Response>, StoreError>;
}
