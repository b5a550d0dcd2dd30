//! Core data models for the registry
//!
//! `NewClient` is the internal insert shape: a client without a store id.
//! Records exported to the shell live in `interface`.

use crate::interface::{ClientId, ClientRecord, Field, ValidationError};

// ─────────────────────────────────────────────────────────────────────────────
// INTERNAL INSERT SHAPE (not exposed to the shell)
// ─────────────────────────────────────────────────────────────────────────────

/// A validated client waiting for a store-assigned id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClient {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl NewClient {
    /// Build from raw form input.
    ///
    /// Fields are trimmed; a field that is blank after trimming is rejected.
    /// Checked in form order: name, email, phone.
    pub fn from_input(name: &str, email: &str, phone: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            name: required(Field::Name, name)?,
            email: required(Field::Email, email)?,
            phone: required(Field::Phone, phone)?,
        })
    }

    /// Attach the id assigned by the durable store
    pub fn into_record(self, id: ClientId) -> ClientRecord {
        ClientRecord {
            id,
            name: self.name,
            email: self.email,
            phone: self.phone,
        }
    }
}

fn required(field: Field, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError { field });
    }
    Ok(trimmed.to_string())
}
