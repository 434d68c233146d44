use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::local::{storage_key, LocalStore};

pub fn draft_key(form: &str) -> String {
    storage_key("form-draft", &[form])
}

/// Unsubmitted form input kept so it can be restored after a crash or
/// an accidental exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDraft {
    pub fields: BTreeMap<String, String>,
    pub saved_at: DateTime<Utc>,
}

pub async fn save_draft(
    store: &mut LocalStore,
    form: &str,
    fields: BTreeMap<String, String>,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    store
        .save(&draft_key(form), &FormDraft { fields, saved_at: now })
        .await
}

pub fn load_draft(store: &LocalStore, form: &str) -> Option<FormDraft> {
    store.load(&draft_key(form), None)
}

pub async fn clear_draft(store: &mut LocalStore, form: &str) -> Result<bool, AppError> {
    store.remove(&draft_key(form)).await
}

/// Parses `name=value` pairs from the command line.
pub fn parse_fields(pairs: &[String]) -> Result<BTreeMap<String, String>, AppError> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(name, value)| (name.trim().to_string(), value.to_string()))
                .filter(|(name, _)| !name.is_empty())
                .ok_or_else(|| AppError::Validation(format!("expected name=value, got '{pair}'")))
        })
        .collect()
}
