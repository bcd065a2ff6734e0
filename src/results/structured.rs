// src/results/structured.rs

//! Decoder for the JSON results artifact:
//!
//! ```json
//! {
//!   "/datum/unit_test/a": { "status": 0, "message": "", "name": "A" },
//!   "/datum/unit_test/b": { "status": 1, "message": "x", "name": "B" }
//! }
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::errors::{PipelineError, Result};
use crate::results::ResultSet;
use crate::types::{TestId, TestStatus};

#[derive(Debug, Deserialize)]
struct RawRecord {
    status: u8,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

pub fn parse_structured(text: &str) -> Result<ResultSet> {
    let raw: BTreeMap<String, RawRecord> = serde_json::from_str(text).map_err(|e| {
        PipelineError::ConfigError(format!("results artifact is not valid JSON results: {e}"))
    })?;

    let mut set = ResultSet::default();
    for (type_path, record) in raw {
        let status = TestStatus::try_from(record.status).map_err(|e| {
            PipelineError::ConfigError(format!("results entry '{type_path}': {e}"))
        })?;
        let id = TestId::from_type_path(&type_path);
        if let Some(name) = record.name.filter(|n| !n.is_empty()) {
            set.set_display_name(id.clone(), name);
        }
        set.record(id, status, record.message);
    }
    Ok(set)
}
