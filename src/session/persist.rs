use std::collections::BTreeMap;
use std::time::Duration;

use crate::foundation::error::PreviewResult;
use crate::jobs::render_job::JobId;
use crate::jobs::store::KvStore;
use crate::scene::model::{FeatureId, OptionId, ScanId};

const KEY_PREFIX: &str = "preview_session:";

/// The part of a session that survives a reload. Caches and rasters are never persisted.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedSession {
    pub scan_id: Option<ScanId>,
    pub selections: BTreeMap<FeatureId, OptionId>,
    pub extras: serde_json::Map<String, serde_json::Value>,
    pub user_prompt: String,
    pub variant: u32,
    pub job_id: Option<JobId>,
}

impl PersistedSession {
    /// Write under `session_id` with a bounded lifetime.
    pub async fn save<S: KvStore>(
        &self,
        store: &S,
        session_id: &str,
        ttl: Duration,
    ) -> PreviewResult<()> {
        let text = serde_json::to_string(self)?;
        store
            .set_with_ttl(&format!("{KEY_PREFIX}{session_id}"), text, ttl)
            .await
    }

    /// Read `session_id`; `None` if it never existed or expired.
    pub async fn load<S: KvStore>(store: &S, session_id: &str) -> PreviewResult<Option<Self>> {
        let Some(text) = store.get(&format!("{KEY_PREFIX}{session_id}")).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Remove `session_id`.
    pub async fn forget<S: KvStore>(store: &S, session_id: &str) -> PreviewResult<()> {
        store.del(&format!("{KEY_PREFIX}{session_id}")).await
    }
}
