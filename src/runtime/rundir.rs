//! Run directory layout: naming, metadata sidecar files, and prior-run
//! discovery for `--continue` restoration.

use std::io::Write as _;

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::ast::ValueType;
use crate::context::ActionKey;
use crate::error::RunnerResult;

const MAX_DIR_NAME_LEN: usize = 64;

/// Node status as recorded in `meta.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Running,
    Done,
    Failed,
    Restored,
}

/// Per-node metadata sidecar, written atomically at each lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub action_name: String,
    pub context: String,
    pub status: NodeStatus,
    pub started_at_unix_ms: u64,
    pub finished_at_unix_ms: Option<u64>,
    /// For a restored node this is copied verbatim from the prior run, not
    /// recomputed from the (near-instant) copy — it describes the original
    /// execution, not the restoration act.
    pub duration_seconds: Option<f64>,
    pub exit_code: Option<i32>,
    pub restored_from_run: Option<String>,
}

/// One declared return value as written to `output.json`: `{"type": ..., "value": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedValue {
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub value: Value,
}

/// Node return values, written once a node completes successfully.
/// Flattened so the file itself is `{"<return-name>": {"type": ..., "value": ...}, ...}`
/// rather than nested under a `returns` key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputDoc {
    #[serde(flatten)]
    pub returns: HashMap<String, TypedValue>,
}

/// The directory name for a node's run-scoped workspace, truncating the
/// canonical label when it exceeds the filesystem-friendly length budget.
/// Truncation preserves the trailing `#action-name` suffix and replaces the
/// squeezed-out middle with a 7-hex-character hash of the full original
/// label, so two long-but-distinct labels never collide on truncation.
pub fn node_dir_name(key: &ActionKey) -> String {
    let label = key.label();
    if label.len() <= MAX_DIR_NAME_LEN {
        return label;
    }

    let digest = Sha256::digest(label.as_bytes());
    let hash = digest[..4].iter().map(|b| format!("{b:02x}")).collect::<String>();
    let hash = &hash[..7];

    let suffix = format!("#{}", key.action_name);
    let reserved = "...".len() + hash.len() + suffix.len();
    let prefix_len = MAX_DIR_NAME_LEN.saturating_sub(reserved);

    let context_part = label.strip_suffix(&suffix).unwrap_or(&label);
    let prefix: String = context_part.chars().take(prefix_len).collect();

    format!("{prefix}...{hash}{suffix}")
}

/// `<project_root>/.mdl/runs/`
pub fn runs_root(project_root: &Utf8Path) -> Utf8PathBuf {
    project_root.join(".mdl").join("runs")
}

/// A fresh run directory name: `YYYYMMDD-HHMMSS-NNNNNNNNN`, lexicographically
/// sortable so `--continue` can find the most recent run by string comparison.
pub fn new_run_id(now: chrono::DateTime<chrono::Utc>) -> String {
    format!("{}-{:09}", now.format("%Y%m%d-%H%M%S"), now.timestamp_subsec_nanos())
}

/// The lexicographically greatest existing run directory under `runs_root`,
/// used to locate the prior run for `--continue`.
pub fn latest_run(runs_root: &Utf8Path) -> RunnerResult<Option<Utf8PathBuf>> {
    if !runs_root.as_std_path().exists() {
        return Ok(None);
    }
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(runs_root.as_std_path())? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                entries.push(name.to_string());
            }
        }
    }
    entries.sort();
    Ok(entries.into_iter().next_back().map(|name| runs_root.join(name)))
}

/// Write `meta` atomically: build the full content in a temp file beside the
/// target, then rename over it. A reader never observes a partially written
/// `meta.json`.
pub fn write_meta_atomic(node_dir: &Utf8Path, meta: &Meta) -> RunnerResult<()> {
    write_json_atomic(node_dir, "meta.json", meta)
}

pub fn write_output_atomic(node_dir: &Utf8Path, output: &OutputDoc) -> RunnerResult<()> {
    write_json_atomic(node_dir, "output.json", output)
}

fn write_json_atomic<T: Serialize>(node_dir: &Utf8Path, file_name: &str, value: &T) -> RunnerResult<()> {
    let final_path = node_dir.join(file_name);
    let tmp_path = node_dir.join(format!("{file_name}.tmp"));
    let mut file = std::fs::File::create(tmp_path.as_std_path())?;
    file.write_all(serde_json::to_vec_pretty(value)?.as_slice())?;
    file.sync_all()?;
    std::fs::rename(tmp_path.as_std_path(), final_path.as_std_path())?;
    Ok(())
}

pub fn read_meta(node_dir: &Utf8Path) -> RunnerResult<Meta> {
    let content = std::fs::read_to_string(node_dir.join("meta.json").as_std_path())?;
    Ok(serde_json::from_str(&content)?)
}
