//! Language runtime: turns a selected version's script template into a
//! spawnable command, plus (for non-Bash runtimes) a sidecar context file.
//!
//! Bash scripts interpolate every reference inline — arrays render as
//! whitespace-separated tokens — so a Bash script is fully
//! self-contained once rendered. Python scripts instead get their args/flags
//! through a JSON sidecar, since a whitespace-joined array loses structure a
//! Python script would want to reconstruct; only `sys`/`env`/action-output/
//! `retained` references are still inlined textually for Python, matching
//! what a human author would reasonably expect from `${...}` in either
//! language.

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;

use crate::ast::{ActionVersion, Expansion, ExpansionContext, Language};
use crate::context::ActionKey;
use crate::error::{RunnerError, RunnerResult};

/// Everything the executor needs to spawn a node's script.
pub struct PreparedScript {
    pub script_path: Utf8PathBuf,
    pub sidecar_path: Option<Utf8PathBuf>,
    pub command: Vec<String>,
}

/// Render `version`'s script into `node_dir`, writing a sidecar context file
/// first if the language needs one.
pub fn prepare_script(
    node_dir: &Utf8Path,
    version: &ActionVersion,
    ctx: &ExpansionContext,
    key: &ActionKey,
) -> RunnerResult<PreparedScript> {
    let sidecar_path = match version.language {
        Language::Bash => None,
        Language::Python => {
            let path = node_dir.join("context.json");
            let sidecar = build_sidecar(ctx);
            std::fs::write(path.as_std_path(), serde_json::to_vec_pretty(&sidecar)?)?;
            Some(path)
        }
    };

    let resolver = |path: &str| -> RunnerResult<String> {
        let expansion = Expansion::parse_path(path).ok_or_else(|| RunnerError::UnresolvedDependency {
            key: key.clone(),
            detail: format!("unrecognized reference '${{{path}}}'"),
        })?;
        expansion.resolve(ctx, key)
    };

    let rendered = crate::ast::substitute(&version.script, resolver)?;
    let script_path = node_dir.join(format!("script.{}", version.language.script_extension()));
    std::fs::write(script_path.as_std_path(), rendered.as_bytes())?;
    make_executable(&script_path)?;

    let command = match version.language {
        Language::Bash => vec!["bash".to_string(), script_path.to_string()],
        Language::Python => vec!["python3".to_string(), script_path.to_string()],
    };

    Ok(PreparedScript { script_path, sidecar_path, command })
}

#[cfg(unix)]
fn make_executable(path: &Utf8Path) -> RunnerResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path.as_std_path())?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    std::fs::set_permissions(path.as_std_path(), perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Utf8Path) -> RunnerResult<()> {
    Ok(())
}

/// Sidecar JSON handed to structured-language scripts: their args and flags
/// as real JSON values, never flattened through the whitespace-join path.
fn build_sidecar(ctx: &ExpansionContext) -> Value {
    let args: std::collections::HashMap<&str, &Value> =
        ctx.args.iter().map(|(k, v)| (k.as_str(), v)).collect();
    let flags: std::collections::HashMap<&str, bool> =
        ctx.flags.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    serde_json::json!({ "args": args, "flags": flags })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SourceLocation;
    use rustc_hash::FxHashMap;
    use tempfile::tempdir;

    fn loc() -> SourceLocation {
        SourceLocation { file_path: "x.md".into(), line_number: 1, section_name: "x".into() }
    }

    fn empty_ctx<'a>(
        sys: &'a FxHashMap<String, String>,
        env: &'a FxHashMap<String, String>,
        args: &'a FxHashMap<String, Value>,
        flags: &'a FxHashMap<String, bool>,
        actions: &'a FxHashMap<String, FxHashMap<String, Value>>,
        retained: &'a dyn Fn(&str) -> bool,
    ) -> ExpansionContext<'a> {
        ExpansionContext { sys, env, args, flags, actions, retained }
    }

    #[test]
    fn bash_script_renders_inline_and_needs_no_sidecar() {
        let dir = tempdir().unwrap();
        let node_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        let sys = FxHashMap::default();
        let env = FxHashMap::default();
        let mut args = FxHashMap::default();
        args.insert("name".to_string(), Value::String("alice".into()));
        let flags = FxHashMap::default();
        let actions = FxHashMap::default();
        let retained = |_: &str| false;
        let ctx = empty_ctx(&sys, &env, &args, &flags, &actions, &retained);
        let key = ActionKey::default_context("build");

        let version = ActionVersion {
            language: Language::Bash,
            script: "echo ${args.name}".into(),
            expansions: vec![],
            returns: vec![],
            dependencies: vec![],
            conditions: vec![],
            location: loc(),
        };

        let prepared = prepare_script(&node_dir, &version, &ctx, &key).unwrap();
        assert!(prepared.sidecar_path.is_none());
        let content = std::fs::read_to_string(prepared.script_path.as_std_path()).unwrap();
        assert_eq!(content, "echo alice");
        assert_eq!(prepared.command[0], "bash");
    }

    #[test]
    fn python_script_gets_a_sidecar_context_file() {
        let dir = tempdir().unwrap();
        let node_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        let sys = FxHashMap::default();
        let env = FxHashMap::default();
        let mut args = FxHashMap::default();
        args.insert("name".to_string(), Value::String("alice".into()));
        let flags = FxHashMap::default();
        let actions = FxHashMap::default();
        let retained = |_: &str| false;
        let ctx = empty_ctx(&sys, &env, &args, &flags, &actions, &retained);
        let key = ActionKey::default_context("build");

        let version = ActionVersion {
            language: Language::Python,
            script: "print('hi')".into(),
            expansions: vec![],
            returns: vec![],
            dependencies: vec![],
            conditions: vec![],
            location: loc(),
        };

        let prepared = prepare_script(&node_dir, &version, &ctx, &key).unwrap();
        let sidecar_path = prepared.sidecar_path.unwrap();
        let sidecar: Value = serde_json::from_str(&std::fs::read_to_string(sidecar_path.as_std_path()).unwrap()).unwrap();
        assert_eq!(sidecar["args"]["name"], "alice");
        assert_eq!(prepared.command[0], "python3");
    }

    #[test]
    fn unrecognized_reference_is_an_error() {
        let dir = tempdir().unwrap();
        let node_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let sys = FxHashMap::default();
        let env = FxHashMap::default();
        let args = FxHashMap::default();
        let flags = FxHashMap::default();
        let actions = FxHashMap::default();
        let retained = |_: &str| false;
        let ctx = empty_ctx(&sys, &env, &args, &flags, &actions, &retained);
        let key = ActionKey::default_context("build");

        let version = ActionVersion {
            language: Language::Bash,
            script: "echo ${bogus.thing}".into(),
            expansions: vec![],
            returns: vec![],
            dependencies: vec![],
            conditions: vec![],
            location: loc(),
        };

        assert!(prepare_script(&node_dir, &version, &ctx, &key).is_err());
    }
}
