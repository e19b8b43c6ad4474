//! Filesystem actions: `read_file`, `create_file`, `edit_file`, and the
//! directory-tree renderers.
//!
//! Paths arriving here are absolute and contained -- the policy resolved them.

use std::path::Path;

use serde_json::json;

use super::{bool_param, obj, opt_u64_param, str_param, u64_param, HandlerOutput};
use crate::action::{ActionResult, Params};

/// Read a file, capped at the normalized `max_bytes`. Invalid UTF-8 is
/// replaced rather than rejected, matching how agents consume mixed output.
pub async fn read_file(params: &Params) -> Result<HandlerOutput, String> {
    let path = str_param(params, "path")?;
    let max_bytes = u64_param(params, "max_bytes")? as usize;

    let mut data = tokio::fs::read(path)
        .await
        .map_err(|e| format!("read_file: {path}: {e}"))?;
    data.truncate(max_bytes);
    let content = String::from_utf8_lossy(&data).into_owned();

    Ok(ActionResult::ok(obj(json!({
        "path": path,
        "content": content,
    })))
    .into())
}

/// Create (or overwrite) a file, creating parent directories as needed.
pub async fn create_file(params: &Params) -> Result<HandlerOutput, String> {
    let path = str_param(params, "path")?;
    let content = str_param(params, "content")?;
    let overwrite = bool_param(params, "overwrite", true);

    let target = Path::new(path);
    if !overwrite && target.exists() {
        return Ok(ActionResult::fail(format!("create_file: {path}: file exists")).into());
    }
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("create_file: {path}: {e}"))?;
    }
    tokio::fs::write(target, content)
        .await
        .map_err(|e| format!("create_file: {path}: {e}"))?;

    Ok(ActionResult::ok(obj(json!({
        "path": path,
        "bytes": content.len(),
    })))
    .into())
}

/// Replace occurrences of `old` with `new` in a file. `count` bounds the
/// number of replacements; unset means replace all.
pub async fn edit_file(params: &Params) -> Result<HandlerOutput, String> {
    let path = str_param(params, "path")?;
    let old = str_param(params, "old")?;
    let new = str_param(params, "new")?;
    let count = opt_u64_param(params, "count");

    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("edit_file: {path}: {e}"))?;

    let occurrences = if old.is_empty() {
        0
    } else {
        text.matches(old).count()
    };

    let (updated, replaced) = match count {
        None => (text.replace(old, new), occurrences),
        Some(n) => (
            text.replacen(old, new, n as usize),
            occurrences.min(n as usize),
        ),
    };

    tokio::fs::write(path, &updated)
        .await
        .map_err(|e| format!("edit_file: {path}: {e}"))?;

    Ok(ActionResult::ok(obj(json!({
        "path": path,
        "replaced": replaced,
    })))
    .into())
}

/// Render an indented directory tree below `start_path`, depth-capped.
/// Dotfiles are skipped; directories sort before files.
pub async fn file_tree(params: &Params) -> Result<HandlerOutput, String> {
    let start = str_param(params, "start_path")?.to_string();
    let max_depth = u64_param(params, "max_depth")? as usize;

    // Directory walking is cheap at these depths; std::fs keeps it simple.
    let rendered = tokio::task::spawn_blocking(move || {
        let mut out = String::new();
        render_dir(Path::new(&start), 0, max_depth, &mut out)?;
        Ok::<String, String>(out)
    })
    .await
    .map_err(|e| format!("get_file_tree: {e}"))??;

    let tree = if rendered.is_empty() {
        "(empty)".to_string()
    } else {
        rendered
    };
    Ok(ActionResult::ok(obj(json!({ "tree": tree }))).into())
}

fn render_dir(dir: &Path, depth: usize, max_depth: usize, out: &mut String) -> Result<(), String> {
    if depth >= max_depth {
        return Ok(());
    }
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| format!("get_file_tree: {}: {e}", dir.display()))?
        .filter_map(|e| e.ok())
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .collect();
    entries.sort_by_key(|e| {
        let is_file = e.file_type().map(|t| t.is_file()).unwrap_or(true);
        (is_file, e.file_name())
    });

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        let indent = "  ".repeat(depth);
        if is_dir {
            out.push_str(&format!("{indent}{name}/\n"));
            render_dir(&entry.path(), depth + 1, max_depth, out)?;
        } else {
            out.push_str(&format!("{indent}{name}\n"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    fn unwrap_result(output: HandlerOutput) -> ActionResult {
        match output {
            HandlerOutput::Result(r) => r,
            HandlerOutput::Value(v) => panic!("expected full result, got value {v}"),
        }
    }

    #[tokio::test]
    async fn read_file_returns_content_capped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("f.txt");
        std::fs::write(&path, "0123456789").unwrap();

        let out = read_file(&params(json!({
            "path": path.to_str().unwrap(),
            "max_bytes": 4u64,
        })))
        .await
        .unwrap();

        let result = unwrap_result(out);
        assert!(result.success);
        assert_eq!(result.data.unwrap()["content"], "0123");
    }

    #[tokio::test]
    async fn create_file_makes_parent_dirs_and_reports_bytes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a/b/c.txt");

        let out = create_file(&params(json!({
            "path": path.to_str().unwrap(),
            "content": "hello",
        })))
        .await
        .unwrap();

        let result = unwrap_result(out);
        assert!(result.success);
        assert_eq!(result.data.unwrap()["bytes"], 5);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[tokio::test]
    async fn create_file_respects_overwrite_false() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("f.txt");
        std::fs::write(&path, "original").unwrap();

        let out = create_file(&params(json!({
            "path": path.to_str().unwrap(),
            "content": "clobber",
            "overwrite": false,
        })))
        .await
        .unwrap();

        let result = unwrap_result(out);
        assert!(!result.success);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
    }

    #[tokio::test]
    async fn edit_file_replaces_bounded_count() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("f.txt");
        std::fs::write(&path, "x x x").unwrap();

        let out = edit_file(&params(json!({
            "path": path.to_str().unwrap(),
            "old": "x",
            "new": "y",
            "count": 2u64,
        })))
        .await
        .unwrap();

        let result = unwrap_result(out);
        assert!(result.success);
        assert_eq!(result.data.unwrap()["replaced"], 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "y y x");
    }

    #[tokio::test]
    async fn edit_file_missing_target_reports_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("absent.txt");

        let err = edit_file(&params(json!({
            "path": path.to_str().unwrap(),
            "old": "a",
            "new": "b",
        })))
        .await
        .unwrap_err();
        assert!(err.contains("edit_file"));
    }

    #[tokio::test]
    async fn file_tree_renders_nested_entries() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("src")).unwrap();
        std::fs::write(tmp.path().join("src/app.py"), "").unwrap();
        std::fs::write(tmp.path().join("README.md"), "").unwrap();
        std::fs::write(tmp.path().join(".hidden"), "").unwrap();

        let out = file_tree(&params(json!({
            "start_path": tmp.path().to_str().unwrap(),
            "max_depth": 3u64,
        })))
        .await
        .unwrap();

        let result = unwrap_result(out);
        let tree = result.data.unwrap()["tree"].as_str().unwrap().to_string();
        assert!(tree.contains("src/"));
        assert!(tree.contains("  app.py"));
        assert!(tree.contains("README.md"));
        assert!(!tree.contains(".hidden"));
    }
}
