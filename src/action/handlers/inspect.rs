//! Read-only inspection actions used by the supervisor: `get_all_symbols`
//! and `open_file`.
//!
//! The pipeline generates Python programs, so symbol scanning looks for
//! `def` / `class` declarations. Spans run to the next declaration at the
//! same or shallower indent, which is close enough for review navigation.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;

use super::{obj, opt_u64_param, str_param, HandlerOutput};
use crate::action::{ActionResult, Params};

static SYMBOL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)(def|class)\s+([A-Za-z_]\w*)").expect("symbol pattern"));

/// List function and class declarations in a file with their line spans.
pub async fn get_all_symbols(params: &Params) -> Result<HandlerOutput, String> {
    let path = str_param(params, "file_path")?;
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("get_all_symbols: {path}: {e}"))?;

    let lines: Vec<&str> = text.lines().collect();

    struct Decl {
        kind: &'static str,
        name: String,
        indent: usize,
        start: usize,
    }

    let mut decls: Vec<Decl> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if let Some(caps) = SYMBOL_RE.captures(line) {
            let kind = if &caps[2] == "def" { "def" } else { "class" };
            decls.push(Decl {
                kind,
                name: caps[3].to_string(),
                indent: caps[1].len(),
                start: i + 1,
            });
        }
    }

    let mut rendered = Vec::with_capacity(decls.len());
    for (i, decl) in decls.iter().enumerate() {
        // Span ends before the next declaration at the same or shallower
        // indent, or at the last non-blank line of the file.
        let end = decls[i + 1..]
            .iter()
            .find(|d| d.indent <= decl.indent)
            .map(|d| d.start - 1)
            .unwrap_or_else(|| {
                lines
                    .iter()
                    .rposition(|l| !l.trim().is_empty())
                    .map(|p| p + 1)
                    .unwrap_or(decl.start)
            });
        rendered.push(format!(
            "{}: {} (lines {}-{})",
            decl.kind,
            decl.name,
            decl.start,
            end.max(decl.start)
        ));
    }

    let symbols = if rendered.is_empty() {
        "No symbols found.".to_string()
    } else {
        rendered.join("\n")
    };
    Ok(ActionResult::ok(obj(json!({ "symbols": symbols }))).into())
}

/// Return a numbered slice of a file. Lines are 1-based and the range is
/// clamped to the file.
pub async fn open_file(params: &Params) -> Result<HandlerOutput, String> {
    let path = str_param(params, "file_path")?;
    let start_line = opt_u64_param(params, "start_line").unwrap_or(1).max(1) as usize;
    let end_line = opt_u64_param(params, "end_line").map(|v| v as usize);

    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("open_file: {path}: {e}"))?;

    let lines: Vec<&str> = text.lines().collect();
    let end = end_line.unwrap_or(lines.len()).min(lines.len());
    let start = start_line.min(end.max(1));

    let mut content = String::new();
    for (offset, line) in lines[start.saturating_sub(1)..end].iter().enumerate() {
        content.push_str(&format!("{}: {}\n", start + offset, line));
    }

    Ok(ActionResult::ok(obj(json!({ "content": content }))).into())
}
