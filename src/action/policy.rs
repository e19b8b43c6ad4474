//! Sandbox policy: validates and normalizes every action call before it can
//! reach a handler.
//!
//! `check` is a pure function over the call: it returns a NEW normalized
//! parameter map (absolute contained paths, word-split command vectors,
//! defaults filled in) or a typed [`PolicyError`]. It never reads file
//! contents, writes, or spawns anything -- the only filesystem interaction is
//! path canonicalization. Handlers receive normalized parameters only and
//! never re-validate raw input.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;

use super::{ActionCall, ActionName, Params};
use crate::error::PolicyError;

/// Immutable sandbox configuration. `root_dir` is canonicalized once at
/// [`ActionPolicy::new`]; everything else is used as-is.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Directory outside which no file or process operation may act.
    pub root_dir: PathBuf,
    /// Program basenames allowed for `run_command`. Empty = unrestricted.
    pub allowed_commands: BTreeSet<String>,
    /// Ceiling for any requested command timeout, and the default.
    pub command_timeout_sec: u64,
    pub max_read_bytes: usize,
    pub max_write_bytes: usize,
    pub allow_shell: bool,
    /// Captured stdout/stderr is truncated to this many characters.
    pub max_output_chars: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./workspace"),
            allowed_commands: BTreeSet::new(),
            command_timeout_sec: 10,
            max_read_bytes: 262_144,
            max_write_bytes: 1_048_576,
            allow_shell: false,
            max_output_chars: 200_000,
        }
    }
}

/// The sandbox-enforcing validator. One instance per agent hierarchy; shared
/// by both the worker and supervisor executors.
#[derive(Debug, Clone)]
pub struct ActionPolicy {
    config: PolicyConfig,
}

impl ActionPolicy {
    /// Build a policy, creating the sandbox root if needed and resolving it
    /// to a canonical path. The canonical root is the containment anchor for
    /// every subsequent path check.
    pub fn new(mut config: PolicyConfig) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.root_dir)?;
        config.root_dir = std::fs::canonicalize(&config.root_dir)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn root_dir(&self) -> &Path {
        &self.config.root_dir
    }

    /// Validate a call and return its normalized parameters.
    ///
    /// Idempotent: running `check` on already-normalized parameters yields
    /// the same map.
    pub fn check(&self, call: &ActionCall) -> Result<Params, PolicyError> {
        let name = ActionName::from_str(&call.name)?;
        let mut params = call.params.clone();

        match name {
            ActionName::ReadFile => {
                let path = self.normalize_path_param(&mut params, "path")?;
                tracing::trace!(path = %path.display(), "read_file path resolved");
                let limit = self.config.max_read_bytes;
                match opt_u64(&params, "max_bytes")? {
                    Some(requested) if requested as usize > limit => {
                        return Err(PolicyError::SizeLimitExceeded {
                            requested: requested as usize,
                            limit,
                        });
                    }
                    Some(_) => {}
                    None => {
                        params.insert("max_bytes".into(), Value::from(limit as u64));
                    }
                }
            }
            ActionName::CreateFile => {
                self.normalize_path_param(&mut params, "path")?;
                let content = match params.get("content") {
                    None => {
                        params.insert("content".into(), Value::from(""));
                        String::new()
                    }
                    Some(Value::String(s)) => s.clone(),
                    Some(_) => {
                        return Err(PolicyError::InvalidParam {
                            name: "content",
                            reason: "must be a string".into(),
                        });
                    }
                };
                if content.len() > self.config.max_write_bytes {
                    return Err(PolicyError::SizeLimitExceeded {
                        requested: content.len(),
                        limit: self.config.max_write_bytes,
                    });
                }
                opt_bool(&params, "overwrite")?;
            }
            ActionName::EditFile => {
                self.normalize_path_param(&mut params, "path")?;
                require_str(&params, "old")?;
                let new = require_str(&params, "new")?;
                if new.len() > self.config.max_write_bytes {
                    return Err(PolicyError::SizeLimitExceeded {
                        requested: new.len(),
                        limit: self.config.max_write_bytes,
                    });
                }
                opt_u64(&params, "count")?;
            }
            ActionName::GetFileTree | ActionName::GetProjectTree => {
                if params.contains_key("start_path") {
                    self.normalize_path_param(&mut params, "start_path")?;
                } else {
                    params.insert(
                        "start_path".into(),
                        Value::from(self.config.root_dir.display().to_string()),
                    );
                }
                match opt_u64(&params, "max_depth")? {
                    Some(0) => {
                        return Err(PolicyError::InvalidParam {
                            name: "max_depth",
                            reason: "must be at least 1".into(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        params.insert("max_depth".into(), Value::from(3u64));
                    }
                }
            }
            ActionName::RunCommand | ActionName::TerminalCommand => {
                self.normalize_command_params(&mut params)?;
            }
            ActionName::RunIpython => {
                require_str(&params, "code")?;
                opt_bool(&params, "reset")?;
            }
            ActionName::RunSubagent => {
                let instruction = require_str(&params, "instruction")?;
                if instruction.trim().is_empty() {
                    return Err(PolicyError::InvalidParam {
                        name: "instruction",
                        reason: "must not be empty".into(),
                    });
                }
            }
            ActionName::FinishTask | ActionName::FinishWork => {
                // Terminal signals carry no parameters worth validating.
            }
            ActionName::GetAllSymbols => {
                self.normalize_path_param(&mut params, "file_path")?;
            }
            ActionName::OpenFile => {
                self.normalize_path_param(&mut params, "file_path")?;
                opt_u64(&params, "start_line")?;
                opt_u64(&params, "end_line")?;
            }
        }

        Ok(params)
    }

    /// Resolve a path-valued parameter under the sandbox root and write the
    /// normalized absolute path back into the map.
    fn normalize_path_param(
        &self,
        params: &mut Params,
        key: &'static str,
    ) -> Result<PathBuf, PolicyError> {
        let raw = require_str(params, key)?.to_string();
        let resolved = self.resolve_path(&raw)?;
        params.insert(key.into(), Value::from(resolved.display().to_string()));
        Ok(resolved)
    }

    /// Containment algorithm: join relative paths under the root,
    /// canonicalize the longest existing prefix (resolving symlinks), resolve
    /// the non-existing remainder lexically, then require the result to be a
    /// descendant of the canonical root.
    fn resolve_path(&self, raw: &str) -> Result<PathBuf, PolicyError> {
        let joined = {
            let p = Path::new(raw);
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                self.config.root_dir.join(p)
            }
        };

        // The filesystem root always exists, so this find cannot fail.
        let existing = joined
            .ancestors()
            .find(|a| a.exists())
            .unwrap_or(Path::new("/"));

        let mut resolved = std::fs::canonicalize(existing).map_err(|_| {
            PolicyError::PathEscape {
                path: joined.clone(),
            }
        })?;

        // Remainder components cannot touch the filesystem; `..` is lexical.
        if let Ok(rest) = joined.strip_prefix(existing) {
            for comp in rest.components() {
                use std::path::Component;
                match comp {
                    Component::Normal(part) => resolved.push(part),
                    Component::ParentDir => {
                        resolved.pop();
                    }
                    Component::CurDir => {}
                    _ => {}
                }
            }
        }

        if resolved.starts_with(&self.config.root_dir) {
            Ok(resolved)
        } else {
            Err(PolicyError::PathEscape { path: joined })
        }
    }

    /// Normalize `cmd` / `shell` / `timeout_sec` / `cwd` for process actions.
    fn normalize_command_params(&self, params: &mut Params) -> Result<(), PolicyError> {
        let shell = opt_bool(params, "shell")?.unwrap_or(false);
        if shell && !self.config.allow_shell {
            return Err(PolicyError::ShellDisabled);
        }

        let (args, line) = match params.get("cmd") {
            None => return Err(PolicyError::MissingParam { name: "cmd" }),
            Some(Value::String(raw)) => {
                let words = shlex::split(raw).ok_or_else(|| PolicyError::InvalidParam {
                    name: "cmd",
                    reason: "unbalanced quoting in command line".into(),
                })?;
                (words, raw.clone())
            }
            Some(Value::Array(items)) => {
                let words = items
                    .iter()
                    .map(|v| {
                        v.as_str().map(str::to_string).ok_or(PolicyError::InvalidParam {
                            name: "cmd",
                            reason: "array elements must be strings".into(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let line = words.join(" ");
                (words, line)
            }
            Some(_) => {
                return Err(PolicyError::InvalidParam {
                    name: "cmd",
                    reason: "must be a string or an array of strings".into(),
                });
            }
        };

        if args.is_empty() {
            return Err(PolicyError::InvalidParam {
                name: "cmd",
                reason: "empty command".into(),
            });
        }

        let program = Path::new(&args[0])
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| args[0].clone());
        if !self.config.allowed_commands.is_empty()
            && !self.config.allowed_commands.contains(&program)
        {
            return Err(PolicyError::CommandNotAllowed { program });
        }

        // Shell lines keep their metacharacters verbatim; only the leading
        // program is checked against the allowlist. Exec mode gets the
        // word-split vector.
        if shell {
            params.insert("cmd".into(), Value::from(line));
        } else {
            params.insert(
                "cmd".into(),
                Value::Array(args.into_iter().map(Value::from).collect()),
            );
        }

        let ceiling = self.config.command_timeout_sec;
        match opt_u64(params, "timeout_sec")? {
            Some(requested) if requested > ceiling => {
                return Err(PolicyError::TimeoutExceedsPolicy {
                    requested,
                    limit: ceiling,
                });
            }
            Some(_) => {}
            None => {
                params.insert("timeout_sec".into(), Value::from(ceiling));
            }
        }

        if params.contains_key("cwd") {
            self.normalize_path_param(params, "cwd")?;
        } else {
            params.insert(
                "cwd".into(),
                Value::from(self.config.root_dir.display().to_string()),
            );
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Typed parameter access
// ---------------------------------------------------------------------------

fn require_str<'a>(params: &'a Params, key: &'static str) -> Result<&'a str, PolicyError> {
    match params.get(key) {
        None | Some(Value::Null) => Err(PolicyError::MissingParam { name: key }),
        Some(Value::String(s)) if s.is_empty() && key != "old" && key != "new" => {
            Err(PolicyError::MissingParam { name: key })
        }
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(PolicyError::InvalidParam {
            name: key,
            reason: "must be a string".into(),
        }),
    }
}

fn opt_u64(params: &Params, key: &'static str) -> Result<Option<u64>, PolicyError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_u64().map(Some).ok_or(PolicyError::InvalidParam {
            name: key,
            reason: "must be a non-negative integer".into(),
        }),
    }
}

fn opt_bool(params: &Params, key: &'static str) -> Result<Option<bool>, PolicyError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(PolicyError::InvalidParam {
            name: key,
            reason: "must be a boolean".into(),
        }),
    }
}
