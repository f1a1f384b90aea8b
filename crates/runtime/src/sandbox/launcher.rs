//! Guard program hosted by the language runtime
//!
//! Python units never run directly. The runtime starts `launcher.py`, which
//! reads a policy document, applies resource limits from inside the
//! interpreter, builds the builtin namespace the policy allows, installs an
//! import guard and then either runs the unit or hands a `run_unit` loader to a
//! trusted harness. The unit source is compiled on its own and never spliced
//! into other source text.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::scratch::RunDir;
use super::ExecutionRequest;
use crate::config::{ResourceLimits, SecurityPolicy};
use crate::types::SandboxError;

pub const LAUNCHER_FILE: &str = "launcher.py";
pub const POLICY_FILE: &str = "policy.json";
pub const HARNESS_FILE: &str = "harness.py";

/// Policy document read by the launcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherPolicy {
    pub restrict_builtins: bool,
    pub allowed_builtins: Vec<String>,
    pub blocked_builtins: Vec<String>,
    pub allowed_modules: Vec<String>,
    pub blocked_modules: Vec<String>,
    /// Reject `_private` attribute access in the unit source
    pub guard_private_attributes: bool,
    /// Limits the launcher applies to its own interpreter; absent when the
    /// host already set them before exec
    pub limits: Option<LauncherLimits>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherLimits {
    pub memory_bytes: u64,
    pub cpu_seconds: u64,
    pub file_size_bytes: u64,
    pub open_files: u64,
}

impl LauncherPolicy {
    pub fn new(policy: &SecurityPolicy, limits: Option<&ResourceLimits>) -> Self {
        Self {
            restrict_builtins: policy.restrict_builtins,
            allowed_builtins: policy.allowed_builtins.clone(),
            blocked_builtins: policy.blocked_builtins.clone(),
            allowed_modules: policy.allowed_modules.clone(),
            blocked_modules: policy.blocked_modules.clone(),
            guard_private_attributes: policy.restrict_builtins,
            limits: limits.map(|l| LauncherLimits {
                memory_bytes: l.memory_bytes,
                cpu_seconds: l.cpu_time_seconds,
                file_size_bytes: l.file_size_bytes,
                open_files: l.max_open_files,
            }),
        }
    }
}

/// Files materialised in a run directory for one launch
#[derive(Debug, Clone)]
pub struct LaunchFiles {
    pub launcher: PathBuf,
    pub policy: PathBuf,
    pub code: PathBuf,
    pub harness: Option<PathBuf>,
}

impl LaunchFiles {
    /// Arguments following the runtime executable
    pub fn args(&self, runtime_args: &[&str]) -> Vec<String> {
        let mut args: Vec<String> = runtime_args.iter().map(|a| a.to_string()).collect();
        args.push(self.launcher.display().to_string());
        args.push(self.policy.display().to_string());
        args.push(self.code.display().to_string());
        if let Some(harness) = &self.harness {
            args.push(harness.display().to_string());
        }
        args
    }
}

/// Write launcher, policy, unit and optional harness into the run directory
pub fn prepare(
    run_dir: &RunDir,
    request: &ExecutionRequest,
    policy: &LauncherPolicy,
) -> Result<LaunchFiles, SandboxError> {
    let policy_json =
        serde_json::to_string_pretty(policy).map_err(|e| SandboxError::Settings(e.to_string()))?;

    let code_name = format!("candidate.{}", request.language.file_extension());
    Ok(LaunchFiles {
        launcher: run_dir.write_file(LAUNCHER_FILE, LAUNCHER_SOURCE)?,
        policy: run_dir.write_file(POLICY_FILE, &policy_json)?,
        code: run_dir.write_file(&code_name, &request.code)?,
        harness: match &request.harness {
            Some(source) => Some(run_dir.write_file(HARNESS_FILE, source)?),
            None => None,
        },
    })
}

pub const LAUNCHER_SOURCE: &str = r#"import ast as _ast
import builtins as _builtins
import json as _json
import sys as _sys


class SandboxViolation(Exception):
    pass


with open(_sys.argv[1], "r", encoding="utf-8") as _handle:
    _POLICY = _json.load(_handle)
with open(_sys.argv[2], "r", encoding="utf-8") as _handle:
    _SOURCE = _handle.read()
_HARNESS_PATH = _sys.argv[3] if len(_sys.argv) > 3 else None

_REAL_IMPORT = _builtins.__import__
_BLOCKED_MODULES = frozenset(_POLICY["blocked_modules"])
_ALLOWED_MODULES = frozenset(_POLICY["allowed_modules"])
_RESTRICTED = bool(_POLICY["restrict_builtins"])
_PUBLIC_DUNDERS = frozenset(["__name__", "__doc__", "__init__", "__len__", "__iter__",
                             "__next__", "__repr__", "__str__", "__eq__", "__lt__",
                             "__hash__", "__call__", "__getitem__", "__contains__"])


def _apply_limits(limits):
    if not limits:
        return
    try:
        import resource as _resource
    except ImportError:
        return
    for key, name in (("memory_bytes", "RLIMIT_AS"), ("cpu_seconds", "RLIMIT_CPU"),
                      ("file_size_bytes", "RLIMIT_FSIZE"), ("open_files", "RLIMIT_NOFILE")):
        value = limits.get(key)
        if value and hasattr(_resource, name):
            hard = value + 1 if name == "RLIMIT_CPU" else value
            try:
                _resource.setrlimit(getattr(_resource, name), (value, hard))
            except (ValueError, OSError):
                pass


def _guarded_import(name, globals=None, locals=None, fromlist=(), level=0):
    root = name.split(".")[0]
    if level == 0:
        if root in _BLOCKED_MODULES:
            if _RESTRICTED:
                raise ImportError("import of '%s' is not allowed in restricted mode" % name)
            raise ImportError("import of '%s' is not allowed in this sandbox" % name)
        if _RESTRICTED and root not in _ALLOWED_MODULES:
            raise ImportError("import of '%s' is not allowed in restricted mode" % name)
    return _REAL_IMPORT(name, globals, locals, fromlist, level)


def _check_attribute(name):
    if isinstance(name, str) and name.startswith("_") and name not in _PUBLIC_DUNDERS:
        raise SandboxViolation("access to private attribute '%s' is not allowed" % name)


def _safe_getattr(obj, name, *default):
    _check_attribute(name)
    return getattr(obj, name, *default)


def _safe_hasattr(obj, name):
    _check_attribute(name)
    return hasattr(obj, name)


def _safe_setattr(obj, name, value):
    _check_attribute(name)
    return setattr(obj, name, value)


def _check_tree(tree):
    for node in _ast.walk(tree):
        if isinstance(node, _ast.Attribute):
            _check_attribute(node.attr)
        elif isinstance(node, _ast.Name) and node.id.startswith("__") and node.id not in _PUBLIC_DUNDERS:
            raise SandboxViolation("access to private attribute '%s' is not allowed" % node.id)


def _make_builtins():
    if _RESTRICTED:
        table = {}
        for name in _POLICY["allowed_builtins"]:
            if hasattr(_builtins, name):
                table[name] = getattr(_builtins, name)
        if "getattr" in table:
            table["getattr"] = _safe_getattr
        if "hasattr" in table:
            table["hasattr"] = _safe_hasattr
        if "setattr" in table:
            table["setattr"] = _safe_setattr
    else:
        table = dict(vars(_builtins))
        for name in _POLICY["blocked_builtins"]:
            table.pop(name, None)
    table["__import__"] = _guarded_import
    return table


def run_unit(namespace=None):
    scope = {"__builtins__": _make_builtins(), "__name__": "__candidate__"}
    if namespace:
        scope.update(namespace)
    tree = _ast.parse(_SOURCE, filename="<candidate>", mode="exec")
    if _POLICY.get("guard_private_attributes"):
        _check_tree(tree)
    exec(compile(tree, "<candidate>", "exec"), scope)
    return scope


_apply_limits(_POLICY.get("limits"))

if _HARNESS_PATH is None:
    run_unit()
else:
    with open(_HARNESS_PATH, "r", encoding="utf-8") as _handle:
        _harness_source = _handle.read()
    exec(compile(_harness_source, "<harness>", "exec"),
         {"__name__": "__main__", "__builtins__": _builtins, "run_unit": run_unit})
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExecutionConfig, IsolationMode, Language};
    use crate::sandbox::scratch::ScratchSpace;
    use crate::types::RunId;

    #[test]
    fn test_policy_mirrors_security_view() {
        let config = ExecutionConfig {
            mode: IsolationMode::RestrictedInterpreter,
            ..Default::default()
        };
        let policy = LauncherPolicy::new(&config.security_policy(), None);
        assert!(policy.restrict_builtins);
        assert!(policy.guard_private_attributes);
        assert!(policy.blocked_builtins.contains(&"eval".to_string()));
        assert!(policy.limits.is_none());
    }

    #[test]
    fn test_prepare_writes_all_files() {
        let scratch = ScratchSpace::new().unwrap();
        let run = scratch.create_run_dir(&RunId::new()).unwrap();
        let config = ExecutionConfig::default();
        let limits = config.resource_limits();
        let policy = LauncherPolicy::new(&config.security_policy(), Some(&limits));
        let request = ExecutionRequest::new("result = 1", Language::Python)
            .with_harness("run_unit()");

        let files = prepare(&run, &request, &policy).unwrap();
        assert!(files.launcher.exists());
        assert!(files.code.ends_with("candidate.py"));
        assert_eq!(std::fs::read_to_string(&files.code).unwrap(), "result = 1");

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&files.policy).unwrap()).unwrap();
        assert_eq!(written["limits"]["memory_bytes"], limits.memory_bytes);

        let args = files.args(&["-I", "-B"]);
        assert_eq!(args.len(), 6);
        assert_eq!(args[0], "-I");
        assert!(args[5].ends_with(HARNESS_FILE));
    }
}
