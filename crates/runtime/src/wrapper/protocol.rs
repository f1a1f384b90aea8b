//! Result-capture protocol between a candidate and the wrapper
//!
//! The host writes one envelope line to the harness's stdin:
//!
//! `{"params": {...}, "entry_point": "name" | null}`
//!
//! The harness loads the candidate through the launcher's `run_unit`, binding
//! every parameter as a name in the candidate's namespace, then reads the
//! reserved `result` variable or calls the entry function with the parameters
//! its signature accepts. It writes exactly one line to stdout:
//!
//! `{"output": V, "output_type": "list", "error": {"type", "message", "traceback"} | null, "params_used": {...}}`
//!
//! Anything the candidate prints goes to stderr.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::InputMap;

/// Variable a candidate may assign to report its output directly
pub const RESERVED_RESULT_VARIABLE: &str = "result";

#[derive(Debug, Clone, Serialize)]
pub struct Envelope<'a> {
    pub params: &'a InputMap,
    pub entry_point: Option<&'a str>,
}

/// Encode the stdin envelope, newline terminated
pub fn encode_envelope(
    params: &InputMap,
    entry_point: Option<&str>,
) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(&Envelope {
        params,
        entry_point,
    })?;
    line.push('\n');
    Ok(line)
}

/// Failure raised inside the candidate, as reported on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireError {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub traceback: String,
}

/// The structured result line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResult {
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub output_type: Option<String>,
    #[serde(default)]
    pub error: Option<WireError>,
    #[serde(default)]
    pub params_used: InputMap,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("no structured result line on stdout")]
    Missing,

    #[error("malformed result line: {0}")]
    Malformed(String),
}

/// Find and decode the result line: the last non-empty stdout line that
/// looks like a JSON object
pub fn parse_wire_line(stdout: &str) -> Result<WireResult, ProtocolError> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or(ProtocolError::Missing)?;

    if !line.starts_with('{') {
        return Err(ProtocolError::Malformed(format!(
            "expected a JSON object, got '{}'",
            line.chars().take(80).collect::<String>()
        )));
    }

    serde_json::from_str(line).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

pub const HARNESS_SOURCE: &str = r#"import contextlib
import inspect
import json
import sys
import traceback

_UNSET = object()
_RESERVED = "result"


def _entry(scope, name):
    if not name:
        return None
    candidate = scope.get(name)
    return candidate if callable(candidate) else None


def _call(func, params):
    try:
        signature = inspect.signature(func)
    except (TypeError, ValueError):
        return func(**params)
    accepted = signature.parameters
    if any(p.kind == inspect.Parameter.VAR_KEYWORD for p in accepted.values()):
        return func(**params)
    args = []
    kwargs = {}
    for name, parameter in accepted.items():
        if name not in params:
            continue
        if parameter.kind == inspect.Parameter.POSITIONAL_ONLY:
            args.append(params[name])
        elif parameter.kind in (inspect.Parameter.POSITIONAL_OR_KEYWORD,
                                inspect.Parameter.KEYWORD_ONLY):
            kwargs[name] = params[name]
    return func(*args, **kwargs)


def _encode(payload):
    try:
        return json.dumps(payload, default=repr, allow_nan=False)
    except (TypeError, ValueError):
        payload["output"] = repr(payload["output"])
        return json.dumps(payload, default=repr)


def _main():
    real_stdout = sys.stdout
    envelope = json.loads(input())
    params = envelope.get("params") or {}
    payload = {"output": None, "output_type": None, "error": None, "params_used": params}
    try:
        namespace = {"params": dict(params)}
        namespace.update(params)
        marker = namespace.get(_RESERVED, _UNSET)
        namespace.setdefault(_RESERVED, _UNSET)
        with contextlib.redirect_stdout(sys.stderr):
            scope = run_unit(namespace)
            value = scope.get(_RESERVED, _UNSET)
            if value is not _UNSET and value is not marker:
                output = value
            else:
                func = _entry(scope, envelope.get("entry_point"))
                output = _call(func, params) if func is not None else None
        payload["output"] = output
        payload["output_type"] = type(output).__name__
    except BaseException as exc:
        trace = traceback.format_exc()
        sys.stderr.write(trace)
        payload["error"] = {"type": type(exc).__name__, "message": str(exc), "traceback": trace}
    real_stdout.write(_encode(payload) + "\n")
    real_stdout.flush()


_main()
"#;
