//! Generates the self-contained script run by the isolated process.
//!
//! One file, three parts: a preamble that diverts stdout, builds the
//! restricted builtins table, and arms the seccomp filter; the caller's
//! code and variables, embedded as a base64 JSON blob (never argv, never
//! the environment — both leak through shell escaping and length limits);
//! and a shim that decodes the blob, executes the code, calls the declared
//! entry function, and writes exactly one JSON line to the real stdout.
//!
//! User code runs against its own `__builtins__` table: `__import__` is the
//! guarded version, `open` raises, `print` is silenced. Stdlib modules keep
//! the real builtins, so an allowed module whose internals import a blocked
//! one (`random` pulling `os.urandom`) still loads.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sandbox::{HostCapability, SecurityPolicy, Variables};

use crate::seccomp;

// Replace-token template, not format!: the Python braces stay literal.
const HARNESS: &str = r#"import base64 as _b64
import builtins as _builtins
import ctypes as _ctypes
import hmac as _hmac
import inspect as _inspect
import io as _io
import json as _json
import math as _math
import sys as _sys
import time as _time
import urllib.parse as _urllib_parse

_REAL_STDOUT = _sys.stdout


def _emit(obj):
    _REAL_STDOUT.write(_json.dumps(obj, ensure_ascii=False, default=str) + "\n")
    _REAL_STDOUT.flush()


_BLOCKED_MODULES = frozenset([__BLOCKED_MODULES__])
_real_import = _builtins.__import__


def _guarded_import(name, globals=None, locals=None, fromlist=(), level=0):
    top = name.split(".")[0]
    if top in _BLOCKED_MODULES:
        raise ImportError("Importing " + top + " is not allowed")
    return _real_import(name, globals, locals, fromlist, level)


def _restricted_open(*args, **kwargs):
    raise PermissionError("File system access is not allowed in sandbox")


def _silenced_print(*args, **kwargs):
    pass


def _safe_builtins():
    table = {}
    for name in dir(_builtins):
        if name.startswith("_") and name not in (
            "__name__", "__doc__", "__import__", "__build_class__",
        ):
            continue
        table[name] = getattr(_builtins, name)
    table["__import__"] = _guarded_import
    table["__build_class__"] = _builtins.__build_class__
    table["open"] = _restricted_open
    table["print"] = _silenced_print
    return table


def _install_syscall_filter():
    prog = _b64.b64decode("__SECCOMP_FILTER_B64__")
    libc = _ctypes.CDLL(None, use_errno=True)
    # PR_SET_NO_NEW_PRIVS = 38
    if libc.prctl(38, 1, 0, 0, 0) != 0:
        raise OSError("PR_SET_NO_NEW_PRIVS failed: errno %d" % _ctypes.get_errno())
    buf = _ctypes.create_string_buffer(prog, len(prog))

    class _SockFprog(_ctypes.Structure):
        _fields_ = [("len", _ctypes.c_ushort), ("filter", _ctypes.c_void_p)]

    fprog = _SockFprog(len(prog) // 8, _ctypes.cast(buf, _ctypes.c_void_p))
    # PR_SET_SECCOMP = 22, SECCOMP_MODE_FILTER = 2
    if libc.prctl(22, 2, _ctypes.byref(fprog), 0, 0) != 0:
        raise OSError("seccomp install failed: errno %d" % _ctypes.get_errno())


_PAYLOAD = _json.loads(_b64.b64decode("__PAYLOAD_B64__").decode("utf-8"))


def _count_token(text):
    if not isinstance(text, str):
        text = str(text)
    return _math.ceil(len(text) / 4)


def _str_to_base64(text, prefix=""):
    return prefix + _b64.b64encode(text.encode("utf-8")).decode("utf-8")


def _create_hmac(algorithm, secret):
    timestamp = str(int(_time.time() * 1000))
    string_to_sign = timestamp + "\n" + secret
    mac = _hmac.new(secret.encode("utf-8"), string_to_sign.encode("utf-8"), algorithm)
    sign = _urllib_parse.quote(_b64.b64encode(mac.digest()).decode("utf-8"))
    return {"timestamp": timestamp, "sign": sign}


def _delay(ms):
    if ms > 10000:
        raise ValueError("Delay must be <= 10000ms")
    _time.sleep(ms / 1000)


_HELPERS = {__HELPERS__}


def _call_entry(entry, variables):
    sig = _inspect.signature(entry)
    params = list(sig.parameters.values())
    if len(params) == 0:
        return entry()
    if len(params) == 1:
        return entry(variables)
    args = []
    for p in params:
        if p.name in variables:
            args.append(variables[p.name])
        elif p.default is not _inspect.Parameter.empty:
            break
        else:
            raise TypeError("missing required argument: '%s'" % p.name)
    return entry(*args)


def _run():
    code = _PAYLOAD["code"]
    variables = _PAYLOAD.get("variables") or {}
    globs = {
        "__builtins__": _safe_builtins(),
        "variables": variables,
        "print": _silenced_print,
    }
    globs.update(_HELPERS)
    for k, v in variables.items():
        globs.setdefault(k, v)
    exec(compile(code, "<snippet>", "exec"), globs)
    entry = globs.get("main")
    if not callable(entry):
        raise RuntimeError("No 'main' function defined")
    result = _call_entry(entry, variables)
    _emit({"success": True, "data": {"codeReturn": result, "log": ""}})


_sys.stdout = _io.StringIO()
try:
    _install_syscall_filter()
    _run()
except BaseException as e:
    _emit({"success": False, "message": str(e) or e.__class__.__name__})
"#;

/// Render the script for one execution.
pub fn build(code: &str, variables: &Variables, policy: &SecurityPolicy) -> String {
    let payload = serde_json::json!({ "code": code, "variables": variables }).to_string();

    let blocked = policy
        .blocked_modules()
        .iter()
        .map(|m| format!("\"{m}\""))
        .collect::<Vec<_>>()
        .join(", ");

    // Helper bindings for the snippet's globals, snake_case plus the
    // camelCase aliases of the upstream surface, gated per capability.
    let mut helpers = Vec::new();
    if policy.allows_capability(HostCapability::CountToken) {
        helpers.push("\"count_token\": _count_token, \"countToken\": _count_token");
    }
    if policy.allows_capability(HostCapability::StrToBase64) {
        helpers.push("\"str_to_base64\": _str_to_base64, \"strToBase64\": _str_to_base64");
    }
    if policy.allows_capability(HostCapability::CreateHmac) {
        helpers.push("\"create_hmac\": _create_hmac, \"createHmac\": _create_hmac");
    }
    if policy.allows_capability(HostCapability::Delay) {
        helpers.push("\"delay\": _delay");
    }

    HARNESS
        .replace("__BLOCKED_MODULES__", &blocked)
        .replace("__HELPERS__", &helpers.join(", "))
        .replace(
            "__SECCOMP_FILTER_B64__",
            &BASE64.encode(seccomp::filter_program(policy.syscall_allowlist())),
        )
        .replace("__PAYLOAD_B64__", &BASE64.encode(payload))
}
