//! Host capabilities exposed into the isolated context.
//!
//! Native functions are registered under `__sb_`-prefixed globals, then a JS
//! prelude shapes the public surface (`console`, `delay`, `countToken`,
//! `strToBase64`, `createHmac`) and bundles the enabled capabilities into
//! the context object handed to the entry function. Only capabilities named
//! in the security policy are installed — everything else simply does not
//! exist inside the context.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rquickjs::Ctx;
use rquickjs::function::{Func, Opt};
use sandbox::{HostCapability, SecurityPolicy};
use sha2::{Sha256, Sha512};

/// Log lines collected from the snippet's `console` calls. Single-threaded
/// by construction — the whole context lives on one blocking thread.
pub type LogBuffer = Rc<RefCell<Vec<String>>>;

/// `encodeURIComponent` keeps alphanumerics plus `- _ . ! ~ * ' ( )`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn install(
    ctx: &Ctx<'_>,
    policy: &SecurityPolicy,
    max_delay: Duration,
    logs: LogBuffer,
) -> rquickjs::Result<()> {
    let globals = ctx.globals();

    globals.set(
        "__sb_log",
        Func::from(move |line: String| logs.borrow_mut().push(line)),
    )?;

    if policy.allows_capability(HostCapability::CountToken) {
        globals.set("__sb_count_token", Func::from(count_token))?;
    }

    if policy.allows_capability(HostCapability::Delay) {
        // The cap is enforced in the prelude (visible error message); the
        // native side clamps again so a bypass of the wrapper still cannot
        // outsleep the budget.
        let cap_ms = max_delay.as_millis() as f64;
        globals.set(
            "__sb_delay",
            Func::from(move |ms: f64| {
                let ms = ms.clamp(0.0, cap_ms);
                std::thread::sleep(Duration::from_millis(ms as u64));
            }),
        )?;
    }

    if policy.allows_capability(HostCapability::StrToBase64) {
        globals.set(
            "__sb_str_to_base64",
            Func::from(|text: String, prefix: Opt<String>| {
                format!("{}{}", prefix.0.unwrap_or_default(), BASE64.encode(text))
            }),
        )?;
    }

    if policy.allows_capability(HostCapability::CreateHmac) {
        globals.set("__sb_create_hmac", Func::from(create_hmac))?;
    }

    ctx.eval::<(), _>(prelude(policy, max_delay).into_bytes())?;
    Ok(())
}

fn count_token(text: String) -> u32 {
    (text.chars().count() as u32).div_ceil(4)
}

/// Sign `"{timestamp}\n{secret}"` with the secret. Returns a JSON string —
/// either `{timestamp, sign}` or `{error}` — which the prelude wrapper
/// parses and rethrows; this keeps the native closure free of engine types.
fn create_hmac(algorithm: String, secret: String) -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .to_string();
    let string_to_sign = format!("{timestamp}\n{secret}");

    // HMAC accepts keys of any length, so new_from_slice cannot fail.
    let digest: Vec<u8> = match algorithm.as_str() {
        "sha256" => match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
            Ok(mut mac) => {
                mac.update(string_to_sign.as_bytes());
                mac.finalize().into_bytes().to_vec()
            }
            Err(_) => Vec::new(),
        },
        "sha512" => match Hmac::<Sha512>::new_from_slice(secret.as_bytes()) {
            Ok(mut mac) => {
                mac.update(string_to_sign.as_bytes());
                mac.finalize().into_bytes().to_vec()
            }
            Err(_) => Vec::new(),
        },
        other => {
            return serde_json::json!({
                "error": format!("Unsupported HMAC algorithm: {other}")
            })
            .to_string();
        }
    };

    let sign = utf8_percent_encode(&BASE64.encode(digest), URI_COMPONENT).to_string();
    serde_json::json!({ "timestamp": timestamp, "sign": sign }).to_string()
}

/// JS prelude evaluated before any user line: console rewiring plus the
/// public wrappers around the native capability functions.
fn prelude(policy: &SecurityPolicy, max_delay: Duration) -> String {
    let mut src = String::from(
        r#"globalThis.console = (() => {
  const show = (v) => {
    if (typeof v === 'object' && v !== null) {
      try { return JSON.stringify(v); } catch (_) { return String(v); }
    }
    return String(v);
  };
  const log = (...args) => __sb_log(args.map(show).join(' '));
  return { log, info: log, warn: log, error: log, debug: log };
})();
"#,
    );

    if policy.allows_capability(HostCapability::CountToken) {
        src.push_str("globalThis.countToken = (text) => __sb_count_token(String(text));\n");
    }
    if policy.allows_capability(HostCapability::Delay) {
        let cap_ms = max_delay.as_millis();
        src.push_str(&format!(
            "globalThis.delay = (ms) => {{ const n = Number(ms); \
             if (!(n <= {cap_ms})) throw new Error('Delay must be <= {cap_ms}ms'); \
             __sb_delay(n); }};\n"
        ));
    }
    if policy.allows_capability(HostCapability::StrToBase64) {
        src.push_str(
            "globalThis.strToBase64 = (str, prefix) => prefix === undefined \
             ? __sb_str_to_base64(String(str)) \
             : __sb_str_to_base64(String(str), String(prefix));\n",
        );
    }
    if policy.allows_capability(HostCapability::CreateHmac) {
        src.push_str(
            "globalThis.createHmac = (algorithm, secret) => { \
             const r = JSON.parse(__sb_create_hmac(String(algorithm), String(secret))); \
             if (r.error) throw new Error(r.error); return r; };\n",
        );
    }

    src.push_str(
        "globalThis.__sb_context = Object.freeze({ \
         delay: globalThis.delay, countToken: globalThis.countToken, \
         strToBase64: globalThis.strToBase64, createHmac: globalThis.createHmac });\n",
    );
    src
}
