use boa_engine::{Context, JsError, JsNativeErrorKind, Source};
use log::trace;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;

use super::{LeakedSymbol, SandboxVerdict, ScriptSandbox, SymbolKind};
use crate::config::SandboxConfig;

static UNDEFINED_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([\w$]+) is not defined").expect("valid regex"));

/// Installs the inert module API and a hidden global inspector. The inspector
/// captures `Object`/`JSON` up front so user code cannot break it.
const PRELUDE: &str = r"
(function (global, namespaceName, methodName, methods) {
  var api = {};
  methods.forEach(function (name) {
    api[name] = function () { return api; };
  });
  var namespace = global[namespaceName] || {};
  namespace[methodName] = function () { return api; };
  global[namespaceName] = namespace;

  var noop = function () {};
  global.console = { log: noop, info: noop, warn: noop, error: noop, debug: noop, trace: noop };

  var names = Object.getOwnPropertyNames;
  var describe = Object.getOwnPropertyDescriptor;
  var stringify = JSON.stringify;
  Object.defineProperty(global, '__stitch_globals__', {
    value: function () {
      return stringify(names(global).map(function (name) {
        var descriptor = describe(global, name);
        return [name, descriptor && 'value' in descriptor ? typeof descriptor.value : 'accessor'];
      }));
    }
  });
})";

/// [`ScriptSandbox`] backed by the boa JavaScript engine
#[derive(Debug)]
pub struct BoaSandbox {
    prelude: String,
    loop_iteration_limit: u64,
    recursion_limit: usize,
}

impl BoaSandbox {
    pub fn new(namespace: &str, method: &str, config: &SandboxConfig) -> Self {
        let prelude = format!(
            "{PRELUDE}(globalThis, {}, {}, {});",
            js_string(namespace),
            js_string(method),
            serde_json::to_string(&config.api_methods).unwrap_or_else(|_| "[]".to_owned())
        );
        Self {
            prelude,
            loop_iteration_limit: config.loop_iteration_limit,
            recursion_limit: config.recursion_limit,
        }
    }

    fn context(&self) -> Result<Context, String> {
        let mut context = Context::default();
        let limits = context.runtime_limits_mut();
        limits.set_loop_iteration_limit(self.loop_iteration_limit);
        limits.set_recursion_limit(self.recursion_limit);
        context
            .eval(Source::from_bytes(&self.prelude))
            .map_err(|err| format!("sandbox prelude failed: {err}"))?;
        Ok(context)
    }
}

impl ScriptSandbox for BoaSandbox {
    fn run(&mut self, source: &str) -> SandboxVerdict {
        let mut context = match self.context() {
            Ok(context) => context,
            Err(message) => return SandboxVerdict::Failed(message),
        };
        let before = match global_names(&mut context) {
            Ok(globals) => globals,
            Err(message) => return SandboxVerdict::Failed(message),
        };
        let before: FxHashSet<String> = before.into_iter().map(|(name, _)| name).collect();

        let mut unresolved = None;
        if let Err(err) = context.eval(Source::from_bytes(source)) {
            match classify_error(&err, &mut context) {
                Ok(symbol) => unresolved = Some(symbol),
                Err(verdict) => return verdict,
            }
        }

        let after = match global_names(&mut context) {
            Ok(globals) => globals,
            Err(message) => return SandboxVerdict::Failed(message),
        };
        let mut leaked = Vec::new();
        for (name, kind) in after {
            if before.contains(&name) {
                continue;
            }
            trace!("sandbox: new global '{name}' ({kind})");
            let kind = if kind == "function" {
                SymbolKind::Function
            } else {
                SymbolKind::Value
            };
            leaked.push(LeakedSymbol { name, kind });
        }
        leaked.extend(unresolved);

        if leaked.is_empty() {
            SandboxVerdict::Clean
        } else {
            SandboxVerdict::Leaked(leaked)
        }
    }
}

/// An undefined-reference error becomes a leaked symbol; anything else ends validation
fn classify_error(err: &JsError, context: &mut Context) -> Result<LeakedSymbol, SandboxVerdict> {
    let Ok(native) = err.try_native(context) else {
        return Err(SandboxVerdict::Failed(err.to_string()));
    };
    match &native.kind {
        JsNativeErrorKind::RuntimeLimit => Err(SandboxVerdict::TimedOut),
        JsNativeErrorKind::Reference => UNDEFINED_REFERENCE
            .captures(native.message())
            .map(|captures| LeakedSymbol {
                name: captures[1].to_owned(),
                kind: SymbolKind::Unresolved,
            })
            .ok_or_else(|| SandboxVerdict::Failed(native.to_string())),
        _ => Err(SandboxVerdict::Failed(native.to_string())),
    }
}

fn global_names(context: &mut Context) -> Result<Vec<(String, String)>, String> {
    let value = context
        .eval(Source::from_bytes("__stitch_globals__()"))
        .map_err(|err| format!("global inspection failed: {err}"))?;
    let json = value
        .as_string()
        .map(|s| s.to_std_string_escaped())
        .ok_or_else(|| "global inspection returned a non-string value".to_owned())?;
    serde_json::from_str(&json).map_err(|err| format!("global inspection returned bad data: {err}"))
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_owned())
}
