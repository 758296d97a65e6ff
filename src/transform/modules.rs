//! ES module syntax lowered to CommonJS
//!
//! Statement-level rewrite: top-level `import`/`export` statements (one per
//! line start) become `require` calls and `exports` assignments. Bindings are
//! copied eagerly, so cyclic imports observe values as of module evaluation.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static EXPORT_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)export\s*(\*(?:\s+as\s+[\w$]+)?|\{[^}]*\})\s*from\s*["']([^"']+)["'][ \t]*;?"#)
        .unwrap()
});

static IMPORT_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)import\s+([^'";]+?)\s+from\s*["']([^"']+)["'][ \t]*;?"#).unwrap()
});

static IMPORT_BARE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)import\s*["']([^"']+)["'][ \t]*;?"#).unwrap()
});

static EXPORT_LIST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*export\s*\{([^}]*)\}[ \t]*;?"#).unwrap()
});

static EXPORT_DEFAULT_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)export\s+default\s+((?:async\s+)?function\s*\*?\s*([\w$]+)|class\s+([\w$]+))"#)
        .unwrap()
});

static EXPORT_DEFAULT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)export\s+default\s+"#).unwrap()
});

static EXPORT_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?m)^([ \t]*)export\s+((?:async\s+)?function\s*\*?\s*([\w$]+)|class\s+([\w$]+)|(?:const|let|var)\s+([\w$]+))"#,
    )
    .unwrap()
});

const ES_MODULE_MARKER: &str = "Object.defineProperty(exports, \"__esModule\", { value: true });";

/// Tracks the `require` bindings introduced while rewriting one module
#[derive(Default)]
struct Lowering {
    bindings: HashMap<String, String>,
    used_names: Vec<String>,
    /// Export assignments for hoisted function declarations
    hoisted: Vec<String>,
    /// Export assignments appended after the module body
    trailing: Vec<String>,
}

impl Lowering {
    /// `var _name = require("request");` the first time a request is seen
    fn require_binding(&mut self, request: &str, indent: &str, out: &mut String) -> String {
        if let Some(binding) = self.bindings.get(request) {
            return binding.clone();
        }

        let base = binding_base(request);
        let mut binding = base.clone();
        let mut counter = 1;
        while self.used_names.contains(&binding) {
            counter += 1;
            binding = format!("{base}{counter}");
        }

        out.push_str(&format!("{indent}var {binding} = require({});", quoted(request)));
        self.used_names.push(binding.clone());
        self.bindings.insert(request.to_string(), binding.clone());
        binding
    }
}

/// Rewrite ES module statements into CommonJS
///
/// Returns the source unchanged when it has no module syntax.
pub fn lower_es_modules(source: &str) -> String {
    let mut state = Lowering::default();
    let mut is_es_module = false;

    let code = EXPORT_FROM.replace_all(source, |caps: &Captures| {
        is_es_module = true;
        let indent = &caps[1];
        let clause = caps[2].trim();
        let mut out = String::new();
        let binding = state.require_binding(&caps[3], indent, &mut out);

        if let Some(rest) = clause.strip_prefix('*') {
            let rest = rest.trim();
            if let Some(alias) = rest.strip_prefix("as") {
                out.push_str(&format!(" exports.{} = {binding};", alias.trim()));
            } else {
                out.push_str(&format!(
                    " Object.keys({binding}).forEach(function (key) {{ if (key !== \"default\" && !(key in exports)) exports[key] = {binding}[key]; }});"
                ));
            }
        } else {
            for (imported, local) in specifiers(clause) {
                out.push_str(&format!(" {} = {};", export_target(&local), member(&binding, &imported)));
            }
        }

        out
    });

    let code = IMPORT_FROM.replace_all(&code, |caps: &Captures| {
        is_es_module = true;
        let indent = &caps[1];
        let clause = caps[2].trim();
        let mut out = String::new();
        let binding = state.require_binding(&caps[3], indent, &mut out);

        for part in split_import_clause(clause) {
            if let Some(namespace) = part.strip_prefix('*') {
                let local = namespace.trim().trim_start_matches("as").trim();
                out.push_str(&format!(" var {local} = {binding};"));
            } else if part.starts_with('{') {
                for (imported, local) in specifiers(&part) {
                    out.push_str(&format!(" var {local} = {};", member(&binding, &imported)));
                }
            } else {
                out.push_str(&format!(
                    " var {part} = {binding} && {binding}.__esModule ? {binding}[\"default\"] : {binding};"
                ));
            }
        }

        out
    });

    let code = IMPORT_BARE.replace_all(&code, |caps: &Captures| {
        is_es_module = true;
        format!("{}require({});", &caps[1], quoted(&caps[2]))
    });

    let code = EXPORT_LIST.replace_all(&code, |caps: &Captures| {
        is_es_module = true;
        for (local, exported) in specifiers(&caps[1]) {
            state
                .trailing
                .push(format!("{} = {};", export_target(&exported), local));
        }
        String::new()
    });

    let code = EXPORT_DEFAULT_DECL.replace_all(&code, |caps: &Captures| {
        // `export default class extends Base {}` is an anonymous class
        if caps.get(4).is_some_and(|name| name.as_str() == "extends") {
            return caps[0].to_string();
        }

        is_es_module = true;
        let declaration = &caps[2];
        if let Some(name) = caps.get(3) {
            state.hoisted.push(format!("exports[\"default\"] = {};", name.as_str()));
        } else if let Some(name) = caps.get(4) {
            state.trailing.push(format!("exports[\"default\"] = {};", name.as_str()));
        }
        format!("{}{}", &caps[1], declaration)
    });

    let code = EXPORT_DEFAULT.replace_all(&code, |caps: &Captures| {
        is_es_module = true;
        format!("{}exports[\"default\"] = ", &caps[1])
    });

    let code = EXPORT_DECL.replace_all(&code, |caps: &Captures| {
        is_es_module = true;
        if let Some(name) = caps.get(3) {
            state.hoisted.push(format!("exports.{0} = {0};", name.as_str()));
        } else if let Some(name) = caps.get(4).or_else(|| caps.get(5)) {
            state.trailing.push(format!("exports.{0} = {0};", name.as_str()));
        }
        format!("{}{}", &caps[1], &caps[2])
    });

    if !is_es_module {
        return source.to_string();
    }

    let mut lowered = String::with_capacity(code.len() + 128);
    lowered.push_str(ES_MODULE_MARKER);
    lowered.push('\n');
    for line in &state.hoisted {
        lowered.push_str(line);
        lowered.push('\n');
    }
    lowered.push_str(&code);
    if !state.trailing.is_empty() {
        if !lowered.ends_with('\n') {
            lowered.push('\n');
        }
        lowered.push_str(&state.trailing.join("\n"));
        lowered.push('\n');
    }

    lowered
}

/// Split `Default, { a, b }` / `Default, * as ns` into its parts
fn split_import_clause(clause: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = clause.trim();

    if !rest.starts_with('{') && !rest.starts_with('*') {
        match rest.find(',') {
            Some(comma) => {
                parts.push(rest[..comma].trim().to_string());
                rest = rest[comma + 1..].trim();
            }
            None => {
                parts.push(rest.to_string());
                rest = "";
            }
        }
    }

    if !rest.is_empty() {
        parts.push(rest.to_string());
    }

    parts
}

/// `{ a, b as c }` -> [(a, a), (b, c)]
fn specifiers(list: &str) -> Vec<(String, String)> {
    list.trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|spec| match spec.split_once(" as ") {
            Some((from, to)) => (from.trim().to_string(), to.trim().to_string()),
            None => (spec.to_string(), spec.to_string()),
        })
        .collect()
}

fn member(binding: &str, name: &str) -> String {
    if name == "default" {
        format!("{binding}[\"default\"]")
    } else {
        format!("{binding}.{name}")
    }
}

fn export_target(name: &str) -> String {
    if name == "default" {
        "exports[\"default\"]".to_string()
    } else {
        format!("exports.{name}")
    }
}

/// `./utils/format-date.js` -> `_format_date`
fn binding_base(request: &str) -> String {
    let last = request
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(request);
    let stem = last.split('.').next().filter(|s| !s.is_empty()).unwrap_or("module");

    let sanitized: String = stem
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '$' { c } else { '_' })
        .collect();

    format!("_{sanitized}")
}

fn quoted(request: &str) -> String {
    serde_json::to_string(request).unwrap_or_else(|_| format!("\"{request}\""))
}
