//! Module resolution
//!
//! Turns import specifiers into file paths by trying the configured
//! extensions in order, then directory `package.json`/`index` lookups, then
//! `node_modules` for bare specifiers.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::config::Config;
use crate::error::BundleError;
use crate::utils::normalize_path;

/// `require("x")` calls left in transformed code
static REQUIRE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\brequire\s*\(\s*["']([^"']+)["']\s*\)"#).unwrap()
});

/// ES module statements a loader did not lower
static IMPORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^\s*(?:import|export)\s+(?:[^;'"]*?\s+from\s+)?["']([^"']+)["']"#).unwrap()
});

/// Outcome of resolving a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// A file on disk
    File(PathBuf),
    /// A request served by a global at runtime
    External { request: String, global: String },
}

/// Module resolver
#[derive(Debug, Clone)]
pub struct Resolver {
    /// Suffixes tried in order; "" tries the request as written
    extensions: Vec<String>,

    /// Bare request -> global variable name
    externals: BTreeMap<String, String>,
}

impl Resolver {
    /// Create a new resolver
    pub fn new(extensions: Vec<String>, externals: BTreeMap<String, String>) -> Self {
        Self {
            extensions,
            externals,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.resolve.extensions.clone(), config.externals.clone())
    }

    /// Extract dependency specifiers from (transformed) module code
    ///
    /// Specifiers are returned in source order without duplicates.
    pub fn extract_dependencies(&self, code: &str) -> Vec<String> {
        let mut dependencies: Vec<String> = Vec::new();

        let found = REQUIRE_REGEX
            .captures_iter(code)
            .chain(IMPORT_REGEX.captures_iter(code))
            .filter_map(|cap| cap.get(1).map(|m| (m.start(), m.as_str())));

        let mut ordered: Vec<(usize, &str)> = found.collect();
        ordered.sort_by_key(|(offset, _)| *offset);

        for (_, spec) in ordered {
            if !dependencies.iter().any(|d| d == spec) {
                dependencies.push(spec.to_string());
            }
        }

        debug!("Found {} dependencies", dependencies.len());

        dependencies
    }

    /// Resolve a request made by the module at `importer`
    pub fn resolve(&self, request: &str, importer: &Path) -> Result<Resolved> {
        debug!("Resolving '{}' from '{}'", request, importer.display());

        let base_dir = importer.parent().unwrap_or(Path::new("."));

        self.resolve_from_dir(request, base_dir).ok_or_else(|| {
            BundleError::ModuleNotFound {
                request: request.to_string(),
                importer: importer.to_path_buf(),
            }
            .into()
        })
    }

    /// Resolve a request relative to a directory (used for entries)
    pub fn resolve_from_dir(&self, request: &str, base_dir: &Path) -> Option<Resolved> {
        if is_path_request(request) {
            return self
                .resolve_path(&base_dir.join(request))
                .map(Resolved::File);
        }

        if let Some(global) = self.externals.get(request) {
            debug!("'{}' is external ({})", request, global);
            return Some(Resolved::External {
                request: request.to_string(),
                global: global.clone(),
            });
        }

        self.resolve_bare(request, base_dir).map(Resolved::File)
    }

    /// Resolve a path as a file, then as a directory
    fn resolve_path(&self, target: &Path) -> Option<PathBuf> {
        let target = normalize_path(target);

        if let Some(file) = self.resolve_as_file(&target) {
            return Some(file);
        }

        if target.is_dir() {
            return self.resolve_as_directory(&target);
        }

        None
    }

    /// Try each extension in declared order; first existing file wins
    fn resolve_as_file(&self, target: &Path) -> Option<PathBuf> {
        for ext in &self.extensions {
            let mut candidate = target.as_os_str().to_os_string();
            candidate.push(ext);
            let candidate = PathBuf::from(candidate);

            if candidate.is_file() {
                return Some(candidate);
            }
        }

        None
    }

    fn resolve_as_directory(&self, dir: &Path) -> Option<PathBuf> {
        let package_json = dir.join("package.json");

        if package_json.is_file() {
            if let Some(main) = read_package_main(&package_json) {
                let main_path = normalize_path(&dir.join(main));
                if let Some(file) = self.resolve_as_file(&main_path) {
                    return Some(file);
                }
            }
        }

        self.resolve_as_file(&dir.join("index"))
    }

    /// Resolve a bare import (from node_modules)
    fn resolve_bare(&self, specifier: &str, from_dir: &Path) -> Option<PathBuf> {
        let mut current = from_dir.to_path_buf();

        // Walk up directory tree looking for node_modules
        loop {
            let node_modules = current.join("node_modules");

            if node_modules.is_dir() {
                if let Some(resolved) = self.resolve_path(&node_modules.join(specifier)) {
                    return Some(resolved);
                }
            }

            if !current.pop() {
                break;
            }
        }

        debug!("No node_modules match for '{}'", specifier);
        None
    }
}

fn is_path_request(request: &str) -> bool {
    request.starts_with("./")
        || request.starts_with("../")
        || request == "."
        || request == ".."
        || Path::new(request).is_absolute()
}

/// Prefer the ESM `module` field, then `main`
fn read_package_main(package_json: &Path) -> Option<String> {
    let content = fs::read_to_string(package_json).ok()?;
    let pkg: serde_json::Value = serde_json::from_str(&content).ok()?;

    ["module", "main"]
        .iter()
        .find_map(|field| pkg.get(field).and_then(|v| v.as_str()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, path: &str, content: &str) {
        let full = dir.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    fn resolver(extensions: &[&str]) -> Resolver {
        Resolver::new(
            extensions.iter().map(|e| e.to_string()).collect(),
            BTreeMap::new(),
        )
    }

    #[test]
    fn test_extract_requires_and_imports() {
        let source = r#"
            var foo = require('./foo');
            import { bar } from './bar.js';
            import * as baz from '../baz';
            export { qux } from "./qux";
            import './side-effect';
            const again = require("./foo");
        "#;

        let deps = resolver(&[""]).extract_dependencies(source);

        assert_eq!(
            deps,
            vec!["./foo", "./bar.js", "../baz", "./qux", "./side-effect"]
        );
    }

    #[test]
    fn test_extensions_tried_in_declared_order() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/widget.js", "");
        touch(dir.path(), "src/widget.jsx", "");
        let importer = dir.path().join("src/index.js");

        let js_first = resolver(&["", ".js", ".jsx"]);
        let jsx_first = resolver(&["", ".jsx", ".js"]);

        assert_eq!(
            js_first.resolve("./widget", &importer).unwrap(),
            Resolved::File(dir.path().join("src/widget.js"))
        );
        assert_eq!(
            jsx_first.resolve("./widget", &importer).unwrap(),
            Resolved::File(dir.path().join("src/widget.jsx"))
        );
    }

    #[test]
    fn test_exact_path_requires_empty_extension() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/data.json", "{}");
        let importer = dir.path().join("src/index.js");

        assert!(resolver(&[".js"]).resolve("./data.json", &importer).is_err());
        assert_eq!(
            resolver(&["", ".js"]).resolve("./data.json", &importer).unwrap(),
            Resolved::File(dir.path().join("src/data.json"))
        );
    }

    #[test]
    fn test_directory_index_and_package_main() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/lib/index.js", "");
        touch(dir.path(), "src/pkg/package.json", r#"{"main": "./dist/entry"}"#);
        touch(dir.path(), "src/pkg/dist/entry.js", "");
        let importer = dir.path().join("src/index.js");
        let r = resolver(&["", ".js"]);

        assert_eq!(
            r.resolve("./lib", &importer).unwrap(),
            Resolved::File(dir.path().join("src/lib/index.js"))
        );
        assert_eq!(
            r.resolve("./pkg", &importer).unwrap(),
            Resolved::File(dir.path().join("src/pkg/dist/entry.js"))
        );
    }

    #[test]
    fn test_parent_segments_normalized() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "shared/util.js", "");
        let importer = dir.path().join("src/index.js");

        assert_eq!(
            resolver(&["", ".js"]).resolve("../shared/util", &importer).unwrap(),
            Resolved::File(dir.path().join("shared/util.js"))
        );
    }

    #[test]
    fn test_bare_request_walks_node_modules() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "node_modules/left-pad/package.json", r#"{"main": "lib/pad.js"}"#);
        touch(dir.path(), "node_modules/left-pad/lib/pad.js", "");
        let importer = dir.path().join("src/deep/index.js");

        assert_eq!(
            resolver(&["", ".js"]).resolve("left-pad", &importer).unwrap(),
            Resolved::File(dir.path().join("node_modules/left-pad/lib/pad.js"))
        );
    }

    #[test]
    fn test_externals_short_circuit() {
        let mut externals = BTreeMap::new();
        externals.insert("react".to_string(), "React".to_string());
        let r = Resolver::new(vec![String::new()], externals);

        assert_eq!(
            r.resolve("react", Path::new("/app/src/index.js")).unwrap(),
            Resolved::External {
                request: "react".to_string(),
                global: "React".to_string()
            }
        );
    }

    #[test]
    fn test_missing_module_reports_importer() {
        let dir = TempDir::new().unwrap();
        let importer = dir.path().join("src/index.js");
        let err = resolver(&["", ".js"]).resolve("./missing", &importer).unwrap_err();

        match err.downcast_ref::<BundleError>() {
            Some(BundleError::ModuleNotFound { request, importer: from }) => {
                assert_eq!(request, "./missing");
                assert_eq!(from, &importer);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
