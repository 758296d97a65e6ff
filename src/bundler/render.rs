//! Chunk rendering
//!
//! Every chunk is an IIFE pushing `[modules, entries]` onto
//! `packwrightChunks`. The runtime-carrying chunk replaces that array with an
//! installer, installs its own modules and then drains whatever chunks were
//! queued before it loaded.

use super::{Chunk, ModuleGraph, ModuleKind};

const GLOBAL_ROOT: &str = r#"typeof globalThis !== "undefined" ? globalThis : this"#;

const RUNTIME: &str = r#"  var queue = root.packwrightChunks;
  if (queue && queue.runtime) {
    queue.push(chunk);
    return;
  }

  var modules = {};
  var cache = {};

  function load(id) {
    var cached = cache[id];
    if (cached) {
      return cached.exports;
    }

    var definition = modules[id];
    if (!definition) {
      throw new Error("Cannot find module '" + id + "'");
    }

    var module = (cache[id] = { id: id, exports: {} });
    var requests = definition[1];
    definition[0].call(module.exports, module, module.exports, function (request) {
      return load(Object.prototype.hasOwnProperty.call(requests, request) ? requests[request] : request);
    });

    return module.exports;
  }

  function install(installed) {
    var table = installed[0];
    for (var id in table) {
      if (Object.prototype.hasOwnProperty.call(table, id)) {
        modules[id] = table[id];
      }
    }
    for (var i = 0; i < installed[1].length; i++) {
      load(installed[1][i]);
    }
  }

  root.packwrightChunks = { runtime: true, push: install, require: load };
  install(chunk);
  if (queue) {
    for (var j = 0; j < queue.length; j++) {
      install(queue[j]);
    }
  }
"#;

/// Render a chunk to JavaScript
///
/// The output only depends on module names and transformed code, so equal
/// inputs always produce byte-identical chunks.
pub fn render_chunk(chunk: &Chunk, graph: &ModuleGraph) -> String {
    let mut code = String::new();

    code.push_str("(function (root) {\n");
    code.push_str("  var chunk = [{\n");

    let mut first = true;
    for module in chunk.module_ids.iter().filter_map(|&id| graph.get_module(id)) {
        if !first {
            code.push_str(",\n");
        }
        first = false;

        let body = match &module.kind {
            ModuleKind::Source => module.code.clone(),
            ModuleKind::External { global } => {
                format!("module.exports = root[{}];", js_string(global))
            }
        };

        let requests = module
            .dependencies
            .iter()
            .filter_map(|(specifier, dep)| {
                graph
                    .get_module(*dep)
                    .map(|target| format!("{}: {}", js_string(specifier), js_string(&target.name)))
            })
            .collect::<Vec<_>>()
            .join(", ");

        code.push_str(&format!(
            "  {}: [function (module, exports, require) {{\n{}\n  }}, {{{}}}]",
            js_string(&module.name),
            body.trim_end(),
            requests
        ));
    }

    let entries = chunk
        .entry_modules
        .iter()
        .filter_map(|&id| graph.get_module(id))
        .map(|m| js_string(&m.name))
        .collect::<Vec<_>>()
        .join(", ");

    code.push_str(&format!("\n  }}, [{entries}]];\n"));

    if chunk.has_runtime {
        code.push('\n');
        code.push_str(RUNTIME);
    } else {
        code.push_str("  (root.packwrightChunks = root.packwrightChunks || []).push(chunk);\n");
    }

    code.push_str(&format!("}})({GLOBAL_ROOT});\n"));

    code
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value.escape_default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{Module, ModuleType};
    use std::path::PathBuf;

    fn source(graph: &mut ModuleGraph, name: &str, code: &str) -> usize {
        graph.add_module(Module {
            path: PathBuf::from(name),
            name: name.to_string(),
            kind: ModuleKind::Source,
            module_type: ModuleType::JavaScript,
            rule: None,
            code: code.to_string(),
            dependencies: Vec::new(),
        })
    }

    #[test]
    fn test_runtime_chunk_layout() {
        let mut graph = ModuleGraph::new();
        let index = source(&mut graph, "./src/index.js", "var util = require('./util');");
        let util = source(&mut graph, "./src/util.js", "module.exports = 1;");
        graph.add_dependency(index, "./util", util);

        let chunk = Chunk::entry(0, "app".to_string(), vec![index], &graph);
        let code = render_chunk(&chunk, &graph);

        assert!(code.starts_with("(function (root) {\n"));
        assert!(code.contains("\"./src/index.js\": [function (module, exports, require) {\nvar util = require('./util');\n  }, {\"./util\": \"./src/util.js\"}]"));
        assert!(code.contains("}, [\"./src/index.js\"]];"));
        assert!(code.contains("root.packwrightChunks = { runtime: true"));
    }

    #[test]
    fn test_chunk_without_runtime_queues_itself() {
        let mut graph = ModuleGraph::new();
        let index = source(&mut graph, "./src/index.js", "");
        let mut chunk = Chunk::entry(1, "app".to_string(), vec![index], &graph);
        chunk.has_runtime = false;

        let code = render_chunk(&chunk, &graph);

        assert!(code.contains("(root.packwrightChunks = root.packwrightChunks || []).push(chunk);"));
        assert!(!code.contains("function install"));
    }

    #[test]
    fn test_external_reads_global() {
        let mut graph = ModuleGraph::new();
        let react = graph.add_module(Module::external("react", "React"));
        let chunk = Chunk::shared(0, "vendor".to_string());
        let chunk = Chunk {
            module_ids: vec![react],
            ..chunk
        };

        let code = render_chunk(&chunk, &graph);
        assert!(code.contains("\"external:react\": [function (module, exports, require) {\nmodule.exports = root[\"React\"];"));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let mut graph = ModuleGraph::new();
        let index = source(&mut graph, "./src/index.js", "console.log(1);");
        let chunk = Chunk::entry(0, "app".to_string(), vec![index], &graph);

        assert_eq!(render_chunk(&chunk, &graph), render_chunk(&chunk, &graph));
    }
}
