//! Banner comment prepended to rendered chunks

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use super::{Plugin, PluginContext};
use crate::bundler::{Chunk, ChunkType};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BannerOptions {
    pub banner: String,

    /// Skip shared chunks
    #[serde(default)]
    pub entry_only: bool,
}

pub struct BannerPlugin {
    comment: String,
    entry_only: bool,
}

impl BannerPlugin {
    pub fn new(options: BannerOptions) -> Self {
        let lines: Vec<String> = options
            .banner
            .replace("*/", "* /")
            .lines()
            .map(|line| format!(" * {line}").trim_end().to_string())
            .collect();

        Self {
            comment: format!("/*!\n{}\n */\n", lines.join("\n")),
            entry_only: options.entry_only,
        }
    }
}

#[async_trait]
impl Plugin for BannerPlugin {
    fn name(&self) -> &str {
        "banner"
    }

    async fn render_chunk(&self, code: &str, chunk: &Chunk, _ctx: &PluginContext) -> Result<Option<String>> {
        if self.entry_only && chunk.chunk_type != ChunkType::Entry {
            return Ok(None);
        }

        Ok(Some(format!("{}{}", self.comment, code)))
    }
}
