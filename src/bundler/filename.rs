//! Output filename templates
//!
//! Supported tokens: `[name]`, `[id]`, `[hash]`, `[chunkhash]`. Hash tokens
//! take an optional length, e.g. `[chunkhash:8]`.

use anyhow::Result;

use crate::error::BundleError;

/// Hash length used when a token does not give one
pub const DEFAULT_HASH_LENGTH: usize = 20;

const MAX_HASH_LENGTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Name,
    Id,
    Hash(usize),
    ChunkHash(usize),
}

/// Values substituted into a template for one chunk
#[derive(Debug, Clone, Copy)]
pub struct FilenameContext<'a> {
    pub name: &'a str,
    pub id: usize,
    pub chunk_hash: &'a str,
    pub build_hash: &'a str,
}

/// A parsed filename template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameTemplate {
    raw: String,
    parts: Vec<Part>,
}

impl FilenameTemplate {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |message: String| BundleError::InvalidFilenameTemplate {
            template: raw.to_string(),
            message,
        };

        if raw.trim().is_empty() {
            return Err(invalid("template is empty".to_string()).into());
        }

        let mut parts = Vec::new();
        let mut rest = raw;

        while let Some(open) = rest.find('[') {
            if open > 0 {
                parts.push(Part::Literal(rest[..open].to_string()));
            }

            let close = rest[open..]
                .find(']')
                .map(|offset| open + offset)
                .ok_or_else(|| invalid("unclosed '['".to_string()))?;

            let token = &rest[open + 1..close];
            let (kind, length) = match token.split_once(':') {
                Some((kind, length)) => {
                    let length: usize = length
                        .parse()
                        .ok()
                        .filter(|n| (1..=MAX_HASH_LENGTH).contains(n))
                        .ok_or_else(|| invalid(format!("bad hash length in [{token}]")))?;
                    (kind, Some(length))
                }
                None => (token, None),
            };

            let part = match (kind, length) {
                ("name", None) => Part::Name,
                ("id", None) => Part::Id,
                ("hash", length) => Part::Hash(length.unwrap_or(DEFAULT_HASH_LENGTH)),
                ("chunkhash", length) => Part::ChunkHash(length.unwrap_or(DEFAULT_HASH_LENGTH)),
                _ => return Err(invalid(format!("unknown token [{token}]")).into()),
            };
            parts.push(part);

            rest = &rest[close + 1..];
        }

        if !rest.is_empty() {
            parts.push(Part::Literal(rest.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the template depends on the chunk content
    pub fn uses_chunk_hash(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::ChunkHash(_)))
    }

    /// Substitute the chunk's values into the template
    pub fn render(&self, ctx: &FilenameContext<'_>) -> String {
        let mut filename = String::new();

        for part in &self.parts {
            match part {
                Part::Literal(text) => filename.push_str(text),
                Part::Name => filename.push_str(ctx.name),
                Part::Id => filename.push_str(&ctx.id.to_string()),
                Part::Hash(len) => filename.push_str(truncate(ctx.build_hash, *len)),
                Part::ChunkHash(len) => filename.push_str(truncate(ctx.chunk_hash, *len)),
            }
        }

        filename
    }
}

fn truncate(hash: &str, len: usize) -> &str {
    &hash[..len.min(hash.len())]
}
