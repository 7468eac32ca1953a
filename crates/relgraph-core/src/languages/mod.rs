//! Supported languages and their relationship extractors.

use serde::{Deserialize, Serialize};

use crate::config::{Chunk, RelationshipEdge};
use crate::error::Result;
use crate::resolve::cache::FileContextCache;

pub mod python;

/// Capability every supported language provides.
pub trait RelationshipExtractor: Send + Sync {
    /// Extract the ordered relationship edges of one chunk.
    ///
    /// An `Err` means this chunk could not be parsed; callers treat it as an
    /// empty edge list and carry on with the batch.
    fn extract_relationships(
        &self,
        chunk: &Chunk,
        cache: &FileContextCache,
    ) -> Result<Vec<RelationshipEdge>>;
}

/// Closed set of languages the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
}

impl Language {
    pub const ALL: [Language; 1] = [Language::Python];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
        }
    }

    /// Look a language up by its name as stored on chunks (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "python" | "py" => Some(Self::Python),
            _ => None,
        }
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Python => &["py", "pyi"],
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|lang| lang.extensions().contains(&ext))
    }

    pub fn extractor(&self) -> &'static dyn RelationshipExtractor {
        match self {
            Self::Python => &python::PythonExtractor,
        }
    }

    /// Split a source file into chunks.
    pub fn chunk_file(
        &self,
        rel_path: &str,
        abs_path: &std::path::Path,
        source: &str,
    ) -> Result<Vec<Chunk>> {
        match self {
            Self::Python => python::chunk_file(rel_path, abs_path, source),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name_and_extension() {
        assert_eq!(Language::from_name("Python"), Some(Language::Python));
        assert_eq!(Language::from_name("py"), Some(Language::Python));
        assert_eq!(Language::from_name("cobol"), None);
        assert_eq!(Language::from_extension("py"), Some(Language::Python));
        assert_eq!(Language::from_extension("rs"), None);
    }
}
