//! Phase 2: Extract relationship edges from chunks and insert them into the
//! graph.
//!
//! Extraction runs chunk-parallel on a bounded rayon pool; the only shared
//! state is the per-file context cache. Insertion is sequential.

use rayon::prelude::*;
use serde::Serialize;

use crate::config::{Chunk, RelationshipEdge};
use crate::graph::{EdgeData, GraphStore, SymbolIndex};
use crate::languages::Language;
use crate::resolve::cache::FileContextCache;

/// Counters reported by the relationships phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RelationshipStats {
    pub chunks: usize,
    pub edges: usize,
    /// Extracted targets that landed on a chunk node.
    pub resolved_targets: usize,
    pub failed_chunks: usize,
}

/// Extract the edges of one chunk. `None` means the chunk failed and has
/// been logged; a language without an extractor yields no edges.
pub fn extract_chunk(chunk: &Chunk, cache: &FileContextCache) -> Option<Vec<RelationshipEdge>> {
    let Some(language) = Language::from_name(&chunk.language) else {
        log::debug!("No extractor for language '{}' ({})", chunk.language, chunk.id);
        return Some(Vec::new());
    };
    match language.extractor().extract_relationships(chunk, cache) {
        Ok(edges) => Some(edges),
        Err(e) => {
            log::warn!("Skipping relationships of {}: {e}", chunk.id);
            None
        }
    }
}

/// Extract every chunk's edges in parallel. Output order follows `chunks`.
/// `threads == 0` uses the rayon default pool size.
pub fn extract_all(
    chunks: &[Chunk],
    threads: usize,
    cache: &FileContextCache,
) -> Vec<Option<Vec<RelationshipEdge>>> {
    let work = || -> Vec<Option<Vec<RelationshipEdge>>> {
        chunks
            .par_iter()
            .map(|chunk| extract_chunk(chunk, cache))
            .collect()
    };
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(work),
        Err(e) => {
            log::warn!("Falling back to the global rayon pool: {e}");
            work()
        }
    }
}

/// Run the relationships phase: register chunk nodes, extract edges in
/// parallel, then insert them one chunk at a time.
///
/// Each chunk's previous outgoing edges are dropped before its new ones go
/// in, so re-running over the same chunks leaves the graph unchanged.
pub fn run_relationships_phase(
    chunks: &[Chunk],
    store: &mut GraphStore,
    threads: usize,
) -> RelationshipStats {
    for chunk in chunks {
        store.add_chunk(chunk);
    }
    let index = SymbolIndex::from_chunks(chunks);
    log::debug!("Symbol index holds {} qualified names", index.len());
    let cache = FileContextCache::new();
    let extracted = extract_all(chunks, threads, &cache);

    let mut stats = RelationshipStats {
        chunks: chunks.len(),
        ..RelationshipStats::default()
    };
    for (chunk, edges) in chunks.iter().zip(extracted) {
        store.remove_edges_from(&chunk.id);
        let Some(edges) = edges else {
            stats.failed_chunks += 1;
            continue;
        };
        for edge in &edges {
            // A method call with an untyped receiver is only a bare name; it
            // must not bind to an unrelated function of that name.
            let unqualified_method = edge.is_method_call && !edge.target.contains('.');
            let resolved = if unqualified_method {
                None
            } else {
                index.resolve(&edge.target, &chunk.file)
            };
            let target = match resolved {
                Some(id) => {
                    stats.resolved_targets += 1;
                    id
                }
                None => edge.target.as_str(),
            };
            store.add_edge(&edge.source_id, target, EdgeData::from_edge(edge));
            stats.edges += 1;
        }
    }
    log::debug!(
        "Inserted {} edges from {} chunks ({} failed)",
        stats.edges,
        stats.chunks,
        stats.failed_chunks
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelationshipType;
    use crate::languages::python::chunk_file;
    use std::path::Path;

    const SOURCE: &str = "class ErrorHandler:\n    def handle(self):\n        pass\n\n\ndef process():\n    h = ErrorHandler()\n    h.handle()\n    log(h)\n";

    fn chunks() -> Vec<Chunk> {
        chunk_file("svc.py", Path::new("/nonexistent/svc.py"), SOURCE).unwrap()
    }

    #[test]
    fn edges_land_on_chunks_or_phantoms() {
        let chunks = chunks();
        let mut store = GraphStore::new();
        let stats = run_relationships_phase(&chunks, &mut store, 2);
        assert_eq!(stats.failed_chunks, 0);

        let process = "svc.py:6-9:function:process";
        assert_eq!(
            store.get_callees(process),
            vec![
                "svc.py:1-3:class:ErrorHandler",
                "svc.py:2-3:method:ErrorHandler.handle",
                "log",
            ]
        );
        assert_eq!(store.phantom_ids(), vec!["log"]);
        assert_eq!(stats.resolved_targets, 2);
        assert!(store
            .edges_from(process)
            .iter()
            .all(|e| e.data.relationship_type == RelationshipType::Calls));
    }

    #[test]
    fn rerun_is_idempotent() {
        let chunks = chunks();
        let mut store = GraphStore::new();
        run_relationships_phase(&chunks, &mut store, 1);
        let (nodes, edges) = (store.node_count(), store.edge_count());
        let weights: Vec<u32> = store.edges().iter().map(|e| e.data.weight).collect();

        run_relationships_phase(&chunks, &mut store, 1);
        assert_eq!(store.node_count(), nodes);
        assert_eq!(store.edge_count(), edges);
        let again: Vec<u32> = store.edges().iter().map(|e| e.data.weight).collect();
        assert_eq!(weights, again);
    }

    #[test]
    fn untyped_method_call_stays_phantom() {
        let source = "def strip():\n    pass\n\n\ndef f(data):\n    data.strip()\n    strip()\n";
        let chunks = chunk_file("text.py", Path::new("/nonexistent/text.py"), source).unwrap();
        let mut store = GraphStore::new();
        let stats = run_relationships_phase(&chunks, &mut store, 1);

        assert_eq!(
            store.get_callees("text.py:5-7:function:f"),
            vec!["strip", "text.py:1-2:function:strip"]
        );
        assert_eq!(store.phantom_ids(), vec!["strip"]);
        assert_eq!(stats.resolved_targets, 1);
    }

    #[test]
    fn unparsable_language_is_skipped() {
        let mut chunk = chunks().remove(0);
        chunk.language = "cobol".to_string();
        let cache = FileContextCache::new();
        assert_eq!(extract_chunk(&chunk, &cache), Some(Vec::new()));
    }
}
