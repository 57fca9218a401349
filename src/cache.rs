// ==============================================================================
// cache.rs - Persistent Gene Annotation Cache
// ==============================================================================
// Description: Read-through cache in front of the annotation service
// Author: Matt Barham
// Created: 2025-11-21
// Modified: 2025-12-04
// Version: 1.1.0
// ==============================================================================
// File format: JSON object, canonical locus key -> gene name
//   {"{\"chr\": \"chr1\", \"pos\": 100, ...}": "BRCA2", ...}
// A null gene name (written by older tools) reads as an empty name.
// ==============================================================================

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::annotation::GeneAnnotator;
use crate::models::VariantLocus;
use crate::persist::{self, PersistError};

/// Lookup counters for the run summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub annotation_calls: u64,
    pub annotation_failures: u64,
}

/// Locus -> gene mapping backed by a JSON file
///
/// Entries are never evicted or overwritten. Every new entry rewrites the
/// whole file before it is used, so the file stays consistent if the process
/// dies right after an annotation call.
pub struct AnnotationCache {
    path: PathBuf,
    entries: BTreeMap<String, String>,
    /// Loci whose annotation failed during this run (never persisted)
    unresolved: HashSet<String>,
    stats: CacheStats,
}

impl AnnotationCache {
    /// Load the cache file; a missing or unreadable file gives an empty cache
    ///
    /// A file that exists but cannot be parsed is moved aside first, so the
    /// next save does not overwrite its entries.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let existed = path.is_file();

        let entries: BTreeMap<String, String> =
            match persist::load_json::<BTreeMap<String, Option<String>>>(&path, "annotation cache") {
                Some(raw) => raw
                    .into_iter()
                    .map(|(key, gene)| (key, gene.unwrap_or_default()))
                    .collect(),
                None => {
                    if existed {
                        persist::set_aside(&path, "annotation cache");
                    }
                    BTreeMap::new()
                }
            };

        info!("Loaded {} cached annotations from {:?}", entries.len(), path);

        Self {
            path,
            entries,
            unresolved: HashSet::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn lookup(&self, locus: &VariantLocus) -> Option<&str> {
        self.entries.get(&locus.cache_key()).map(String::as_str)
    }

    /// Add an entry and persist the whole mapping
    ///
    /// An existing entry is kept as is.
    pub fn store(&mut self, locus: &VariantLocus, gene: &str) -> Result<(), PersistError> {
        let key = locus.cache_key();
        if self.entries.contains_key(&key) {
            return Ok(());
        }

        self.entries.insert(key.clone(), gene.to_string());
        if let Err(e) = persist::save_json(&self.path, &self.entries, "annotation cache") {
            self.entries.remove(&key);
            return Err(e);
        }

        Ok(())
    }

    /// Gene name for `locus`, asking `annotator` on a cache miss
    ///
    /// Each locus reaches the annotator at most once per run. A failed
    /// annotation is logged and yields an empty name; it is remembered only
    /// for this run so a later run retries it. Only a failure to persist a
    /// new entry is returned as an error.
    pub async fn resolve<A>(
        &mut self,
        locus: &VariantLocus,
        annotator: &A,
    ) -> Result<String, PersistError>
    where
        A: GeneAnnotator + ?Sized,
    {
        if let Some(gene) = self.lookup(locus).map(str::to_string) {
            debug!("Annotation cache hit for {}:{}", locus.chromosome, locus.position);
            self.stats.hits += 1;
            return Ok(gene);
        }

        let key = locus.cache_key();
        if self.unresolved.contains(&key) {
            return Ok(String::new());
        }

        self.stats.annotation_calls += 1;
        match annotator.resolve(locus).await {
            Ok(gene) => {
                self.store(locus, &gene)?;
                Ok(gene)
            }
            Err(e) => {
                warn!(
                    "Annotation failed for {}:{} {}>{}: {}",
                    locus.chromosome, locus.position, locus.reference, locus.alternate, e
                );
                self.stats.annotation_failures += 1;
                self.unresolved.insert(key);
                Ok(String::new())
            }
        }
    }
}
