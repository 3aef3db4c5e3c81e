// Pattern store - immutable catalog plus a cache of parsed pattern bodies
// Bodies are parsed off the audio path and shared as Arc snapshots

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::catalog::{Catalog, PatternId, PatternInfo};
use super::parse::{load_pattern_file, LibraryError};
use super::pattern::Pattern;

/// Lazily-loading pattern library
///
/// The catalog never changes after construction, so lookups are lock-free. Parsed bodies
/// live behind a read-write lock that is never held across file I/O.
#[derive(Debug, Default)]
pub struct PatternStore {
    catalog: Catalog,
    bodies: RwLock<HashMap<PatternId, Arc<Pattern>>>,
}

impl PatternStore {
    pub fn new(catalog: Catalog) -> Self {
        PatternStore {
            catalog,
            bodies: RwLock::new(HashMap::new()),
        }
    }

    /// Scan a library root and build a store with nothing loaded
    pub fn scan(root: &Path) -> Result<Self, LibraryError> {
        Ok(PatternStore::new(Catalog::scan(root)?))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn info(&self, id: PatternId) -> Result<&PatternInfo, LibraryError> {
        self.catalog.info(id).ok_or(LibraryError::OutOfRange {
            category: id.category,
            pattern: id.pattern,
        })
    }

    /// Load a pattern body, parsing its file on first use
    ///
    /// Repeated calls return the same cached body. On failure nothing is cached and the
    /// catalog entry stays in place.
    pub fn load(&self, id: PatternId) -> Result<Arc<Pattern>, LibraryError> {
        if let Some(pattern) = self.get(id) {
            return Ok(pattern);
        }

        let info = self.info(id)?;
        let pattern = match load_pattern_file(&info.path) {
            Ok(pattern) => Arc::new(pattern),
            Err(e) => {
                log::warn!("Failed to load pattern '{}/{}': {}", info.category, info.name, e);
                return Err(e);
            }
        };

        log::debug!(
            "Loaded pattern '{}/{}': {} events, {} beats",
            info.category,
            info.name,
            pattern.events.len(),
            pattern.length_beats
        );

        // Another loader may have won the race; keep whichever body landed first
        let mut bodies = self.bodies.write();
        Ok(bodies.entry(id).or_insert(pattern).clone())
    }

    /// Re-parse a pattern from disk, replacing any cached body
    pub fn reload(&self, id: PatternId) -> Result<Arc<Pattern>, LibraryError> {
        let info = self.info(id)?;
        let pattern = Arc::new(load_pattern_file(&info.path)?);
        self.bodies.write().insert(id, pattern.clone());
        log::info!("Reloaded pattern '{}/{}'", info.category, info.name);
        Ok(pattern)
    }

    /// Cached body only, never touches the disk
    pub fn get(&self, id: PatternId) -> Option<Arc<Pattern>> {
        self.bodies.read().get(&id).cloned()
    }

    pub fn is_loaded(&self, id: PatternId) -> bool {
        self.bodies.read().contains_key(&id)
    }

    /// Load every catalog entry, returning how many loaded successfully
    pub fn preload_all(&self) -> usize {
        let loaded = self
            .catalog
            .ids()
            .filter(|&id| self.load(id).is_ok())
            .count();
        log::info!(
            "Preloaded {} of {} patterns",
            loaded,
            self.catalog.pattern_count()
        );
        loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::test_support::{note, write_groove, GrooveFixture};
    use tempfile::TempDir;

    fn library() -> (TempDir, PatternStore) {
        let root = TempDir::new().unwrap();
        write_groove(
            &root.path().join("Rock"),
            "basic.mid",
            &GrooveFixture {
                notes: vec![note(0.0, 0.5, 36), note(1.0, 1.5, 38), note(5.0, 5.5, 42)],
                ..Default::default()
            },
        );
        write_groove(
            &root.path().join("Rock"),
            "fill.mid",
            &GrooveFixture {
                notes: vec![note(0.0, 0.25, 45)],
                ..Default::default()
            },
        );
        let store = PatternStore::scan(root.path()).unwrap();
        (root, store)
    }

    #[test]
    fn test_load_is_idempotent() {
        let (_root, store) = library();
        let id = PatternId::new(0, 0);

        assert!(!store.is_loaded(id));
        let first = store.load(id).unwrap();
        let second = store.load(id).unwrap();

        assert!(store.is_loaded(id));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.events, second.events);
        assert_eq!(first.length_beats, 8.0);
    }

    #[test]
    fn test_load_out_of_range() {
        let (_root, store) = library();
        let result = store.load(PatternId::new(0, 9));
        assert!(matches!(
            result,
            Err(LibraryError::OutOfRange { category: 0, pattern: 9 })
        ));
    }

    #[test]
    fn test_failed_load_keeps_entry() {
        let (root, store) = library();
        std::fs::write(root.path().join("Rock").join("fill.mid"), b"MThd broken").unwrap();

        let id = PatternId::new(0, 1);
        assert!(store.load(id).is_err());
        assert!(!store.is_loaded(id));
        assert_eq!(store.info(id).unwrap().name, "fill");
    }

    #[test]
    fn test_reload_replaces_body() {
        let (root, store) = library();
        let id = PatternId::new(0, 1);
        let before = store.load(id).unwrap();

        write_groove(
            &root.path().join("Rock"),
            "fill.mid",
            &GrooveFixture {
                notes: vec![note(0.0, 0.25, 45), note(6.0, 6.25, 45)],
                ..Default::default()
            },
        );

        // Cached body is returned until an explicit reload
        assert!(Arc::ptr_eq(&before, &store.load(id).unwrap()));

        let after = store.reload(id).unwrap();
        assert_eq!(after.note_on_count(), 2);
        assert_eq!(store.get(id).unwrap().length_beats, 8.0);
    }

    #[test]
    fn test_preload_all() {
        let (_root, store) = library();
        assert_eq!(store.preload_all(), 2);
        assert!(store.get(PatternId::new(0, 1)).is_some());
    }
}
