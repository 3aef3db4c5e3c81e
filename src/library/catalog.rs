// Groove catalog - pre-scanned, immutable index of the pattern library
// One sub-directory per category, one MIDI file per pattern

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::parse::LibraryError;

/// Identity of a pattern inside the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatternId {
    pub category: usize,
    pub pattern: usize,
}

impl PatternId {
    pub fn new(category: usize, pattern: usize) -> Self {
        PatternId { category, pattern }
    }
}

/// Catalog entry for one groove file (metadata only, no parsed body)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternInfo {
    /// Display name (file name without extension)
    pub name: String,

    /// Owning category name
    pub category: String,

    /// Source file location
    pub path: PathBuf,
}

/// A named group of patterns (one library sub-directory)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub patterns: Vec<PatternInfo>,
}

/// The scanned library index
///
/// Built once and never mutated, so readers need no lock.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    root: Option<PathBuf>,
    categories: Vec<Category>,
}

impl Catalog {
    /// Empty catalog (no library found)
    pub fn empty() -> Self {
        Catalog::default()
    }

    /// Build a catalog from already-known categories
    pub fn from_categories(categories: Vec<Category>) -> Self {
        Catalog {
            root: None,
            categories: categories
                .into_iter()
                .filter(|c| !c.patterns.is_empty())
                .collect(),
        }
    }

    /// Scan a library root
    ///
    /// Sub-directories become categories in alphabetical order. Unreadable entries and
    /// files without a MIDI header are skipped; categories left empty are omitted.
    pub fn scan(root: &Path) -> Result<Self, LibraryError> {
        if !root.is_dir() {
            return Err(LibraryError::MissingRoot(root.to_path_buf()));
        }

        log::info!("Scanning grooves in {}", root.display());

        let mut dirs: Vec<PathBuf> = fs::read_dir(root)?
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    log::warn!("Skipping unreadable library entry: {}", e);
                    None
                }
            })
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();

        let mut categories = Vec::new();

        for dir in dirs {
            let name = file_name_string(&dir);
            let patterns = match scan_category(&dir, &name) {
                Ok(patterns) => patterns,
                Err(e) => {
                    log::warn!("Skipping category '{}': {}", name, e);
                    continue;
                }
            };

            if patterns.is_empty() {
                log::debug!("Category '{}' has no grooves, omitted", name);
                continue;
            }

            log::info!("Found category '{}' with {} grooves", name, patterns.len());
            categories.push(Category { name, patterns });
        }

        log::info!("Scan complete. Found {} categories", categories.len());

        Ok(Catalog {
            root: Some(root.to_path_buf()),
            categories,
        })
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, index: usize) -> Option<&Category> {
        self.categories.get(index)
    }

    pub fn info(&self, id: PatternId) -> Option<&PatternInfo> {
        self.categories.get(id.category)?.patterns.get(id.pattern)
    }

    /// Every pattern id in catalog order
    pub fn ids(&self) -> impl Iterator<Item = PatternId> + '_ {
        self.categories
            .iter()
            .enumerate()
            .flat_map(|(c, category)| (0..category.patterns.len()).map(move |p| PatternId::new(c, p)))
    }

    pub fn pattern_count(&self) -> usize {
        self.categories.iter().map(|c| c.patterns.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Look up a pattern by category and display name
    pub fn find(&self, category: &str, name: &str) -> Option<PatternId> {
        let c = self.categories.iter().position(|c| c.name == category)?;
        let p = self.categories[c].patterns.iter().position(|p| p.name == name)?;
        Some(PatternId::new(c, p))
    }
}

fn scan_category(dir: &Path, category: &str) -> Result<Vec<PatternInfo>, LibraryError> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && has_midi_extension(path))
        .collect();
    files.sort();

    let mut patterns = Vec::with_capacity(files.len());

    for path in files {
        match has_midi_header(&path) {
            Ok(true) => {}
            Ok(false) => {
                log::warn!("Skipping {}: not a MIDI file", path.display());
                continue;
            }
            Err(e) => {
                log::warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        }

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        patterns.push(PatternInfo {
            name,
            category: category.to_string(),
            path,
        });
    }

    Ok(patterns)
}

fn has_midi_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("mid") || ext.eq_ignore_ascii_case("midi"))
        .unwrap_or(false)
}

fn has_midi_header(path: &Path) -> std::io::Result<bool> {
    let mut magic = [0u8; 4];
    let mut file = fs::File::open(path)?;
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == b"MThd"),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn file_name_string(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::test_support::{note, write_groove, GrooveFixture};
    use tempfile::TempDir;

    fn fixture() -> GrooveFixture {
        GrooveFixture {
            notes: vec![note(0.0, 0.5, 36)],
            ..Default::default()
        }
    }

    #[test]
    fn test_scan_orders_categories_and_patterns() {
        let root = TempDir::new().unwrap();
        write_groove(&root.path().join("Rock"), "b_groove.mid", &fixture());
        write_groove(&root.path().join("Rock"), "a_groove.mid", &fixture());
        write_groove(&root.path().join("Funk"), "slap.MID", &fixture());

        let catalog = Catalog::scan(root.path()).unwrap();

        let names: Vec<&str> = catalog.categories().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Funk", "Rock"]);

        let rock = catalog.category(1).unwrap();
        assert_eq!(rock.patterns[0].name, "a_groove");
        assert_eq!(rock.patterns[1].name, "b_groove");
        assert_eq!(rock.patterns[0].category, "Rock");
        assert_eq!(catalog.pattern_count(), 3);
    }

    #[test]
    fn test_scan_omits_empty_categories_and_invalid_files() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("Empty")).unwrap();
        fs::create_dir_all(root.path().join("Broken")).unwrap();
        fs::write(root.path().join("Broken").join("bad.mid"), b"nope").unwrap();
        fs::write(root.path().join("Broken").join("notes.txt"), b"MThd").unwrap();
        write_groove(&root.path().join("Pop"), "basic.mid", &fixture());
        fs::write(root.path().join("stray.mid"), b"MThd").unwrap();

        let catalog = Catalog::scan(root.path()).unwrap();

        assert_eq!(catalog.categories().len(), 1);
        assert_eq!(catalog.categories()[0].name, "Pop");
    }

    #[test]
    fn test_scan_missing_root() {
        let result = Catalog::scan(Path::new("/nonexistent/grooves"));
        assert!(matches!(result, Err(LibraryError::MissingRoot(_))));
    }

    #[test]
    fn test_ids_and_lookup() {
        let root = TempDir::new().unwrap();
        write_groove(&root.path().join("A"), "one.mid", &fixture());
        write_groove(&root.path().join("B"), "two.mid", &fixture());
        write_groove(&root.path().join("B"), "three.mid", &fixture());

        let catalog = Catalog::scan(root.path()).unwrap();
        let ids: Vec<PatternId> = catalog.ids().collect();

        assert_eq!(
            ids,
            vec![PatternId::new(0, 0), PatternId::new(1, 0), PatternId::new(1, 1)]
        );
        assert_eq!(catalog.find("B", "two"), Some(PatternId::new(1, 1)));
        assert!(catalog.info(PatternId::new(5, 0)).is_none());
        assert!(catalog.info(PatternId::new(0, 3)).is_none());
    }
}
