use std::path::{Path, PathBuf};

/// Resolves a requested media name to a file on disk.
pub trait FileLocator {
    fn locate(&self, name: &str) -> Option<PathBuf>;
}

/// Tries the name as given, then under each search root in order.
#[derive(Debug, Clone, Default)]
pub struct SearchPathLocator {
    roots: Vec<PathBuf>,
}

impl SearchPathLocator {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }
}

impl FileLocator for SearchPathLocator {
    fn locate(&self, name: &str) -> Option<PathBuf> {
        let direct = Path::new(name);
        if direct.is_file() {
            return Some(direct.to_path_buf());
        }
        if direct.is_absolute() {
            return None;
        }
        self.roots
            .iter()
            .map(|root| root.join(name))
            .find(|candidate| candidate.is_file())
    }
}
