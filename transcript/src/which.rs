use std::{
    collections::HashMap,
    env,
    path::{Path, PathBuf},
};

/// Per-run binary resolution cache. Constructed once at pipeline start and
/// passed explicitly to every stage that needs to know what a command's
/// first token actually points at.
#[derive(Debug)]
pub struct WhichCache {
    resolved: HashMap<String, Option<PathBuf>>,
    make: Option<PathBuf>,
    cmake: Option<PathBuf>,
}

impl WhichCache {
    pub fn new() -> WhichCache {
        let mut cache = WhichCache {
            resolved: HashMap::new(),
            make: None,
            cmake: None,
        };
        cache.make = cache.resolve("make");
        cache.cmake = cache.resolve("cmake");
        cache
    }

    /// Build a cache from fixed name -> path entries, bypassing PATH.
    /// Entries named `make` and `cmake` take on those special roles.
    #[cfg(any(test, feature = "testing"))]
    pub fn preloaded<I>(entries: I) -> WhichCache
    where
        I: IntoIterator<Item = (String, PathBuf)>,
    {
        let resolved: HashMap<String, Option<PathBuf>> = entries
            .into_iter()
            .map(|(name, path)| (name, Some(path)))
            .collect();
        let make = resolved.get("make").cloned().unwrap_or(None);
        let cmake = resolved.get("cmake").cloned().unwrap_or(None);
        WhichCache {
            resolved,
            make,
            cmake,
        }
    }

    /// Resolve a command name to an absolute executable path, caching the
    /// answer (including negative ones) by name.
    pub fn resolve(&mut self, name: &str) -> Option<PathBuf> {
        if let Some(hit) = self.resolved.get(name) {
            return hit.clone();
        }
        let found = search_path(name);
        self.resolved.insert(name.to_owned(), found.clone());
        found
    }

    pub fn is_make(&mut self, name: &str) -> bool {
        let resolved = self.resolve(name);
        resolved.is_some() && resolved == self.make
    }

    pub fn is_cmake(&mut self, name: &str) -> bool {
        let resolved = self.resolve(name);
        resolved.is_some() && resolved == self.cmake
    }

    /// Whether `name` resolves to a path ending in one of `suffixes`.
    /// Unresolvable names are simply "no".
    pub fn resolves_with_suffix(&mut self, name: &str, suffixes: &[&str]) -> bool {
        match self.resolve(name) {
            Some(path) => {
                let path = path.to_string_lossy();
                suffixes.iter().any(|suffix| path.ends_with(suffix))
            }
            None => false,
        }
    }
}

fn search_path(name: &str) -> Option<PathBuf> {
    if name.contains('/') {
        let path = Path::new(name);
        if is_executable(path) {
            return Some(path.to_path_buf());
        }
        return None;
    }
    let path_var = env::var_os("PATH")?;
    for dir in env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
