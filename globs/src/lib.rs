//! Given a finite set of file paths, infer include/exclude glob patterns
//! that reproduce exactly that set when evaluated against the real
//! filesystem. Patterns are per-directory `<prefix>*<suffix>` candidates
//! built from the longest common prefix and suffix of the basenames, with
//! literal or pattern-shaped exclusions covering whatever else the
//! candidate happens to match.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobResult {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

/// Synthesize patterns for `files`. Deterministic: the same set always
/// yields the same patterns, in the same order.
pub fn best_glob_match(files: &BTreeSet<PathBuf>) -> GlobResult {
    let mut result = GlobResult::default();

    let all_files: BTreeSet<String> = files.iter().map(|p| path_string(p)).collect();

    let mut by_dir: BTreeMap<PathBuf, BTreeSet<String>> = BTreeMap::new();
    for file in files {
        let dir = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(PathBuf::new);
        let name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        by_dir.entry(dir).or_insert_with(BTreeSet::new).insert(name);
    }

    for (dir, names) in &by_dir {
        let full_paths: BTreeSet<String> = names
            .iter()
            .map(|name| path_string(&dir.join(name)))
            .collect();
        if names.len() == 1 {
            // A lone file needs no pattern.
            if let Some(only) = full_paths.iter().next() {
                result.include.push(only.clone());
            }
            continue;
        }

        let stem = format!("{}*{}", longest_prefix(names), longest_suffix(names));
        let pattern = path_string(&dir.join(stem));

        let matched = evaluate_pattern(&pattern);
        let exceptions: BTreeSet<String> = matched.difference(&all_files).cloned().collect();

        if exceptions.is_empty() {
            result.include.push(pattern);
            continue;
        }
        if exceptions.len() == 1 {
            result.include.push(pattern);
            if let Some(only) = exceptions.iter().next() {
                result.exclude.push(only.clone());
            }
            continue;
        }

        let exception_prefix = longest_prefix(&exceptions);
        let exception_suffix = longest_suffix(&exceptions);
        let ambiguous = full_paths
            .iter()
            .any(|file| file.starts_with(&exception_prefix) && file.ends_with(&exception_suffix));
        if ambiguous {
            // No pattern separates the wanted files from the exceptions.
            if full_paths.len() <= exceptions.len() {
                result.include.extend(full_paths.iter().cloned());
            } else {
                result.exclude.extend(exceptions.iter().cloned());
                result.include.push(pattern);
            }
            continue;
        }
        result
            .exclude
            .push(format!("{}*{}", exception_prefix, exception_suffix));
        result.include.push(pattern);
    }

    result
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn evaluate_pattern(pattern: &str) -> BTreeSet<String> {
    match glob::glob(pattern) {
        Ok(paths) => paths
            .filter_map(Result::ok)
            .map(|path| path_string(&path))
            .collect(),
        Err(_) => BTreeSet::new(),
    }
}

fn common_prefix_len(base: &str, other: &str) -> usize {
    base.char_indices()
        .zip(other.chars())
        .take_while(|((_, a), b)| a == b)
        .last()
        .map(|((i, a), _)| i + a.len_utf8())
        .unwrap_or(0)
}

fn common_suffix_len(base: &str, other: &str) -> usize {
    base.chars()
        .rev()
        .zip(other.chars().rev())
        .take_while(|(a, b)| a == b)
        .map(|(a, _)| a.len_utf8())
        .sum()
}

fn longest_prefix(names: &BTreeSet<String>) -> String {
    let mut iter = names.iter();
    let base = match iter.next() {
        Some(base) => base,
        None => return String::new(),
    };
    let mut len = base.len();
    for name in iter {
        len = len.min(common_prefix_len(base, name));
    }
    base[..len].to_owned()
}

fn longest_suffix(names: &BTreeSet<String>) -> String {
    let mut iter = names.iter();
    let base = match iter.next() {
        Some(base) => base,
        None => return String::new(),
    };
    let mut len = base.len();
    for name in iter {
        len = len.min(common_suffix_len(base, name));
    }
    base[base.len() - len..].to_owned()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    fn fixture(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        for file in files {
            let path = dir.path().join(file);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("mkdir");
            }
            fs::write(path, b"").expect("write");
        }
        dir
    }

    fn target(dir: &tempfile::TempDir, files: &[&str]) -> BTreeSet<PathBuf> {
        files.iter().map(|f| dir.path().join(f)).collect()
    }

    /// Evaluate a synthesis result the way the generated script would:
    /// include patterns against the filesystem, minus anything matching an
    /// exclude entry.
    fn evaluate(result: &GlobResult) -> BTreeSet<PathBuf> {
        let excludes: Vec<glob::Pattern> = result
            .exclude
            .iter()
            .map(|e| glob::Pattern::new(e).expect("exclude pattern"))
            .collect();
        let mut files = BTreeSet::new();
        for include in &result.include {
            for path in glob::glob(include).expect("include pattern").flatten() {
                if !excludes.iter().any(|p| p.matches_path(&path)) {
                    files.insert(path);
                }
            }
        }
        files
    }

    #[test]
    fn test_single_file_is_literal() {
        let dir = fixture(&["a.c", "b.c"]);
        let files = target(&dir, &["a.c"]);
        let result = best_glob_match(&files);
        assert_eq!(result.include, vec![path_string(&dir.path().join("a.c"))]);
        assert!(result.exclude.is_empty());
        assert_eq!(evaluate(&result), files);
    }

    #[test]
    fn test_exact_pattern_without_exceptions() {
        let dir = fixture(&["a.c", "b.c", "notes.txt"]);
        let files = target(&dir, &["a.c", "b.c"]);
        let result = best_glob_match(&files);
        assert_eq!(result.include, vec![path_string(&dir.path().join("*.c"))]);
        assert!(result.exclude.is_empty());
        assert_eq!(evaluate(&result), files);
    }

    #[test]
    fn test_one_exception_becomes_literal_exclude() {
        let dir = fixture(&["a.c", "b.c", "skip.c"]);
        let files = target(&dir, &["a.c", "b.c"]);
        let result = best_glob_match(&files);
        assert_eq!(result.include, vec![path_string(&dir.path().join("*.c"))]);
        assert_eq!(result.exclude, vec![path_string(&dir.path().join("skip.c"))]);
        assert_eq!(evaluate(&result), files);
    }

    #[test]
    fn test_exception_pattern_exclude() {
        let dir = fixture(&["main.c", "util.c", "test_a.c", "test_b.c"]);
        let files = target(&dir, &["main.c", "util.c"]);
        let result = best_glob_match(&files);
        assert_eq!(result.include, vec![path_string(&dir.path().join("*.c"))]);
        assert_eq!(
            result.exclude,
            vec![format!("{}*.c", path_string(&dir.path().join("test_")))]
        );
        assert_eq!(evaluate(&result), files);
    }

    #[test]
    fn test_ambiguous_small_target_falls_back_to_literals() {
        // The exception pattern test_* also matches a wanted file, and the
        // target set is not larger than the exception set, so every wanted
        // file is listed literally.
        let dir = fixture(&["test_keep.c", "x.c", "test_a.c", "test_b.c"]);
        let files = target(&dir, &["test_keep.c", "x.c"]);
        let result = best_glob_match(&files);
        let mut expected: Vec<String> = vec![
            path_string(&dir.path().join("test_keep.c")),
            path_string(&dir.path().join("x.c")),
        ];
        expected.sort();
        assert_eq!(result.include, expected);
        assert!(result.exclude.is_empty());
        assert_eq!(evaluate(&result), files);
    }

    #[test]
    fn test_ambiguous_large_target_excludes_literally() {
        let dir = fixture(&["test_keep.c", "x.c", "y.c", "z.c", "test_a.c", "test_b.c"]);
        let files = target(&dir, &["test_keep.c", "x.c", "y.c", "z.c"]);
        let result = best_glob_match(&files);
        assert_eq!(result.include, vec![path_string(&dir.path().join("*.c"))]);
        let mut expected: Vec<String> = vec![
            path_string(&dir.path().join("test_a.c")),
            path_string(&dir.path().join("test_b.c")),
        ];
        expected.sort();
        assert_eq!(result.exclude, expected);
        assert_eq!(evaluate(&result), files);
    }

    #[test]
    fn test_multiple_directories() {
        let dir = fixture(&["src/a.c", "src/b.c", "lib/only.c"]);
        let files = target(&dir, &["src/a.c", "src/b.c", "lib/only.c"]);
        let result = best_glob_match(&files);
        assert_eq!(result.include.len(), 2);
        assert_eq!(evaluate(&result), files);
    }

    #[test]
    fn test_determinism() {
        let dir = fixture(&["a.c", "b.c", "skip.c", "other.h"]);
        let files = target(&dir, &["a.c", "b.c"]);
        let first = best_glob_match(&files);
        let second = best_glob_match(&files);
        assert_eq!(first, second);
    }

    #[test]
    fn test_prefix_and_suffix() {
        let names: BTreeSet<String> = vec!["mod_alpha.c", "mod_beta.c"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(longest_prefix(&names), "mod_");
        assert_eq!(longest_suffix(&names), "a.c");
    }
}
