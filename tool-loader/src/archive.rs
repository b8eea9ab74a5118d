//! Zip extraction and working-copy file helpers.
//!
//! Everything here is synchronous and runs inside `spawn_blocking`.

use std::fs::{self, File};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use zip::ZipArchive;

use crate::error::{LoaderError, LoaderResult};
use crate::manifest::{CAPABILITIES_FILE, MANIFEST_FILE};

/// Limits enforced while accepting and extracting an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveLimits {
    /// Maximum size of the uploaded archive.
    pub max_archive_bytes: u64,
    /// Maximum number of entries in the archive.
    pub max_entries: usize,
    /// Maximum uncompressed size of a single entry.
    pub max_entry_bytes: u64,
    /// Maximum total uncompressed size.
    pub max_total_bytes: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_archive_bytes: 50 * 1024 * 1024,
            max_entries: 2_000,
            max_entry_bytes: 20 * 1024 * 1024,
            max_total_bytes: 200 * 1024 * 1024,
        }
    }
}

/// Extracts `bytes` into `dest` and returns the directory holding the
/// descriptors.
pub(crate) fn extract(bytes: &[u8], dest: &Path, limits: ArchiveLimits) -> LoaderResult<PathBuf> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| LoaderError::bad_archive(format!("not a zip archive: {err}")))?;

    if archive.len() > limits.max_entries {
        return Err(LoaderError::bad_archive(format!(
            "{} entries exceeds the limit of {}",
            archive.len(),
            limits.max_entries
        )));
    }

    let mut total: u64 = 0;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| LoaderError::bad_archive(format!("unreadable entry {index}: {err}")))?;

        let Some(relative) = entry.enclosed_name() else {
            return Err(LoaderError::bad_archive(format!(
                "entry `{}` escapes the archive root",
                entry.name()
            )));
        };
        let target = dest.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|err| LoaderError::io(&target, err))?;
            continue;
        }

        if entry.size() > limits.max_entry_bytes {
            return Err(LoaderError::bad_archive(format!(
                "entry `{}` is larger than {} bytes",
                relative.display(),
                limits.max_entry_bytes
            )));
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|err| LoaderError::io(parent, err))?;
        }
        let mut out = File::create(&target).map_err(|err| LoaderError::io(&target, err))?;

        // Declared sizes can lie; bound the actual copy as well.
        let mut limited = (&mut entry).take(limits.max_entry_bytes + 1);
        let written = io::copy(&mut limited, &mut out).map_err(|err| {
            LoaderError::bad_archive(format!("failed to inflate `{}`: {err}", relative.display()))
        })?;
        if written > limits.max_entry_bytes {
            return Err(LoaderError::bad_archive(format!(
                "entry `{}` is larger than {} bytes",
                relative.display(),
                limits.max_entry_bytes
            )));
        }
        out.flush().map_err(|err| LoaderError::io(&target, err))?;

        total += written;
        if total > limits.max_total_bytes {
            return Err(LoaderError::bad_archive(format!(
                "archive expands beyond {} bytes",
                limits.max_total_bytes
            )));
        }
    }

    locate_root(dest)
}

/// Finds the directory holding the descriptors: the archive root, or its only
/// top-level folder.
fn locate_root(dest: &Path) -> LoaderResult<PathBuf> {
    let candidate = if dest.join(MANIFEST_FILE).is_file() {
        dest.to_path_buf()
    } else {
        let mut dirs = Vec::new();
        let mut has_files = false;
        for entry in fs::read_dir(dest).map_err(|err| LoaderError::io(dest, err))? {
            let entry = entry.map_err(|err| LoaderError::io(dest, err))?;
            let path = entry.path();
            if path.is_dir() {
                if entry.file_name() != "__MACOSX" {
                    dirs.push(path);
                }
            } else {
                has_files = true;
            }
        }
        match dirs.as_slice() {
            [single] if !has_files && single.join(MANIFEST_FILE).is_file() => single.clone(),
            _ => {
                return Err(LoaderError::MissingDescriptor {
                    file: MANIFEST_FILE,
                });
            }
        }
    };

    if !candidate.join(CAPABILITIES_FILE).is_file() {
        return Err(LoaderError::MissingDescriptor {
            file: CAPABILITIES_FILE,
        });
    }
    Ok(candidate)
}

/// Returns every `.py` file under `root` as `(relative display path, path)`,
/// sorted for deterministic reporting.
pub(crate) fn python_sources(root: &Path) -> LoaderResult<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).map_err(|err| LoaderError::io(&dir, err))? {
            let path = entry.map_err(|err| LoaderError::io(&dir, err))?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "py") {
                let relative = path
                    .strip_prefix(root)
                    .unwrap_or(path.as_path())
                    .to_string_lossy()
                    .replace('\\', "/");
                found.push((relative, path));
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Recursively copies `from` into the new directory `to`.
pub(crate) fn copy_tree(from: &Path, to: &Path) -> LoaderResult<()> {
    fs::create_dir_all(to).map_err(|err| LoaderError::io(to, err))?;
    for entry in fs::read_dir(from).map_err(|err| LoaderError::io(from, err))? {
        let entry = entry.map_err(|err| LoaderError::io(from, err))?;
        let source = entry.path();
        let target = to.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|err| LoaderError::io(&source, err))?;
        if file_type.is_dir() {
            copy_tree(&source, &target)?;
        } else if file_type.is_file() {
            fs::copy(&source, &target).map_err(|err| LoaderError::io(&source, err))?;
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    use super::*;

    /// Builds an in-memory zip from `(path, contents)` pairs.
    pub(crate) fn zip_of(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in files {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    const DESCRIPTORS: [(&str, &str); 2] = [
        ("manifest.json", "{}"),
        ("capabilities.json", "[]"),
    ];

    #[test]
    fn extracts_root_level_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = zip_of(&[DESCRIPTORS[0], DESCRIPTORS[1], ("pkg/main.py", "x = 1\n")]);
        let root = extract(&bytes, dir.path(), ArchiveLimits::default()).unwrap();
        assert_eq!(root, dir.path());

        let sources = python_sources(&root).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].0, "pkg/main.py");
    }

    #[test]
    fn descriptors_may_live_in_single_folder() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = zip_of(&[
            ("weather/manifest.json", "{}"),
            ("weather/capabilities.json", "[]"),
        ]);
        let root = extract(&bytes, dir.path(), ArchiveLimits::default()).unwrap();
        assert_eq!(root, dir.path().join("weather"));
    }

    #[test]
    fn missing_capabilities_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = zip_of(&[DESCRIPTORS[0]]);
        let err = extract(&bytes, dir.path(), ArchiveLimits::default()).unwrap_err();
        assert!(matches!(
            err,
            LoaderError::MissingDescriptor {
                file: CAPABILITIES_FILE
            }
        ));
    }

    #[test]
    fn rejects_traversal_and_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = zip_of(&[("../evil.py", "x = 1\n")]);
        assert!(matches!(
            extract(&bytes, dir.path(), ArchiveLimits::default()),
            Err(LoaderError::BadArchive { .. })
        ));
        assert!(matches!(
            extract(b"not a zip", dir.path(), ArchiveLimits::default()),
            Err(LoaderError::BadArchive { .. })
        ));
    }

    #[test]
    fn enforces_entry_limits() {
        let dir = tempfile::tempdir().unwrap();
        let limits = ArchiveLimits {
            max_entry_bytes: 4,
            ..ArchiveLimits::default()
        };
        let bytes = zip_of(&[("manifest.json", "{\"name\": \"big\"}")]);
        assert!(matches!(
            extract(&bytes, dir.path(), limits),
            Err(LoaderError::BadArchive { .. })
        ));

        let limits = ArchiveLimits {
            max_entries: 1,
            ..ArchiveLimits::default()
        };
        let bytes = zip_of(&DESCRIPTORS);
        assert!(extract(&bytes, dir.path(), limits).is_err());
    }

    #[test]
    fn copy_tree_duplicates_nested_files() {
        let from = tempfile::tempdir().unwrap();
        fs::create_dir_all(from.path().join("a/b")).unwrap();
        fs::write(from.path().join("a/b/c.txt"), "hi").unwrap();
        let to = tempfile::tempdir().unwrap();
        let target = to.path().join("copy");
        copy_tree(from.path(), &target).unwrap();
        assert_eq!(fs::read_to_string(target.join("a/b/c.txt")).unwrap(), "hi");
    }
}
