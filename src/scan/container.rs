//! Zip container access.
//!
//! [`ContainerReader`] owns the open file; dropping it closes the handle, so
//! every early return in the scanner releases it.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::result::ZipError;
use zip::ZipArchive;

#[derive(Debug, Error)]
pub enum ContainerError {
    /// The file cannot be opened or is not a zip container.
    #[error("'{path}' is not a readable archive: {reason}")]
    NotAnArchive { path: PathBuf, reason: String },

    /// One member's zip header is unusable.
    #[error("member #{index} of '{path}' is unreadable: {source}")]
    Member {
        path: PathBuf,
        index: usize,
        #[source]
        source: ZipError,
    },

    /// One member's data fails to decompress or its checksum is wrong.
    #[error("member '{member}' of '{path}' is corrupt: {source}")]
    MemberData {
        path: PathBuf,
        member: String,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest of '{path}' is unreadable: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: ZipError,
    },

    #[error("member '{member}' is {size} bytes, limit is {limit}")]
    MemberTooLarge {
        member: String,
        size: u64,
        limit: u64,
    },

    /// The container file itself cannot be read.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ContainerError {
    /// Whether only a single member is affected and the scan can go on.
    pub fn is_member_local(&self) -> bool {
        matches!(
            self,
            ContainerError::Member { .. }
                | ContainerError::MemberData { .. }
                | ContainerError::MemberTooLarge { .. }
        )
    }
}

/// A file member read fully into memory.
#[derive(Debug, Clone)]
pub struct ArchiveMember {
    pub name: String,
    pub bytes: Vec<u8>,
}

pub struct ContainerReader {
    path: PathBuf,
    archive: ZipArchive<BufReader<File>>,
    max_member_bytes: u64,
}

impl ContainerReader {
    pub fn open(path: &Path, max_member_bytes: u64) -> Result<Self, ContainerError> {
        let file = File::open(path).map_err(|e| ContainerError::NotAnArchive {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let archive =
            ZipArchive::new(BufReader::new(file)).map_err(|e| ContainerError::NotAnArchive {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            archive,
            max_member_bytes,
        })
    }

    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    /// Single forward pass over the file members accepted by `filter`.
    ///
    /// Members rejected by the filter are never decompressed.
    pub fn members<F>(&mut self, filter: F) -> Members<'_, F>
    where
        F: FnMut(&str) -> bool,
    {
        Members {
            reader: self,
            index: 0,
            filter,
        }
    }

    /// Raw bytes of the manifest, looked up case-insensitively.
    pub fn manifest(&mut self, manifest_name: &str) -> Result<Option<Vec<u8>>, ContainerError> {
        let found = self
            .archive
            .file_names()
            .find(|name| name.eq_ignore_ascii_case(manifest_name))
            .map(str::to_owned);

        let Some(name) = found else {
            return Ok(None);
        };

        let mut entry = self
            .archive
            .by_name(&name)
            .map_err(|source| ContainerError::Manifest {
                path: self.path.clone(),
                source,
            })?;

        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|source| ContainerError::Manifest {
                path: self.path.clone(),
                source: ZipError::Io(source),
            })?;
        Ok(Some(bytes))
    }

    fn read_member(
        &mut self,
        index: usize,
        filter: &mut impl FnMut(&str) -> bool,
    ) -> Option<Result<ArchiveMember, ContainerError>> {
        // An I/O failure here is the file giving out, not one bad header.
        let mut entry = match self.archive.by_index(index) {
            Ok(entry) => entry,
            Err(ZipError::Io(source)) => {
                return Some(Err(ContainerError::Io {
                    path: self.path.clone(),
                    source,
                }))
            }
            Err(source) => {
                return Some(Err(ContainerError::Member {
                    path: self.path.clone(),
                    index,
                    source,
                }))
            }
        };

        if !entry.is_file() || !filter(entry.name()) {
            return None;
        }

        let name = entry.name().to_string();
        let size = entry.size();
        if size > self.max_member_bytes {
            return Some(Err(ContainerError::MemberTooLarge {
                member: name,
                size,
                limit: self.max_member_bytes,
            }));
        }

        let mut bytes = Vec::with_capacity(size as usize);
        if let Err(source) = entry.read_to_end(&mut bytes) {
            return Some(Err(ContainerError::MemberData {
                path: self.path.clone(),
                member: name,
                source,
            }));
        }

        Some(Ok(ArchiveMember { name, bytes }))
    }
}

pub struct Members<'a, F> {
    reader: &'a mut ContainerReader,
    index: usize,
    filter: F,
}

impl<F> Iterator for Members<'_, F>
where
    F: FnMut(&str) -> bool,
{
    type Item = Result<ArchiveMember, ContainerError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.reader.len() {
            let index = self.index;
            self.index += 1;
            if let Some(item) = self.reader.read_member(index, &mut self.filter) {
                return Some(item);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        corrupt_stored_member, point_member_past_end, write_jar, write_stored_jar,
    };

    const LIMIT: u64 = 1024 * 1024;

    #[test]
    fn test_members_filtered_and_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_jar(
            dir.path(),
            "lib.jar",
            &[
                ("com/", vec![]),
                ("com/A.class", b"a".to_vec()),
                ("readme.txt", b"hello".to_vec()),
                ("com/B.class", b"b".to_vec()),
            ],
        );

        let mut reader = ContainerReader::open(&path, LIMIT).unwrap();
        let names: Vec<String> = reader
            .members(|name| name.ends_with(".class"))
            .map(|member| member.unwrap().name)
            .collect();

        assert_eq!(names, vec!["com/A.class", "com/B.class"]);
    }

    #[test]
    fn test_not_an_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "just some text").unwrap();

        let result = ContainerReader::open(&path, LIMIT);
        assert!(matches!(result, Err(ContainerError::NotAnArchive { .. })));

        let missing = ContainerReader::open(&dir.path().join("missing.jar"), LIMIT);
        assert!(matches!(missing, Err(ContainerError::NotAnArchive { .. })));
    }

    #[test]
    fn test_manifest_lookup_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_jar(
            dir.path(),
            "lib.jar",
            &[("meta-inf/manifest.mf", b"Manifest-Version: 1.0\n".to_vec())],
        );

        let mut reader = ContainerReader::open(&path, LIMIT).unwrap();
        let manifest = reader.manifest("META-INF/MANIFEST.MF").unwrap();
        assert_eq!(manifest.as_deref(), Some(&b"Manifest-Version: 1.0\n"[..]));
    }

    #[test]
    fn test_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_jar(dir.path(), "lib.jar", &[("A.class", b"a".to_vec())]);

        let mut reader = ContainerReader::open(&path, LIMIT).unwrap();
        assert!(reader.manifest("META-INF/MANIFEST.MF").unwrap().is_none());
    }

    #[test]
    fn test_oversized_member_is_member_local() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_jar(
            dir.path(),
            "lib.jar",
            &[("Big.class", vec![0u8; 64]), ("Small.class", vec![0u8; 8])],
        );

        let mut reader = ContainerReader::open(&path, 16).unwrap();
        let results: Vec<_> = reader.members(|_| true).collect();

        assert_eq!(results.len(), 2);
        let err = results[0].as_ref().unwrap_err();
        assert!(err.is_member_local());
        assert_eq!(results[1].as_ref().unwrap().bytes.len(), 8);
    }

    #[test]
    fn test_checksum_failure_is_member_local() {
        let dir = tempfile::tempdir().unwrap();
        let damaged = b"damaged member body".to_vec();
        let path = write_stored_jar(
            dir.path(),
            "lib.jar",
            &[("A.class", damaged.clone()), ("B.class", b"intact".to_vec())],
        );
        corrupt_stored_member(&path, &damaged);

        let mut reader = ContainerReader::open(&path, LIMIT).unwrap();
        let results: Vec<_> = reader.members(|_| true).collect();

        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(err, ContainerError::MemberData { member, .. } if member == "A.class"));
        assert!(err.is_member_local());
        assert_eq!(results[1].as_ref().unwrap().bytes, b"intact");
    }

    #[test]
    fn test_missing_member_data_is_container_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_jar(
            dir.path(),
            "lib.jar",
            &[("A.class", b"a".to_vec()), ("B.class", b"b".to_vec())],
        );
        point_member_past_end(&path, "B.class");

        let mut reader = ContainerReader::open(&path, LIMIT).unwrap();
        let results: Vec<_> = reader.members(|_| true).collect();

        assert!(results[0].is_ok());
        let err = results[1].as_ref().unwrap_err();
        assert!(matches!(err, ContainerError::Io { .. }));
        assert!(!err.is_member_local());
    }
}
