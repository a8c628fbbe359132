use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Fully written and synced sibling of `target`, not yet visible under the target name.
#[derive(Debug)]
pub(super) struct StagedFile {
    staging: PathBuf,
    target: PathBuf,
}

#[derive(Debug)]
pub(super) struct CommitError {
    pub(super) path: PathBuf,
    pub(super) source: io::Error,
}

pub(super) fn stage_file(target: &Path, bytes: &[u8]) -> io::Result<StagedFile> {
    if let Some(parent) = target.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let staging = sibling_path(target, "partial");
    if let Err(error) = write_synced(&staging, bytes) {
        let _ = fs::remove_file(&staging);
        return Err(error);
    }
    Ok(StagedFile {
        staging,
        target: target.to_path_buf(),
    })
}

impl StagedFile {
    fn commit(self) -> Result<(), CommitError> {
        fs::rename(&self.staging, &self.target).map_err(|source| {
            let _ = fs::remove_file(&self.staging);
            CommitError {
                path: self.target.clone(),
                source,
            }
        })
    }

    pub(super) fn discard(self) {
        let _ = fs::remove_file(&self.staging);
    }
}

/// Moves both staged files into place. If `second` cannot be committed, the
/// previous contents of `first` are restored, so the pair never mixes versions.
pub(super) fn commit_pair(first: StagedFile, second: StagedFile) -> Result<(), CommitError> {
    let first_target = first.target.clone();
    let backup = sibling_path(&first_target, "bak");
    let has_backup = match fs::copy(&first_target, &backup) {
        Ok(_) => true,
        Err(error) if error.kind() == io::ErrorKind::NotFound => false,
        Err(source) => {
            let _ = fs::remove_file(&backup);
            first.discard();
            second.discard();
            return Err(CommitError {
                path: backup,
                source,
            });
        }
    };

    if let Err(error) = first.commit() {
        second.discard();
        if has_backup {
            let _ = fs::remove_file(&backup);
        }
        return Err(error);
    }

    if let Err(error) = second.commit() {
        let _ = if has_backup {
            fs::rename(&backup, &first_target)
        } else {
            fs::remove_file(&first_target)
        };
        return Err(error);
    }

    if has_backup {
        let _ = fs::remove_file(&backup);
    }
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("zone"));
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn file_names(dir: &Path) -> Vec<OsString> {
        let mut names = fs::read_dir(dir)
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    #[test]
    fn pair_replaces_both_files_and_leaves_nothing_behind() {
        let temp = TempDir::new().expect("tempdir");
        let dir = temp.path().join("nested");
        let data = dir.join("zone.json");
        let meta = dir.join("zone.meta");

        for (data_bytes, meta_bytes) in [(b"data-1", b"meta-1"), (b"data-2", b"meta-2")] {
            let first = stage_file(&data, data_bytes).expect("stage data");
            let second = stage_file(&meta, meta_bytes).expect("stage meta");
            commit_pair(first, second).expect("commit");
        }

        assert_eq!(fs::read(&data).expect("read data"), b"data-2");
        assert_eq!(fs::read(&meta).expect("read meta"), b"meta-2");
        assert_eq!(
            file_names(&dir),
            vec![OsString::from("zone.json"), OsString::from("zone.meta")]
        );
    }

    #[test]
    fn failed_second_commit_restores_first_file() {
        let temp = TempDir::new().expect("tempdir");
        let data = temp.path().join("zone.json");
        let meta = temp.path().join("zone.meta");
        fs::write(&data, b"old").expect("seed data");
        fs::create_dir_all(meta.join("occupied")).expect("block meta");

        let first = stage_file(&data, b"new").expect("stage data");
        let second = stage_file(&meta, b"meta").expect("stage meta");
        let error = commit_pair(first, second).expect_err("meta is a directory");

        assert_eq!(error.path, meta);
        assert_eq!(fs::read(&data).expect("read data"), b"old");
        assert_eq!(
            file_names(temp.path()),
            vec![OsString::from("zone.json"), OsString::from("zone.meta")]
        );
    }

    #[test]
    fn failed_second_commit_removes_first_file_without_backup() {
        let temp = TempDir::new().expect("tempdir");
        let data = temp.path().join("zone.json");
        let meta = temp.path().join("zone.meta");
        fs::create_dir_all(meta.join("occupied")).expect("block meta");

        let first = stage_file(&data, b"new").expect("stage data");
        let second = stage_file(&meta, b"meta").expect("stage meta");
        assert!(commit_pair(first, second).is_err());
        assert!(!data.exists());
    }

    #[test]
    fn staging_and_backup_files_sit_next_to_target() {
        let target = Path::new("zones/zone_0_0_0.json");
        assert_eq!(
            sibling_path(target, "partial"),
            PathBuf::from("zones/zone_0_0_0.json.partial")
        );
        assert_eq!(
            sibling_path(target, "bak"),
            PathBuf::from("zones/zone_0_0_0.json.bak")
        );
    }
}
