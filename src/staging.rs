//! Staged writes: build a file in a scratch directory next to its
//! destination and move it into place only once it is complete.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::files::make_dirs_for_file;
use crate::{Result, SimError};

/// A file being built away from its destination. Dropping the guard without
/// calling [`StagedOutFile::commit`] discards the staged copy and leaves the
/// destination untouched.
#[derive(Debug)]
pub struct StagedOutFile {
    dest: PathBuf,
    staged: PathBuf,
    // removed, with whatever is left in it, when the guard goes away
    _dir: TempDir,
}

impl StagedOutFile {
    pub fn new<P: AsRef<Path>>(dest: P) -> Result<Self> {
        let dest = dest.as_ref().to_path_buf();
        make_dirs_for_file(&dest)?;
        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = dest.file_name().ok_or(SimError::InvalidSeInfo(format!(
            "{} has no file name",
            dest.display()
        )))?;
        let dir = tempfile::Builder::new().prefix(".staged-").tempdir_in(parent)?;
        let staged = dir.path().join(name);
        Ok(Self {
            dest,
            staged,
            _dir: dir,
        })
    }

    /// where the file should be written while staged
    pub fn path(&self) -> &Path {
        &self.staged
    }

    /// move the staged file over the destination
    pub fn commit(self) -> Result<PathBuf> {
        std::fs::rename(&self.staged, &self.dest)?;
        Ok(self.dest.clone())
    }
}

/// Run `write` against a staged path and move the result to `dest` if it
/// succeeds. The staging area is cleaned up on every exit path.
pub fn write_staged<P, F>(dest: P, write: F) -> Result<PathBuf>
where
    P: AsRef<Path>,
    F: FnOnce(&Path) -> Result<()>,
{
    let staged = StagedOutFile::new(dest)?;
    write(staged.path())?;
    staged.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn commit_replaces_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("sub").join("image.fits");
        make_dirs_for_file(&dest).unwrap();
        std::fs::write(&dest, "old").unwrap();

        let out = write_staged(&dest, |p| Ok(std::fs::write(p, "new")?)).unwrap();
        assert_eq!(out, dest);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "new");
        assert_eq!(entries(&dir.path().join("sub")), vec!["image.fits"]);
    }

    #[test]
    fn failure_leaves_destination_alone() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("image.fits");
        std::fs::write(&dest, "old").unwrap();

        let res = write_staged(&dest, |p| {
            std::fs::write(p, "half written")?;
            Err(SimError::InvalidFITS("boom".to_string()))
        });
        assert!(res.is_err());
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "old");
        assert_eq!(entries(dir.path()), vec!["image.fits"]);
    }

    #[test]
    fn dropped_guard_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("bkg.fits");
        {
            let staged = StagedOutFile::new(&dest).unwrap();
            std::fs::write(staged.path(), "x").unwrap();
        }
        assert!(!dest.exists());
        assert!(entries(dir.path()).is_empty());
    }
}
