//! Destinations for extracted entities.
//!
//! The engine never touches the filesystem itself. It hands directories,
//! file contents and symlinks to a [`DataSink`]:
//!
//! - [`NullSink`] accepts everything and stores nothing (integrity tests).
//! - [`FilesystemSink`] writes below a root directory and refuses paths that
//!   would escape it.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};

/// Receiver of extracted data.
///
/// Calls for a file are bracketed: `start_file`, any number of `write` or
/// `write_from`, then `stop_file`. The engine itself only ever calls `write`,
/// one decoded chunk at a time. Errors are opaque to the engine and abort
/// the extraction.
pub trait DataSink {
    fn make_directory_recursive(&mut self, path: &Path) -> io::Result<()>;

    fn start_file(&mut self, relative_path: &str) -> io::Result<()>;

    fn stop_file(&mut self) -> io::Result<()>;

    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Append everything `reader` yields to the open file.
    ///
    /// For callers feeding a sink from their own streams. The default
    /// forwards to `write` in 64 KiB slices.
    fn write_from(&mut self, reader: &mut dyn Read) -> io::Result<u64> {
        let mut buf = [0u8; 64 * 1024];
        let mut total = 0u64;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => return Ok(total),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.write(&buf[..n])?;
            total += n as u64;
        }
    }

    fn make_symlink(&mut self, target: &str, link_path: &Path) -> io::Result<()>;

    /// Where `relative_path` ends up, or `None` when the sink is not a filesystem.
    fn resolve_absolute_path(&self, relative_path: &str) -> Option<PathBuf>;
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DataSink for NullSink {
    fn make_directory_recursive(&mut self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn start_file(&mut self, _relative_path: &str) -> io::Result<()> {
        Ok(())
    }

    fn stop_file(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn write(&mut self, _data: &[u8]) -> io::Result<()> {
        Ok(())
    }

    fn write_from(&mut self, reader: &mut dyn Read) -> io::Result<u64> {
        io::copy(reader, &mut io::sink())
    }

    fn make_symlink(&mut self, _target: &str, _link_path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn resolve_absolute_path(&self, _relative_path: &str) -> Option<PathBuf> {
        None
    }
}

/// Sink that writes below a root directory.
#[derive(Debug)]
pub struct FilesystemSink {
    root: PathBuf,
    current: Option<BufWriter<File>>,
}

impl FilesystemSink {
    /// Create the root directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            current: None,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join an archive path onto the root, rejecting absolute paths and `..`
    /// components that climb above it.
    pub fn sanitize(&self, relative_path: &str) -> io::Result<PathBuf> {
        let mut clean = PathBuf::new();
        for component in Path::new(relative_path).components() {
            match component {
                Component::Normal(part) => clean.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !clean.pop() {
                        return Err(escape_error(relative_path));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(escape_error(relative_path));
                }
            }
        }
        Ok(self.root.join(clean))
    }

    /// Accept a path already under the root, otherwise treat it as archive-relative.
    fn contain(&self, path: &Path) -> io::Result<PathBuf> {
        let climbs = path.components().any(|c| c == Component::ParentDir);
        if path.starts_with(&self.root) && !climbs {
            return Ok(path.to_path_buf());
        }
        self.sanitize(&path.to_string_lossy())
    }

    fn open_file(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.current
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no file is open"))
    }
}

fn escape_error(path: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("entity path {:?} escapes the output directory", path),
    )
}

impl DataSink for FilesystemSink {
    fn make_directory_recursive(&mut self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(self.contain(path)?)
    }

    fn start_file(&mut self, relative_path: &str) -> io::Result<()> {
        self.stop_file()?;
        let path = self.sanitize(relative_path)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.current = Some(BufWriter::new(File::create(&path)?));
        Ok(())
    }

    fn stop_file(&mut self) -> io::Result<()> {
        match self.current.take() {
            Some(mut file) => file.flush(),
            None => Ok(()),
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.open_file()?.write_all(data)
    }

    fn write_from(&mut self, reader: &mut dyn Read) -> io::Result<u64> {
        io::copy(reader, self.open_file()?)
    }

    fn make_symlink(&mut self, target: &str, link_path: &Path) -> io::Result<()> {
        let link = self.contain(link_path)?;
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent)?;
        }
        if fs::symlink_metadata(&link).is_ok() {
            fs::remove_file(&link)?;
        }
        create_symlink(target, &link)
    }

    fn resolve_absolute_path(&self, relative_path: &str) -> Option<PathBuf> {
        self.sanitize(relative_path).ok()
    }
}

#[cfg(unix)]
fn create_symlink(target: &str, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &str, link: &Path) -> io::Result<()> {
    let resolved = link.parent().map(|p| p.join(target));
    if resolved.is_some_and(|p| p.is_dir()) {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}

#[cfg(not(any(unix, windows)))]
fn create_symlink(_target: &str, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symbolic links are not supported on this platform",
    ))
}
