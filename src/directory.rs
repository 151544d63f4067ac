//! Serving a directory tree.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Result, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use tracing::{info, warn};

use crate::context::Operation;
use crate::handler::{read_block, Handler, Payload, Status};
use crate::packet::Mode;

/// A [`Handler`] serving the files below a root directory.
///
/// Names that would leave the root are refused, and so are writes to files
/// that already exist unless overwriting is allowed. A write that does not
/// finish leaves no partial file behind.
pub struct Directory {
    root: PathBuf,
    allow_overwrite: bool,
    open: Option<OpenFile>,
}

struct OpenFile {
    path: PathBuf,
    file: File,
    action: Operation,
}

impl Directory {
    /// Serves files from `root`, which must be an existing directory.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().canonicalize()?;
        if !root.is_dir() {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            ));
        }

        Ok(Self {
            root,
            allow_overwrite: false,
            open: None,
        })
    }

    /// Lets writes replace existing files.
    pub fn allow_overwrite(mut self, allow: bool) -> Self {
        self.allow_overwrite = allow;
        self
    }

    /// The directory files are served from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, file_name: &str) -> Option<PathBuf> {
        let relative = Path::new(file_name);
        let inside = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));

        if file_name.is_empty() || !inside {
            return None;
        }

        Some(self.root.join(relative))
    }

    fn open(&self, action: Operation, path: &Path) -> Result<File> {
        match action {
            Operation::Read => File::open(path),
            Operation::Write => {
                let mut options = OpenOptions::new();
                options.write(true);
                if self.allow_overwrite {
                    options.create(true).truncate(true);
                } else {
                    options.create_new(true);
                }
                options.open(path)
            }
        }
    }
}

impl Handler for Directory {
    fn start(
        &mut self,
        action: Operation,
        mode: Mode,
        file_name: &str,
        transfer_size: &mut u64,
    ) -> bool {
        self.open = None;

        let path = match self.resolve(file_name) {
            Some(path) => path,
            None => {
                warn!("refusing {:?}: outside of {}", file_name, self.root.display());
                return false;
            }
        };

        let file = match self.open(action, &path) {
            Ok(file) => file,
            Err(e) => {
                warn!("refusing {} of {}: {}", action, path.display(), e);
                return false;
            }
        };

        if action == Operation::Read {
            match file.metadata() {
                Ok(metadata) if metadata.is_file() => *transfer_size = metadata.len(),
                Ok(_) => {
                    warn!("refusing {}: not a regular file", path.display());
                    return false;
                }
                Err(e) => {
                    warn!("refusing {}: {}", path.display(), e);
                    return false;
                }
            }
        }

        info!("{} {} in {} mode", action, path.display(), mode);
        self.open = Some(OpenFile { path, file, action });
        true
    }

    fn data(&mut self, offset: u64, payload: Payload<'_>) -> Result<usize> {
        let open = self
            .open
            .as_mut()
            .ok_or_else(|| io::Error::new(ErrorKind::NotConnected, "no file is open"))?;

        open.file.seek(SeekFrom::Start(offset))?;
        match payload {
            Payload::Received(bytes) => {
                open.file.write_all(bytes)?;
                Ok(bytes.len())
            }
            Payload::Fill(buf) => read_block(&mut open.file, buf),
        }
    }

    fn stop(&mut self, status: Status, _message: Option<&str>) {
        let open = match self.open.take() {
            Some(open) => open,
            None => return,
        };

        if open.action != Operation::Write {
            return;
        }

        if status.is_success() {
            if let Err(e) = open.file.sync_all() {
                warn!("failed to sync {}: {}", open.path.display(), e);
            }
            return;
        }

        drop(open.file);
        match fs::remove_file(&open.path) {
            Ok(()) => info!("removed partial {}", open.path.display()),
            Err(e) => warn!("failed to remove partial {}: {}", open.path.display(), e),
        }
    }
}
