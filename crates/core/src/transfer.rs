//! File transfer between host and container
//!
//! Files move through archive pipes into a separate `exec` process, never
//! through the shared shell and never through the runtime's native copy
//! command. With the host root bind-mounted, native copy fails when source and
//! destination resolve to the same mount; piping avoids that entirely.
//!
//! The host side of each pipe is built in-process with the `tar` crate; the
//! container side is the image's own `tar` (or `sh -c "cat > ..."` for a
//! single file).

use crate::container::Container;
use crate::errors::{Result, TransferError};
use crate::shell::Invocation;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tracing::{debug, instrument};

fn check_status(status: ExitStatus, direction: &str) -> Result<()> {
    if status.success() {
        return Ok(());
    }
    Err(TransferError::ProcessFailed {
        direction: direction.to_string(),
        status,
    }
    .into())
}

/// Stream the contents of `root` as a tar archive into `writer`, closing it at the end
fn write_archive<W: Write>(writer: W, root: &Path) -> io::Result<()> {
    let mut builder = tar::Builder::new(writer);
    builder.follow_symlinks(false);
    append_tree(&mut builder, root, root)?;
    // finish and drop the pipe so the extractor sees EOF
    builder.into_inner()?.flush()
}

fn append_tree<W: Write>(
    builder: &mut tar::Builder<W>,
    dir: &Path,
    root: &Path,
) -> io::Result<()> {
    let mut entries = std::fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        // file_type does not follow symlinks, so links are archived as links
        if entry.file_type()?.is_dir() {
            builder.append_dir(relative, &path)?;
            append_tree(builder, &path, root)?;
        } else {
            builder.append_path_with_name(&path, relative)?;
        }
    }
    Ok(())
}

impl Container {
    /// Copy a host file or directory into the container
    ///
    /// For a directory, `to` is created with `mkdir -p` and receives the
    /// directory's contents. For a file, `to` is the destination file path.
    #[instrument(skip(self), fields(name = %self.name()))]
    pub fn copy_into(&mut self, from: &Path, to: &Path) -> Result<()> {
        let to_str = to.display().to_string();
        if from.is_dir() {
            self.call(&Invocation::new(["mkdir", "-p", to_str.as_str()]))?;
            self.stream_directory_in(from, &to_str)
        } else {
            self.stream_file_in(from, &to_str)
        }
    }

    fn stream_directory_in(&mut self, from: &Path, to: &str) -> Result<()> {
        let args: Vec<String> = ["tar", "-xC", to, "-f", "-"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut child = self
            .runtime
            .exec_command(self.name(), &args)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(TransferError::Io)?;

        let stdin = child.stdin.take().ok_or_else(|| {
            TransferError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "extraction process stdin is not piped",
            ))
        })?;

        let archived = write_archive(stdin, from);

        let status = child.wait().map_err(TransferError::Io)?;
        check_status(status, "into container")?;
        archived.map_err(|source| TransferError::Archive {
            path: from.display().to_string(),
            source,
        })?;

        debug!("Copied directory {} into {}", from.display(), to);
        Ok(())
    }

    fn stream_file_in(&mut self, from: &Path, to: &str) -> Result<()> {
        let mut file = File::open(from).map_err(|source| TransferError::Archive {
            path: from.display().to_string(),
            source,
        })?;

        let args = vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("cat > {}", shell_words::quote(to)),
        ];
        let mut child = self
            .runtime
            .exec_command(self.name(), &args)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(TransferError::Io)?;

        let copied = match child.stdin.take() {
            Some(mut stdin) => io::copy(&mut file, &mut stdin).map(|_| ()),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "redirection process stdin is not piped",
            )),
        };

        let status = child.wait().map_err(TransferError::Io)?;
        check_status(status, "into container")?;
        copied.map_err(TransferError::Io)?;

        debug!("Copied file {} into {}", from.display(), to);
        Ok(())
    }

    /// Copy the contents of a container directory out to `to` on the host
    ///
    /// `to` and its parents are created first. `from` must be a directory.
    #[instrument(skip(self), fields(name = %self.name()))]
    pub fn copy_out(&mut self, from: &Path, to: &Path) -> Result<()> {
        std::fs::create_dir_all(to).map_err(TransferError::Io)?;

        let from_str = from.display().to_string();
        let args: Vec<String> = ["tar", "-cC", from_str.as_str(), "-f", "-", "."]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut child = self
            .runtime
            .exec_command(self.name(), &args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(TransferError::Io)?;

        let unpacked = match child.stdout.take() {
            Some(stdout) => {
                let mut archive = tar::Archive::new(stdout);
                archive.set_preserve_permissions(true);
                archive.set_preserve_mtime(true);
                // drain trailing padding so the container's tar never sees a closed pipe
                archive.unpack(to).and_then(|_| {
                    io::copy(&mut archive.into_inner(), &mut io::sink()).map(|_| ())
                })
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "archive process stdout is not piped",
            )),
        };

        let status = child.wait().map_err(TransferError::Io)?;
        check_status(status, "out of container")?;
        unpacked.map_err(|source| TransferError::Archive {
            path: from_str.clone(),
            source,
        })?;

        debug!("Copied {} out to {}", from_str, to.display());
        Ok(())
    }
}
