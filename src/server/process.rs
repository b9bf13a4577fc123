use crate::error::{Error, Result};
use async_process::{Child, Command, ExitStatus, Stdio};
use futures::stream::{self, BoxStream, StreamExt};
use futures_lite::io::{AsyncBufReadExt, AsyncRead, BufReader};
use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

/// Merged stdout and stderr of a child, one item per line.
pub type OutputLines = BoxStream<'static, io::Result<String>>;

type SharedChild = Arc<Mutex<Option<Child>>>;

/// Split `reader` into lines, decoding each one leniently.
///
/// Bytes that are not UTF-8 become U+FFFD instead of ending the stream, so only
/// a real read failure yields an error. A trailing `\r` is dropped.
pub fn lossy_lines<R>(reader: R) -> OutputLines
where
    R: AsyncRead + Unpin + Send + 'static,
{
    BufReader::new(reader)
        .split(b'\n')
        .map(|line| {
            line.map(|mut bytes| {
                if bytes.last() == Some(&b'\r') {
                    bytes.pop();
                }
                String::from_utf8_lossy(&bytes).into_owned()
            })
        })
        .boxed()
}

fn lock_child(child: &SharedChild) -> MutexGuard<'_, Option<Child>> {
    // A panic while holding the lock cannot leave the Option half-written.
    child.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A launched server process.
///
/// The child is shared with any [`ProcessKiller`] handed out, so a termination
/// handler can kill it while the supervisor still owns it. The child is spawned
/// with `kill_on_drop`, so losing the last handle also kills it.
pub struct SupervisedProcess {
    id: u32,
    command_line: String,
    env: BTreeMap<String, String>,
    child: SharedChild,
}

impl SupervisedProcess {
    /// Spawn `command` with `args`, adding `env` to the inherited environment.
    ///
    /// stdout and stderr are piped and later merged by [`take_output`](Self::take_output).
    pub fn spawn(command: &str, args: &[String], env: BTreeMap<String, String>) -> Result<Self> {
        let command_line = std::iter::once(command)
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");

        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(&env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(command = %command_line, "Starting server process");
        let child = cmd
            .spawn()
            .map_err(|e| Error::Launch(format!("{}: {}", command_line, e)))?;
        let id = child.id();
        tracing::debug!(command = %command_line, pid = id, "Started server process");

        Ok(Self {
            id,
            command_line,
            env,
            child: Arc::new(Mutex::new(Some(child))),
        })
    }

    /// OS process id
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Command and arguments joined with spaces
    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    /// Environment entries the process was launched with, on top of the inherited ones
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Take stdout and stderr and merge them into a single line stream.
    ///
    /// Can only be called once.
    pub fn take_output(&mut self) -> Result<OutputLines> {
        let mut guard = lock_child(&self.child);
        let child = guard.as_mut().ok_or_else(|| {
            Error::Startup("Process has already been torn down".to_string())
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            Error::Startup("Failed to get stdout pipe from child process".to_string())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            Error::Startup("Failed to get stderr pipe from child process".to_string())
        })?;

        Ok(stream::select(lossy_lines(stdout), lossy_lines(stderr)).boxed())
    }

    /// Handle that can kill the process from another thread.
    pub fn killer(&self) -> ProcessKiller {
        ProcessKiller {
            id: self.id,
            child: Arc::clone(&self.child),
        }
    }

    /// Exit status if the process has already exited, `None` while it runs or after teardown.
    pub fn try_status(&self) -> Result<Option<ExitStatus>> {
        let mut guard = lock_child(&self.child);
        match guard.as_mut() {
            Some(child) => Ok(child.try_status()?),
            None => Ok(None),
        }
    }

    /// Whether the process is still running.
    pub fn is_running(&self) -> bool {
        let mut guard = lock_child(&self.child);
        match guard.as_mut() {
            Some(child) => matches!(child.try_status(), Ok(None)),
            None => false,
        }
    }

    /// Kill the process and wait for it to exit.
    ///
    /// The handle is invalidated; later calls, and kills through any
    /// [`ProcessKiller`], are no-ops. Returns `None` if it was already torn down.
    pub async fn kill_and_wait(&mut self) -> Result<Option<ExitStatus>> {
        let child = lock_child(&self.child).take();
        let Some(mut child) = child else {
            return Ok(None);
        };

        if let Err(e) = child.kill() {
            // Already exited; the wait below reaps it.
            tracing::debug!(pid = self.id, error = %e, "Kill failed");
        }

        let status = child.status().await.map_err(|e| {
            Error::Teardown(format!("Failed to wait for process {}: {}", self.id, e))
        })?;
        tracing::debug!(pid = self.id, status = %status, "Server process exited");
        Ok(Some(status))
    }
}

/// Kills a [`SupervisedProcess`] without owning it.
#[derive(Clone)]
pub struct ProcessKiller {
    id: u32,
    child: SharedChild,
}

impl ProcessKiller {
    /// OS process id of the target
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Send a kill to the process.
    ///
    /// Never fails: returns `true` if the kill was delivered, `false` if the
    /// process was already torn down or the kill was refused.
    pub fn kill(&self) -> bool {
        let mut guard = lock_child(&self.child);
        let Some(child) = guard.as_mut() else {
            return false;
        };

        match child.kill() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(pid = self.id, error = %e, "Failed to kill server process");
                false
            }
        }
    }
}

impl std::fmt::Debug for ProcessKiller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessKiller").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::io::Cursor;

    #[tokio::test]
    async fn test_invalid_utf8_does_not_end_the_stream() {
        let output = b"caf\xe9\r\nListening for thrift clients...\nmore\n".to_vec();
        let lines: Vec<String> = lossy_lines(Cursor::new(output))
            .map(|line| line.unwrap())
            .collect()
            .await;

        assert_eq!(
            lines,
            vec![
                "caf\u{FFFD}".to_string(),
                "Listening for thrift clients...".to_string(),
                "more".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_last_line_without_newline_is_kept() {
        let lines: Vec<String> = lossy_lines(Cursor::new(b"one\ntwo".to_vec()))
            .map(|line| line.unwrap())
            .collect()
            .await;

        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
    }
}
