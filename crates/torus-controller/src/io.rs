//! Channel-driven file collaborator.
//!
//! A single task owns all file access and is driven through four channels
//! plus an idle probe, so callers never touch the filesystem directly and
//! teardown can wait for in-flight writes to drain. Boards on disk are one
//! byte per cell, row-major, 0 = dead; load filenames are `<W>x<H>` and
//! saves append the turn as `<W>x<H>x<turn>`.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::{error, info};

/// Commands accepted by the I/O task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoCommand {
    /// Read the file named on the filename channel and stream its bytes
    /// out on the input channel.
    Input,
    /// Collect `height * width` bytes from the output channel and write
    /// them to the file named on the filename channel.
    Output,
    /// Reply on the idle channel once all prior commands have completed.
    CheckIdle,
}

/// The caller's ends of the I/O task channels.
pub struct IoChannels {
    pub command: mpsc::Sender<IoCommand>,
    pub filename: mpsc::Sender<String>,
    pub input: mpsc::Receiver<u8>,
    pub output: mpsc::Sender<u8>,
    pub idle: mpsc::Receiver<bool>,
}

/// Spawn the I/O task for a board of the given shape, rooted at `base_dir`.
pub fn spawn_io(base_dir: PathBuf, height: usize, width: usize) -> IoChannels {
    let (command_tx, command_rx) = mpsc::channel(8);
    let (filename_tx, filename_rx) = mpsc::channel(8);
    let (input_tx, input_rx) = mpsc::channel(1024);
    let (output_tx, output_rx) = mpsc::channel(1024);
    let (idle_tx, idle_rx) = mpsc::channel(1);

    tokio::spawn(io_task(
        base_dir, height, width, command_rx, filename_rx, input_tx, output_rx, idle_tx,
    ));

    IoChannels {
        command: command_tx,
        filename: filename_tx,
        input: input_rx,
        output: output_tx,
        idle: idle_rx,
    }
}

#[allow(clippy::too_many_arguments)]
async fn io_task(
    base_dir: PathBuf,
    height: usize,
    width: usize,
    mut command_rx: mpsc::Receiver<IoCommand>,
    mut filename_rx: mpsc::Receiver<String>,
    input_tx: mpsc::Sender<u8>,
    mut output_rx: mpsc::Receiver<u8>,
    idle_tx: mpsc::Sender<bool>,
) {
    let cells = height * width;
    loop {
        let command = match command_rx.recv().await {
            Some(command) => command,
            None => return,
        };
        match command {
            IoCommand::Input => {
                let Some(name) = filename_rx.recv().await else { return };
                let path = base_dir.join(&name);
                let bytes = match tokio::fs::read(&path).await {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        error!(file = %path.display(), error = %err, "failed to read board file");
                        return;
                    }
                };
                if bytes.len() != cells {
                    error!(
                        file = %path.display(),
                        expected = cells,
                        actual = bytes.len(),
                        "board file has the wrong size"
                    );
                    return;
                }
                info!(file = %path.display(), "read board file");
                for byte in bytes {
                    if input_tx.send(byte).await.is_err() {
                        return;
                    }
                }
            }
            IoCommand::Output => {
                let Some(name) = filename_rx.recv().await else { return };
                let mut bytes = Vec::with_capacity(cells);
                for _ in 0..cells {
                    match output_rx.recv().await {
                        Some(byte) => bytes.push(byte),
                        None => return,
                    }
                }
                let path = base_dir.join(&name);
                match tokio::fs::write(&path, &bytes).await {
                    Ok(()) => info!(file = %path.display(), "saved board file"),
                    Err(err) => {
                        error!(file = %path.display(), error = %err, "failed to save board file")
                    }
                }
            }
            IoCommand::CheckIdle => {
                let _ = idle_tx.send(true).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn input_streams_the_file_bytes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("4x2"), [0u8, 1, 0, 1, 1, 0, 1, 0]).unwrap();

        let mut io = spawn_io(dir.path().to_path_buf(), 2, 4);
        io.command.send(IoCommand::Input).await.unwrap();
        io.filename.send("4x2".into()).await.unwrap();

        let mut bytes = Vec::new();
        for _ in 0..8 {
            bytes.push(io.input.recv().await.unwrap());
        }
        assert_eq!(bytes, vec![0, 1, 0, 1, 1, 0, 1, 0]);
    }

    #[tokio::test]
    async fn output_writes_exactly_the_streamed_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut io = spawn_io(dir.path().to_path_buf(), 2, 3);

        io.command.send(IoCommand::Output).await.unwrap();
        io.filename.send("3x2x7".into()).await.unwrap();
        for byte in [1u8, 0, 1, 0, 0, 1] {
            io.output.send(byte).await.unwrap();
        }

        // Idle only replies once the write has completed.
        io.command.send(IoCommand::CheckIdle).await.unwrap();
        assert_eq!(io.idle.recv().await, Some(true));

        let written = std::fs::read(dir.path().join("3x2x7")).unwrap();
        assert_eq!(written, vec![1, 0, 1, 0, 0, 1]);
    }

    #[tokio::test]
    async fn missing_file_shuts_the_collaborator_down() {
        let dir = tempfile::tempdir().unwrap();
        let mut io = spawn_io(dir.path().to_path_buf(), 4, 4);

        io.command.send(IoCommand::Input).await.unwrap();
        io.filename.send("4x4".into()).await.unwrap();
        assert_eq!(io.input.recv().await, None);
    }
}
