//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::FfmpegProgress;

/// Binary looked up in `PATH` when no explicit location is configured.
pub const DEFAULT_FFMPEG: &str = "ffmpeg";

/// Number of stderr lines kept for error diagnostics.
const STDERR_TAIL_LINES: usize = 40;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Emit `-progress` key/value pairs on stdout
    progress: bool,
    /// Operation name used for metrics and logs
    operation: &'static str,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            progress: false,
            operation: "ffmpeg",
        }
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Seek after the input is opened (`-ss` placed after `-i`).
    pub fn seek_output(self, timestamp: impl Into<String>) -> Self {
        self.output_arg("-ss").output_arg(timestamp)
    }

    /// Extract single frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-vframes").output_arg("1")
    }

    /// Overwrite one image file instead of writing a numbered sequence.
    pub fn update_single_image(self) -> Self {
        self.output_arg("-update").output_arg("1")
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Report progress on stdout.
    pub fn with_progress(mut self) -> Self {
        self.progress = true;
        self
    }

    /// Name the operation for metrics.
    pub fn operation(mut self, operation: &'static str) -> Self {
        self.operation = operation;
        self
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push("error".to_string());

        if self.progress {
            args.push("-nostats".to_string());
            args.push("-progress".to_string());
            args.push("pipe:1".to_string());
        }

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.iter().cloned());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with exit-status checks and a timeout.
///
/// The child is killed when the run future is dropped.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    /// Binary name or path
    program: PathBuf,
    /// Kill the process after this long
    timeout: Option<Duration>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut(Duration),
}

impl FfmpegRunner {
    /// Create a runner using `ffmpeg` from `PATH`.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_FFMPEG),
            timeout: None,
        }
    }

    /// Use a specific binary.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Set timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Resolve the configured binary to an executable path.
    pub fn resolve_program(&self) -> MediaResult<PathBuf> {
        which::which(&self.program)
            .map_err(|_| MediaError::ToolNotFound(self.program.display().to_string()))
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run an FFmpeg command with progress callback.
    ///
    /// Succeeds only when the process exits 0 and the output file exists and
    /// is non-empty.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, progress_callback: F) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        let program = self.resolve_program()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: {} {}", program.display(), args.join(" "));

        let started = Instant::now();
        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let progress_handle = tokio::spawn(async move {
            let Some(stdout) = stdout else { return };
            let mut lines = BufReader::new(stdout).lines();
            let mut current = FfmpegProgress::default();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(snapshot) = current.update(&line) {
                    progress_callback(snapshot);
                }
            }
        });

        let stderr_handle = tokio::spawn(async move {
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
            Vec::from(tail).join("\n")
        });

        let status = self.wait_for_completion(&mut child).await;

        let _ = progress_handle.await;
        let stderr_tail = stderr_handle.await.unwrap_or_default();
        let stderr_tail = (!stderr_tail.trim().is_empty()).then_some(stderr_tail);

        metrics::histogram!("vflix_ffmpeg_duration_seconds", "operation" => cmd.operation)
            .record(started.elapsed().as_secs_f64());

        let status = status?;
        if !status.success() {
            return Err(MediaError::external_tool(
                "ffmpeg",
                format!("{} while writing {}", status, cmd.output().display()),
                status.code(),
                stderr_tail,
            ));
        }

        verify_output(cmd.output(), stderr_tail).await
    }

    /// Wait for child process, killing it at the deadline.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<ExitStatus> {
        let timeout = self.timeout;
        let deadline = async move {
            match timeout {
                Some(t) => {
                    tokio::time::sleep(t).await;
                    t
                }
                None => std::future::pending().await,
            }
        };

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            t = deadline => Outcome::TimedOut(t),
        };

        match outcome {
            Outcome::Exited(status) => Ok(status?),
            Outcome::TimedOut(t) => {
                warn!("FFmpeg timed out after {:?}, killing process", t);
                let _ = child.kill().await;
                Err(MediaError::Timeout(t.as_secs()))
            }
        }
    }
}

/// Check that a zero exit actually left a populated file behind.
async fn verify_output(output: &Path, stderr: Option<String>) -> MediaResult<()> {
    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        Ok(_) => Err(MediaError::external_tool(
            "ffmpeg",
            format!("produced an empty output file {}", output.display()),
            Some(0),
            stderr,
        )),
        Err(_) => Err(MediaError::external_tool(
            "ffmpeg",
            format!("produced no output file {}", output.display()),
            Some(0),
            stderr,
        )),
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg(program: impl AsRef<Path>) -> MediaResult<PathBuf> {
    let program = program.as_ref();
    which::which(program).map_err(|_| MediaError::ToolNotFound(program.display().to_string()))
}
