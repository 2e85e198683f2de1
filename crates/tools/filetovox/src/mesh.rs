//! Mesh conversion through the external mesh2vox tool
//!
//! Mesh formats are not voxelized in process. The mesh2vox Python script is
//! run as a child process, its output streamed line by line into the log,
//! and the resulting `.vox` file moved to the requested output path.
//!
//! ```text
//! NotStarted → Validating → Running → Succeeded | Failed | Cancelled
//! ```

use crate::log::LogSink;
use crate::options::{absolute, format_output_destination, ConversionOptions};
use crate::types::{ConfigError, ConversionOutcome, MeshError};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::cell::Cell;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How often the supervisor checks for exit and cancellation
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Interpreter used when none is configured and no venv is found
pub const DEFAULT_PYTHON: &str = "python3";

/// Prefix added to every stderr line of the child
pub const STDERR_PREFIX: &str = "[mesh2vox] ";

/// Cooperative cancellation flag shared between a front end and a run
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancel_flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
    }

    /// Check if cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::Relaxed)
    }
}

/// Lifecycle of one mesh conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshStage {
    NotStarted,
    Validating,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl MeshStage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MeshStage::Succeeded | MeshStage::Failed | MeshStage::Cancelled
        )
    }
}

/// Program used to run the script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub program: PathBuf,
    /// Found in a `venv` next to the script
    pub from_venv: bool,
}

/// Pick the interpreter: a venv next to the script wins over the configured one
pub fn resolve_interpreter(script: &Path, configured: Option<&str>) -> Interpreter {
    let dir = script.parent().unwrap_or_else(|| Path::new("."));
    let venv = venv_python(dir);
    if venv.is_file() {
        return Interpreter {
            program: venv,
            from_venv: true,
        };
    }

    let program = configured
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_PYTHON);
    Interpreter {
        program: PathBuf::from(program),
        from_venv: false,
    }
}

#[cfg(windows)]
fn venv_python(dir: &Path) -> PathBuf {
    dir.join("venv").join("Scripts").join("python.exe")
}

#[cfg(not(windows))]
fn venv_python(dir: &Path) -> PathBuf {
    dir.join("venv").join("bin").join("python3")
}

/// One line read from the child
enum StreamLine {
    Stdout(String),
    Stderr(String),
}

/// Runs mesh2vox for one conversion request
pub struct MeshConversionService<'a> {
    options: ConversionOptions,
    log: &'a dyn LogSink,
    stage: Cell<MeshStage>,
}

impl<'a> MeshConversionService<'a> {
    pub fn new(options: ConversionOptions, log: &'a dyn LogSink) -> Self {
        Self {
            options,
            log,
            stage: Cell::new(MeshStage::NotStarted),
        }
    }

    pub fn stage(&self) -> MeshStage {
        self.stage.get()
    }

    fn set_stage(&self, stage: MeshStage) {
        tracing::debug!(from = ?self.stage.get(), to = ?stage, "mesh stage");
        self.stage.set(stage);
    }

    /// Run the conversion to completion, failure or cancellation
    pub fn run(&self, cancel: &CancelToken) -> ConversionOutcome {
        self.set_stage(MeshStage::Validating);

        let outcome = match self.try_run(cancel) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.log.log(&e.to_string());
                if matches!(e, MeshError::ScriptNotFound(_)) {
                    self.log.log(
                        "[ERROR] Please set the mesh2vox.py path in settings (filetovox settings --mesh2vox-script <path>).",
                    );
                }
                ConversionOutcome::failed(e)
            }
        };

        self.set_stage(match &outcome {
            ConversionOutcome::Succeeded { .. } => MeshStage::Succeeded,
            ConversionOutcome::Failed { .. } => MeshStage::Failed,
            ConversionOutcome::Cancelled => MeshStage::Cancelled,
        });
        outcome
    }

    fn try_run(&self, cancel: &CancelToken) -> Result<ConversionOutcome, MeshError> {
        let script = self
            .options
            .mesh2vox_script
            .as_deref()
            .filter(|p| p.is_file())
            .ok_or_else(|| {
                MeshError::ScriptNotFound(
                    self.options
                        .mesh2vox_script
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "(not set)".to_string()),
                )
            })?;

        let input = self.options.input().ok_or(ConfigError::MissingInput)?;
        let output = self.options.output().ok_or(ConfigError::MissingOutput)?;

        let input = absolute(Path::new(input));
        if !input.is_file() {
            return Err(MeshError::InputNotFound(input));
        }

        let output_dir = absolute(Path::new(output))
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        if !output_dir.is_dir() {
            std::fs::create_dir_all(&output_dir).map_err(|source| MeshError::OutputDir {
                path: output_dir.clone(),
                source,
            })?;
        }

        let interpreter = resolve_interpreter(script, self.options.mesh2vox_python.as_deref());
        if interpreter.from_venv {
            self.log.log(&format!(
                "[INFO] Using venv Python: {}",
                interpreter.program.display()
            ));
        } else {
            self.log.log(&format!(
                "[INFO] Using Python: {}",
                interpreter.program.display()
            ));
        }

        let resolution = self.options.mesh_resolution.clamp(1, 256);
        self.log.log(&format!(
            "[INFO] Converting 3D mesh via mesh2vox (resolution={})",
            resolution
        ));
        self.log.log(&format!("[INFO] Input: {}", input.display()));
        self.log.log(&format!("[INFO] Output directory: {}", output_dir.display()));

        let expected = expected_output(&output_dir, &input);
        let desired = absolute(Path::new(&format_output_destination(output)));

        if cancel.is_cancelled() {
            self.log.log("[INFO] mesh2vox process cancelled.");
            return Ok(ConversionOutcome::Cancelled);
        }

        self.set_stage(MeshStage::Running);
        let mut command = Command::new(&interpreter.program);
        command
            .arg(script)
            .arg(&input)
            .arg("--resolution")
            .arg(resolution.to_string())
            .arg("--output-dir")
            .arg(&output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        isolate_process_group(&mut command);

        let mut child = command.spawn().map_err(MeshError::Spawn)?;
        tracing::debug!(pid = child.id(), program = %interpreter.program.display(), "spawned mesh2vox");

        let (tx, rx) = crossbeam_channel::unbounded();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            let tx = tx.clone();
            readers.push(spawn_reader(stdout, move |line| tx.send(StreamLine::Stdout(line))));
        }
        if let Some(stderr) = child.stderr.take() {
            let tx = tx.clone();
            readers.push(spawn_reader(stderr, move |line| tx.send(StreamLine::Stderr(line))));
        }
        drop(tx);

        let status = match self.supervise(&mut child, &rx, cancel) {
            Ok(Some(status)) => status,
            Ok(None) => return Ok(self.abandon(&mut child, &expected, &desired)),
            Err(e) => {
                kill_tree(&mut child);
                return Err(MeshError::Supervise(e));
            }
        };

        // every line is delivered before the exit status is reported; a
        // leftover descendant may still hold the pipes open
        loop {
            if cancel.is_cancelled() {
                return Ok(self.abandon(&mut child, &expected, &desired));
            }
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => self.emit(line),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        for reader in readers {
            if reader.join().is_err() {
                tracing::warn!("mesh2vox output reader panicked");
            }
        }

        match status.code() {
            Some(0) => {}
            Some(code) => return Err(MeshError::ExitCode(code)),
            None => return Err(MeshError::Terminated),
        }

        let output = self.reconcile(&expected, &desired)?;
        self.log.log("[INFO] mesh2vox conversion complete!");
        Ok(ConversionOutcome::Succeeded { output })
    }

    /// Forward output until the child exits (`Some`) or a cancel is seen (`None`)
    fn supervise(
        &self,
        child: &mut Child,
        rx: &Receiver<StreamLine>,
        cancel: &CancelToken,
    ) -> std::io::Result<Option<ExitStatus>> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => self.emit(line),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    // both pipes closed; the exit status follows shortly
                    std::thread::sleep(Duration::from_millis(10));
                }
            }

            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }
        }
    }

    fn emit(&self, line: StreamLine) {
        match line {
            StreamLine::Stdout(line) => self.log.log(&line),
            StreamLine::Stderr(line) => self.log.log(&format!("{}{}", STDERR_PREFIX, line)),
        }
    }

    /// Kill the process tree and remove whatever the run left behind
    fn abandon(&self, child: &mut Child, expected: &Path, desired: &Path) -> ConversionOutcome {
        kill_tree(child);
        for path in [expected, desired] {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove output of cancelled run");
                }
            }
        }
        self.log.log("[INFO] mesh2vox process cancelled.");
        ConversionOutcome::Cancelled
    }

    /// Move mesh2vox's `<stem>.vox` to the requested output path
    fn reconcile(&self, expected: &Path, desired: &Path) -> Result<PathBuf, MeshError> {
        // a file already at the desired path is not proof the tool wrote anything
        if !expected.exists() {
            return Err(MeshError::MissingOutput(expected.to_path_buf()));
        }

        let same = expected
            .to_string_lossy()
            .eq_ignore_ascii_case(&desired.to_string_lossy());
        if same {
            return Ok(expected.to_path_buf());
        }

        if desired.exists() {
            std::fs::remove_file(desired).map_err(|source| MeshError::Rename {
                path: desired.to_path_buf(),
                source,
            })?;
        }
        move_file(expected, desired).map_err(|source| MeshError::Rename {
            path: desired.to_path_buf(),
            source,
        })?;
        self.log
            .log(&format!("[INFO] Output renamed to: {}", desired.display()));
        Ok(desired.to_path_buf())
    }
}

/// `<output_dir>/<input stem>.vox`, where mesh2vox writes its result
pub fn expected_output(output_dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_dir.join(format!("{}.vox", stem))
}

fn spawn_reader<R, F>(stream: R, mut send: F) -> JoinHandle<()>
where
    R: Read + Send + 'static,
    F: FnMut(String) -> Result<(), crossbeam_channel::SendError<StreamLine>> + Send + 'static,
{
    std::thread::spawn(move || {
        for line in BufReader::new(stream).lines() {
            let Ok(line) = line else { break };
            if send(line).is_err() {
                break;
            }
        }
    })
}

fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    // rename fails across filesystems
    std::fs::copy(from, to)?;
    std::fs::remove_file(from)
}

#[cfg(unix)]
fn isolate_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(windows)]
fn isolate_process_group(command: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    command.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(any(unix, windows)))]
fn isolate_process_group(_command: &mut Command) {}

/// Kill the child and everything it spawned
fn kill_tree(child: &mut Child) {
    let pid = child.id();
    if let Err(e) = kill_process_group(pid) {
        tracing::warn!(pid, error = %e, "failed to kill mesh2vox process tree");
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn kill_process_group(pid: u32) -> std::io::Result<()> {
    Command::new("kill")
        .args(["-KILL", "--", &format!("-{}", pid)])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|_| ())
}

#[cfg(windows)]
fn kill_process_group(pid: u32) -> std::io::Result<()> {
    Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|_| ())
}

#[cfg(not(any(unix, windows)))]
fn kill_process_group(_pid: u32) -> std::io::Result<()> {
    Ok(())
}
