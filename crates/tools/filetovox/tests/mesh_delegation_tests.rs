//! mesh2vox delegation against stand-in scripts
//!
//! The interpreter is `sh` and the "script" is a shell script that receives
//! the same arguments mesh2vox.py would:
//! `<input> --resolution <n> --output-dir <dir>`.

#![cfg(unix)]

use filetovox::{
    convert, CancelToken, ConversionOptions, ConversionOutcome, MemorySink, MeshConversionService,
    MeshStage,
};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

struct Fixture {
    dir: tempfile::TempDir,
    input: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("model.glb");
        std::fs::write(&input, b"glTF").unwrap();
        Self { dir, input }
    }

    fn script(&self, body: &str) -> PathBuf {
        let path = self.dir.path().join("mesh2vox.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        path
    }

    fn out_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    fn cancel_after(&self, delay: Duration) -> (CancelToken, std::thread::JoinHandle<()>) {
        let cancel = CancelToken::new();
        let handle = {
            let cancel = cancel.clone();
            std::thread::spawn(move || {
                std::thread::sleep(delay);
                cancel.cancel();
            })
        };
        (cancel, handle)
    }

    fn options(&self, script: &Path, output: &Path) -> ConversionOptions {
        ConversionOptions {
            mesh2vox_script: Some(script.to_path_buf()),
            mesh2vox_python: Some("sh".to_string()),
            mesh_resolution: 64,
            ..ConversionOptions::new(self.input.to_str().unwrap(), output.to_str().unwrap())
        }
    }
}

#[test]
fn test_output_is_renamed_over_existing_file() {
    let fx = Fixture::new();
    let script = fx.script(r#"echo "voxelizing $1 at $3"; printf 'VOX ' > "$5/model.vox""#);
    std::fs::create_dir_all(fx.out_dir()).unwrap();
    let desired = fx.out_dir().join("renamed.vox");
    std::fs::write(&desired, b"stale").unwrap();

    let sink = MemorySink::new();
    let outcome = convert(fx.options(&script, &desired), &sink, &CancelToken::new());

    assert_eq!(outcome, ConversionOutcome::Succeeded { output: desired.clone() });
    assert_eq!(std::fs::read(&desired).unwrap(), b"VOX ");
    assert!(!fx.out_dir().join("model.vox").exists());
    assert!(sink.contains("[INFO] Converting 3D mesh via mesh2vox (resolution=64)"));
    assert!(sink.contains("at 64"));
    assert!(sink.contains("[INFO] Output renamed to:"));
    assert!(sink.contains("[INFO] mesh2vox conversion complete!"));
}

#[test]
fn test_output_dir_is_created() {
    let fx = Fixture::new();
    let script = fx.script(r#"printf 'VOX ' > "$5/model.vox""#);
    let output = fx.out_dir().join("nested").join("model.vox");

    let sink = MemorySink::new();
    let outcome = convert(fx.options(&script, &output), &sink, &CancelToken::new());

    assert_eq!(outcome, ConversionOutcome::Succeeded { output: output.clone() });
    assert!(!sink.contains("Output renamed"));
}

#[test]
fn test_resolution_is_clamped() {
    let fx = Fixture::new();
    let script = fx.script(r#"echo "resolution $3"; printf 'VOX ' > "$5/model.vox""#);
    let output = fx.out_dir().join("model.vox");

    let sink = MemorySink::new();
    let mut options = fx.options(&script, &output);
    options.mesh_resolution = 9000;
    assert!(convert(options, &sink, &CancelToken::new()).is_success());
    assert!(sink.contains("resolution 256"));
}

#[test]
fn test_stderr_lines_are_prefixed() {
    let fx = Fixture::new();
    let script = fx.script(
        r#"echo "loading mesh" >&2; echo "progress 50%"; printf 'VOX ' > "$5/model.vox""#,
    );
    let output = fx.out_dir().join("model.vox");

    let sink = MemorySink::new();
    assert!(convert(fx.options(&script, &output), &sink, &CancelToken::new()).is_success());
    assert!(sink.lines().iter().any(|l| l == "[mesh2vox] loading mesh"));
    assert!(sink.lines().iter().any(|l| l == "progress 50%"));
}

#[test]
fn test_nonzero_exit_is_reported() {
    let fx = Fixture::new();
    let script = fx.script(r#"echo "bad mesh" >&2; exit 3"#);
    let output = fx.out_dir().join("model.vox");

    let sink = MemorySink::new();
    let outcome = convert(fx.options(&script, &output), &sink, &CancelToken::new());

    assert!(matches!(outcome, ConversionOutcome::Failed { .. }));
    assert!(sink.contains("[ERROR] mesh2vox exited with code 3"));
    assert!(sink.contains("[mesh2vox] bad mesh"));
    assert!(!output.exists());
}

#[test]
fn test_missing_output_fails() {
    let fx = Fixture::new();
    let script = fx.script("echo done");
    let output = fx.out_dir().join("model.vox");

    let sink = MemorySink::new();
    let outcome = convert(fx.options(&script, &output), &sink, &CancelToken::new());

    assert!(matches!(outcome, ConversionOutcome::Failed { .. }));
    assert!(sink.contains("produced no output"));
}

#[test]
fn test_stale_output_is_not_success() {
    let fx = Fixture::new();
    let script = fx.script("echo did nothing");
    std::fs::create_dir_all(fx.out_dir()).unwrap();
    let desired = fx.out_dir().join("renamed.vox");
    std::fs::write(&desired, b"stale from last run").unwrap();

    let sink = MemorySink::new();
    let outcome = convert(fx.options(&script, &desired), &sink, &CancelToken::new());

    assert!(matches!(outcome, ConversionOutcome::Failed { .. }), "{:?}", outcome);
    assert!(sink.contains("produced no output"));
    assert!(!sink.contains("conversion complete"));
}

#[test]
fn test_missing_input_spawns_nothing() {
    let fx = Fixture::new();
    let marker = fx.dir.path().join("ran");
    let script = fx.script(&format!("touch '{}'", marker.display()));
    let output = fx.out_dir().join("model.vox");

    let mut options = fx.options(&script, &output);
    options.input_path = Some(fx.dir.path().join("absent.glb").to_string_lossy().into_owned());

    let sink = MemorySink::new();
    let outcome = convert(options, &sink, &CancelToken::new());

    assert!(matches!(outcome, ConversionOutcome::Failed { .. }));
    assert!(sink.contains("[ERROR] Input file not found:"));
    assert!(!marker.exists());
}

#[test]
fn test_cancel_kills_process_and_removes_partial_output() {
    let fx = Fixture::new();
    let script = fx.script(r#"printf 'partial' > "$5/model.vox"; echo started; sleep 30"#);
    std::fs::create_dir_all(fx.out_dir()).unwrap();
    let output = fx.out_dir().join("model.vox");

    let (cancel, canceller) = fx.cancel_after(Duration::from_millis(500));
    let sink = MemorySink::new();
    let started = Instant::now();
    let outcome = convert(fx.options(&script, &output), &sink, &cancel);
    canceller.join().unwrap();

    assert_eq!(outcome, ConversionOutcome::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(sink.contains("[INFO] mesh2vox process cancelled."));
    assert!(!output.exists());
}

/// Gone from /proc or left as a zombie
#[cfg(target_os = "linux")]
fn is_dead(pid: &str) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/status", pid)) {
        Err(_) => true,
        Ok(status) => status
            .lines()
            .any(|l| l.starts_with("State:") && l.contains('Z')),
    }
}

#[cfg(target_os = "linux")]
#[test]
fn test_cancel_kills_descendants() {
    let fx = Fixture::new();
    let pidfile = fx.dir.path().join("sleeper.pid");
    let script = fx.script(&format!(
        "sleep 60 &\necho $! > '{}'\necho started\nwait",
        pidfile.display()
    ));
    let output = fx.out_dir().join("model.vox");

    let (cancel, canceller) = fx.cancel_after(Duration::from_millis(500));
    let sink = MemorySink::new();
    let outcome = convert(fx.options(&script, &output), &sink, &cancel);
    canceller.join().unwrap();
    assert_eq!(outcome, ConversionOutcome::Cancelled);

    let pid = std::fs::read_to_string(&pidfile).unwrap().trim().to_string();
    assert!(!pid.is_empty());
    let deadline = Instant::now() + Duration::from_secs(5);
    while !is_dead(&pid) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(is_dead(&pid), "sleep {} survived the cancel", pid);
}

#[test]
fn test_cancel_while_descendant_holds_output_open() {
    let fx = Fixture::new();
    // the script exits at once, its background sleep keeps stdout open
    let script = fx.script(r#"sleep 60 & echo started; exit 0"#);
    let output = fx.out_dir().join("model.vox");

    let (cancel, canceller) = fx.cancel_after(Duration::from_millis(500));
    let sink = MemorySink::new();
    let started = Instant::now();
    let outcome = convert(fx.options(&script, &output), &sink, &cancel);
    canceller.join().unwrap();

    assert_eq!(outcome, ConversionOutcome::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(sink.contains("started"));
}

#[test]
fn test_cancel_removes_stale_desired_output() {
    let fx = Fixture::new();
    let script = fx.script(r#"printf 'partial' > "$5/model.vox"; sleep 30"#);
    std::fs::create_dir_all(fx.out_dir()).unwrap();
    let desired = fx.out_dir().join("renamed.vox");
    std::fs::write(&desired, b"stale from last run").unwrap();

    let (cancel, canceller) = fx.cancel_after(Duration::from_millis(500));
    let sink = MemorySink::new();
    let outcome = convert(fx.options(&script, &desired), &sink, &cancel);
    canceller.join().unwrap();

    assert_eq!(outcome, ConversionOutcome::Cancelled);
    assert!(!desired.exists());
    assert!(!fx.out_dir().join("model.vox").exists());
}

#[test]
fn test_stage_transitions() {
    let fx = Fixture::new();
    let script = fx.script(r#"printf 'VOX ' > "$5/model.vox""#);
    let output = fx.out_dir().join("model.vox");

    let sink = MemorySink::new();
    let service = MeshConversionService::new(fx.options(&script, &output), &sink);
    assert_eq!(service.stage(), MeshStage::NotStarted);

    let outcome = service.run(&CancelToken::new());
    assert!(outcome.is_success());
    assert_eq!(service.stage(), MeshStage::Succeeded);
    assert!(service.stage().is_terminal());

    let cancelled = CancelToken::new();
    cancelled.cancel();
    let service = MeshConversionService::new(fx.options(&script, &output), &sink);
    assert_eq!(service.run(&cancelled), ConversionOutcome::Cancelled);
    assert_eq!(service.stage(), MeshStage::Cancelled);
}
