//! Worker process tests against the real daemon binary
//!
//! A regular file stands in for the gadget node: it is always writable and
//! keeps every report written to it.

use common::test_utils::wait_until;
use otg::{Keyboard, Mouse, WorkerHandle};
use protocol::{
    DeviceKind, KeyboardEvent, MouseEvent, ProtocolVersion, StartRequest, WorkerSpec,
    write_framed,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tempfile::tempdir;

const DAEMON: &str = env!("CARGO_BIN_EXE_kvmd-otg-hid");
const WAIT: Duration = Duration::from_secs(10);

fn spec(kind: DeviceKind, device_path: PathBuf) -> WorkerSpec {
    WorkerSpec {
        name: kind.as_str().to_string(),
        kind,
        device_path,
        read_chunk_size: 0,
        select_timeout: Duration::from_millis(20),
        queue_timeout: Duration::from_millis(20),
        write_retries: 5,
        noop: false,
        // No such controller: link state is unknown and never blocks I/O
        udc: Some("kvmd-otg-hid-test-udc".to_string()),
        log_level: "debug".to_string(),
        error_backoff: Duration::from_millis(100),
    }
}

fn device_file(dir: &Path) -> PathBuf {
    let path = dir.join("hidg0");
    fs::write(&path, b"").unwrap();
    path
}

fn file_len(path: &Path) -> usize {
    fs::metadata(path).map(|m| m.len() as usize).unwrap_or(0)
}

#[test]
fn keyboard_reports_reach_the_device_and_flush_releases_keys() {
    let dir = tempdir().unwrap();
    let path = device_file(dir.path());
    let handle: WorkerHandle<Keyboard> =
        WorkerHandle::spawn(DAEMON, spec(DeviceKind::Keyboard, path.clone())).unwrap();

    handle.push(KeyboardEvent::Key {
        code: 0xE1,
        pressed: true,
    });
    handle.push(KeyboardEvent::Key {
        code: 0x04,
        pressed: true,
    });
    assert!(wait_until(WAIT, || file_len(&path) == 16));
    assert!(handle.state().online);

    let stopped = handle.stop().unwrap();
    assert!(stopped.exit_status().success());
    assert!(stopped.flush());

    let written = fs::read(&path).unwrap();
    assert_eq!(
        written,
        [
            [0x02, 0, 0, 0, 0, 0, 0, 0],
            [0x02, 0, 0x04, 0, 0, 0, 0, 0],
            [0u8; 8],
        ]
        .concat()
    );
}

#[test]
fn relative_mouse_motion_is_split() {
    let dir = tempdir().unwrap();
    let path = device_file(dir.path());
    let kind = DeviceKind::Mouse {
        absolute: false,
        horizontal_wheel: false,
    };
    let handle: WorkerHandle<Mouse> = WorkerHandle::spawn(DAEMON, spec(kind, path.clone())).unwrap();

    handle.push(MouseEvent::MoveRelative { dx: 300, dy: 0 });
    assert!(wait_until(WAIT, || file_len(&path) == 12));

    let stopped = handle.stop().unwrap();
    assert!(!stopped.last_state().device.horizontal_wheel);
    let written = fs::read(&path).unwrap();
    assert_eq!(written, vec![0, 127, 0, 0, 0, 127, 0, 0, 0, 46, 0, 0]);
}

#[test]
fn missing_device_goes_offline() {
    let dir = tempdir().unwrap();
    let handle: WorkerHandle<Keyboard> =
        WorkerHandle::spawn(DAEMON, spec(DeviceKind::Keyboard, dir.path().join("hidg0")))
            .unwrap();

    assert!(wait_until(WAIT, || !handle.state().online));

    // The node appears: the next event reopens it and the worker comes back
    let path = device_file(dir.path());
    handle.push(KeyboardEvent::ReleaseAll);
    assert!(wait_until(WAIT, || handle.state().online));
    assert_eq!(file_len(&path), 8);

    handle.stop().unwrap();
}

#[test]
fn noop_worker_never_touches_the_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing").join("hidg0");
    let mut worker_spec = spec(DeviceKind::Keyboard, path.clone());
    worker_spec.noop = true;
    let mut handle: WorkerHandle<Keyboard> = WorkerHandle::spawn(DAEMON, worker_spec).unwrap();

    handle.push(KeyboardEvent::Key {
        code: 0x04,
        pressed: true,
    });
    handle.clear_queue();
    std::thread::sleep(Duration::from_millis(100));
    assert!(handle.is_running());
    assert!(handle.state().online);

    let stopped = handle.stop().unwrap();
    assert!(stopped.flush());
    assert!(!path.exists());
}

#[test]
fn dropping_the_handle_kills_the_worker() {
    let dir = tempdir().unwrap();
    let path = device_file(dir.path());
    let handle: WorkerHandle<Keyboard> =
        WorkerHandle::spawn(DAEMON, spec(DeviceKind::Keyboard, path)).unwrap();
    let watcher = handle.watcher();
    assert!(watcher.snapshot().online);

    drop(handle);
    // The status stream ends with the process
    assert!(wait_until(WAIT, || !watcher.snapshot().online));
}

#[test]
fn incompatible_controller_is_rejected() {
    let dir = tempdir().unwrap();
    let mut child = Command::new(DAEMON)
        .arg("worker")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let mut stdin = child.stdin.take().unwrap();
    write_framed(
        &mut stdin,
        &StartRequest {
            version: ProtocolVersion {
                major: 99,
                minor: 0,
                patch: 0,
            },
            spec: spec(DeviceKind::Keyboard, device_file(dir.path())),
        },
    )
    .unwrap();
    drop(stdin);

    let status = child.wait().unwrap();
    assert!(!status.success());
}

#[test]
fn wrong_codec_for_kind_is_refused() {
    let dir = tempdir().unwrap();
    let result: common::Result<WorkerHandle<Mouse>> =
        WorkerHandle::spawn(DAEMON, spec(DeviceKind::Keyboard, device_file(dir.path())));
    assert!(result.is_err());
}
