//! Local audio output through an `ffplay` child process.
//!
//! A worker thread owns the child and polls it for exit, so completions fire
//! on that thread.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use radio_core::{AudioBackend, AudioHandle, BackendError, Completion};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

enum PlayerCommand {
    Play {
        locator: String,
        on_complete: Completion,
        reply: Sender<Result<(), BackendError>>,
    },
    Stop {
        reply: Sender<Result<(), BackendError>>,
    },
    PauseToggle {
        reply: Sender<Result<(), BackendError>>,
    },
    Quit,
}

struct Running {
    child: Child,
    on_complete: Completion,
    paused: bool,
}

pub struct FfplayBackend {
    cmd_tx: Sender<PlayerCommand>,
    playing: Arc<AtomicBool>,
}

impl FfplayBackend {
    /// Spawn the player worker thread.
    pub fn spawn(program: PathBuf, volume: Option<u8>) -> Self {
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let playing = Arc::new(AtomicBool::new(false));
        let flag = playing.clone();
        std::thread::spawn(move || player_thread_main(program, volume, flag, cmd_rx));
        Self { cmd_tx, playing }
    }

    fn call(
        &self,
        build: impl FnOnce(Sender<Result<(), BackendError>>) -> PlayerCommand,
    ) -> Result<(), BackendError> {
        let (reply, response) = crossbeam_channel::bounded(1);
        self.cmd_tx
            .send(build(reply))
            .map_err(|_| BackendError::Offline)?;
        response.recv().map_err(|_| BackendError::Offline)?
    }
}

impl Drop for FfplayBackend {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(PlayerCommand::Quit);
    }
}

impl AudioBackend for FfplayBackend {
    fn open(&self, locator: &str) -> Result<AudioHandle, BackendError> {
        if is_stream_url(locator) || Path::new(locator).is_file() {
            return Ok(AudioHandle::new(locator));
        }
        Err(BackendError::Open {
            locator: locator.to_string(),
            reason: "not a stream url or readable file".to_string(),
        })
    }

    fn play(&self, handle: AudioHandle, on_complete: Completion) -> Result<(), BackendError> {
        let locator = handle.locator().to_string();
        self.call(|reply| PlayerCommand::Play {
            locator,
            on_complete,
            reply,
        })
    }

    fn stop(&self) -> Result<(), BackendError> {
        self.call(|reply| PlayerCommand::Stop { reply })
    }

    fn pause_toggle(&self) -> Result<(), BackendError> {
        self.call(|reply| PlayerCommand::PauseToggle { reply })
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }
}

fn is_stream_url(locator: &str) -> bool {
    locator.starts_with("http://") || locator.starts_with("https://")
}

fn player_args(volume: Option<u8>, locator: &str) -> Vec<String> {
    let mut args = vec![
        "-nodisp".to_string(),
        "-autoexit".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ];
    if let Some(volume) = volume {
        args.push("-volume".to_string());
        args.push(volume.to_string());
    }
    args.push(locator.to_string());
    args
}

/// Main command loop for the player worker.
fn player_thread_main(
    program: PathBuf,
    volume: Option<u8>,
    playing: Arc<AtomicBool>,
    cmd_rx: Receiver<PlayerCommand>,
) {
    let mut current: Option<Running> = None;

    loop {
        match cmd_rx.recv_timeout(POLL_INTERVAL) {
            Ok(PlayerCommand::Play {
                locator,
                on_complete,
                reply,
            }) => {
                let previous = kill_current(&mut current);
                let spawned = Command::new(&program)
                    .args(player_args(volume, &locator))
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn();
                let result = match spawned {
                    Ok(child) => {
                        debug!(pid = child.id(), locator = %locator, "ffplay started");
                        current = Some(Running {
                            child,
                            on_complete,
                            paused: false,
                        });
                        Ok(())
                    }
                    Err(err) => Err(BackendError::Start(format!(
                        "spawn {}: {err}",
                        program.display()
                    ))),
                };
                playing.store(current.is_some(), Ordering::Relaxed);
                let _ = reply.send(result);
                reap(previous);
            }
            Ok(PlayerCommand::Stop { reply }) => {
                let previous = kill_current(&mut current);
                playing.store(false, Ordering::Relaxed);
                let _ = reply.send(Ok(()));
                reap(previous);
            }
            Ok(PlayerCommand::PauseToggle { reply }) => {
                let result = match current.as_mut() {
                    Some(running) => toggle_pause(running),
                    None => Ok(()),
                };
                let _ = reply.send(result);
            }
            Ok(PlayerCommand::Quit) | Err(RecvTimeoutError::Disconnected) => {
                reap(kill_current(&mut current));
                playing.store(false, Ordering::Relaxed);
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
        if poll_current(&mut current) {
            playing.store(false, Ordering::Relaxed);
        }
    }
}

/// Kill the running child. The caller replies before reaping it.
fn kill_current(current: &mut Option<Running>) -> Option<Running> {
    let mut running = current.take()?;
    if let Err(err) = running.child.kill() {
        debug!(error = %err, "ffplay already exited");
    }
    Some(running)
}

/// Wait for a killed child and fire its completion as a clean stop.
fn reap(killed: Option<Running>) {
    if let Some(mut running) = killed {
        let _ = running.child.wait();
        (running.on_complete)(None);
    }
}

/// Fire the completion if the child exited on its own. Returns true when it did.
fn poll_current(current: &mut Option<Running>) -> bool {
    let status = match current.as_mut().map(|running| running.child.try_wait()) {
        Some(Ok(Some(status))) => Ok(status),
        Some(Ok(None)) | None => return false,
        Some(Err(err)) => Err(err),
    };
    let Some(running) = current.take() else {
        return false;
    };
    let error = match status {
        Ok(status) if status.success() => None,
        Ok(status) => Some(BackendError::Start(format!("ffplay exited with {status}"))),
        Err(err) => Some(BackendError::Start(format!("wait for ffplay: {err}"))),
    };
    if let Some(err) = error.as_ref() {
        warn!(error = %err, "playback ended with an error");
    }
    (running.on_complete)(error);
    true
}

#[cfg(unix)]
fn toggle_pause(running: &mut Running) -> Result<(), BackendError> {
    let signal = if running.paused {
        libc::SIGCONT
    } else {
        libc::SIGSTOP
    };
    let rc = unsafe { libc::kill(running.child.id() as libc::pid_t, signal) };
    if rc != 0 {
        return Err(BackendError::Start(format!(
            "signal ffplay: {}",
            std::io::Error::last_os_error()
        )));
    }
    running.paused = !running.paused;
    Ok(())
}

#[cfg(not(unix))]
fn toggle_pause(_running: &mut Running) -> Result<(), BackendError> {
    Err(BackendError::Unsupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_accepts_urls_and_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("intro.mp3");
        std::fs::write(&file, b"x").unwrap();
        let backend = FfplayBackend::spawn(PathBuf::from("ffplay"), None);

        assert!(backend.open("https://media.test/a").is_ok());
        assert!(backend.open(&file.to_string_lossy()).is_ok());
        assert!(matches!(
            backend.open(&dir.path().join("gone.mp3").to_string_lossy()),
            Err(BackendError::Open { .. })
        ));
    }

    #[test]
    fn args_put_locator_last() {
        assert_eq!(
            player_args(Some(40), "https://media.test/a"),
            vec![
                "-nodisp",
                "-autoexit",
                "-loglevel",
                "error",
                "-volume",
                "40",
                "https://media.test/a"
            ]
        );
    }

    #[test]
    fn missing_program_fails_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FfplayBackend::spawn(dir.path().join("no-such-ffplay"), None);
        let result = backend.play(AudioHandle::new("https://media.test/a"), Box::new(|_| {}));
        assert!(matches!(result, Err(BackendError::Start(_))));
        assert!(!backend.is_playing());
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-ffplay");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn play(backend: &FfplayBackend) -> Receiver<Option<BackendError>> {
            let (tx, rx) = crossbeam_channel::bounded(1);
            backend
                .play(
                    AudioHandle::new("https://media.test/a"),
                    Box::new(move |err| {
                        let _ = tx.send(err);
                    }),
                )
                .unwrap();
            rx
        }

        #[test]
        fn natural_end_fires_completion() {
            let dir = tempfile::tempdir().unwrap();
            let backend = FfplayBackend::spawn(script(dir.path(), "exit 0"), None);
            let done = play(&backend);
            let outcome = done.recv_timeout(Duration::from_secs(5)).unwrap();
            assert!(outcome.is_none());
        }

        #[test]
        fn failing_player_reports_error() {
            let dir = tempfile::tempdir().unwrap();
            let backend = FfplayBackend::spawn(script(dir.path(), "exit 3"), None);
            let done = play(&backend);
            let outcome = done.recv_timeout(Duration::from_secs(5)).unwrap();
            assert!(matches!(outcome, Some(BackendError::Start(_))));
        }

        #[test]
        fn stop_kills_child_and_still_completes() {
            let dir = tempfile::tempdir().unwrap();
            let backend = FfplayBackend::spawn(script(dir.path(), "exec sleep 30"), None);
            let done = play(&backend);
            assert!(backend.is_playing());
            backend.pause_toggle().unwrap();
            backend.pause_toggle().unwrap();

            backend.stop().unwrap();
            let outcome = done.recv_timeout(Duration::from_secs(5)).unwrap();
            assert!(outcome.is_none());
            assert!(!backend.is_playing());
        }

        #[test]
        fn replacing_a_source_completes_the_old_one() {
            let dir = tempfile::tempdir().unwrap();
            let backend = FfplayBackend::spawn(script(dir.path(), "exec sleep 30"), None);
            let first = play(&backend);
            let second = play(&backend);

            assert!(backend.is_playing());
            let outcome = first.recv_timeout(Duration::from_secs(5)).unwrap();
            assert!(outcome.is_none());
            assert!(second.try_recv().is_err());

            backend.stop().unwrap();
            assert!(second.recv_timeout(Duration::from_secs(5)).unwrap().is_none());
        }
    }
}
