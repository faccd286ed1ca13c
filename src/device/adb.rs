use std::{
    io::{self, Read},
    path::PathBuf,
    process::{Command, ExitStatus, Stdio},
    sync::mpsc,
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Result};
use log::{debug, warn};
use thiserror::Error;

use super::{DeviceInput, ScreenCapture};

const INPUT_TIMEOUT: Duration = Duration::from_secs(5);
const SWIPE_TIMEOUT: Duration = Duration::from_secs(10);
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

/// Why one `adb` invocation produced no usable output.
#[derive(Debug, Error)]
pub enum AdbError {
    #[error("failed to launch {binary}: {source}")]
    Launch {
        binary: String,
        #[source]
        source: io::Error,
    },
    #[error("`adb {command}` on {serial} did not finish within {timeout:?}")]
    TimedOut {
        serial: String,
        command: String,
        timeout: Duration,
    },
    #[error("`adb {command}` on {serial} exited with {status}: {stderr}")]
    Exit {
        serial: String,
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("lost the output of `adb {command}` on {serial}: {source}")]
    Io {
        serial: String,
        command: String,
        #[source]
        source: io::Error,
    },
}

/// `adb`-backed device access. Every call is a blocking subprocess.
#[derive(Debug, Clone)]
pub struct AdbClient {
    adb_path: PathBuf,
    fallback_resolution: (u32, u32),
}

impl AdbClient {
    pub fn new(adb_path: impl Into<PathBuf>, fallback_resolution: (u32, u32)) -> Self {
        Self {
            adb_path: adb_path.into(),
            fallback_resolution,
        }
    }

    /// Run `adb -s <serial> <args>` and return its stdout.
    ///
    /// Stdout is read on its own thread (a screencap PNG overflows the pipe
    /// buffer long before adb exits); that read finishing is what the
    /// timeout waits on. Stderr is only kept for the error message.
    pub fn stdout(&self, serial: &str, args: &[&str], timeout: Duration) -> Result<Vec<u8>, AdbError> {
        let command = args.join(" ");
        debug!("adb -s {serial} {command}");
        let io_err = |source| AdbError::Io {
            serial: serial.to_string(),
            command: command.clone(),
            source,
        };

        let mut child = Command::new(&self.adb_path)
            .arg("-s")
            .arg(serial)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| AdbError::Launch {
                binary: self.adb_path.display().to_string(),
                source,
            })?;

        let stderr = child.stderr.take().map(read_all);
        let (stdout_tx, stdout_rx) = mpsc::channel();
        match child.stdout.take() {
            Some(mut pipe) => {
                thread::spawn(move || {
                    let mut buf = Vec::new();
                    let _ = stdout_tx.send(pipe.read_to_end(&mut buf).map(|_| buf));
                });
            }
            None => {
                let _ = stdout_tx.send(Ok(Vec::new()));
            }
        }

        let stdout = match stdout_rx.recv_timeout(timeout) {
            Ok(read) => read.map_err(io_err)?,
            Err(_) => {
                if let Err(err) = child.kill() {
                    debug!("could not kill stalled adb: {err}");
                }
                let _ = child.wait();
                return Err(AdbError::TimedOut {
                    serial: serial.to_string(),
                    command,
                    timeout,
                });
            }
        };
        let status = child.wait().map_err(io_err)?;

        if !status.success() {
            let stderr = stderr
                .and_then(|reader| reader.join().ok())
                .and_then(Result::ok)
                .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
                .unwrap_or_default();
            return Err(AdbError::Exit {
                serial: serial.to_string(),
                command,
                status,
                stderr,
            });
        }
        Ok(stdout)
    }
}

fn read_all(mut pipe: impl Read + Send + 'static) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf).map(|_| buf)
    })
}

impl DeviceInput for AdbClient {
    fn tap(&self, serial: &str, x: i32, y: i32) -> Result<()> {
        let (x, y) = (x.to_string(), y.to_string());
        self.stdout(serial, &["shell", "input", "tap", &x, &y], INPUT_TIMEOUT)?;
        Ok(())
    }

    fn swipe(&self, serial: &str, from: (i32, i32), to: (i32, i32), duration_ms: u64) -> Result<()> {
        let args = [
            from.0.to_string(),
            from.1.to_string(),
            to.0.to_string(),
            to.1.to_string(),
            duration_ms.to_string(),
        ];
        let mut full = vec!["shell", "input", "swipe"];
        full.extend(args.iter().map(String::as_str));
        self.stdout(serial, &full, SWIPE_TIMEOUT)?;
        Ok(())
    }

    fn back(&self, serial: &str) -> Result<()> {
        self.stdout(serial, &["shell", "input", "keyevent", "4"], INPUT_TIMEOUT)?;
        Ok(())
    }

    /// Falls back to the configured resolution when the query fails; a wrong
    /// guess only skews replay scaling, it should not abort the job.
    fn resolution(&self, serial: &str) -> Result<(u32, u32)> {
        let parsed = self
            .stdout(serial, &["shell", "wm", "size"], INPUT_TIMEOUT)
            .map_err(anyhow::Error::from)
            .and_then(|stdout| {
                parse_wm_size(&String::from_utf8_lossy(&stdout))
                    .ok_or_else(|| anyhow!("unrecognised `wm size` output"))
            });

        match parsed {
            Ok(size) => Ok(size),
            Err(err) => {
                warn!(
                    "resolution query failed on {serial}, assuming {}x{}: {err:#}",
                    self.fallback_resolution.0, self.fallback_resolution.1
                );
                Ok(self.fallback_resolution)
            }
        }
    }
}

impl ScreenCapture for AdbClient {
    fn capture(&self, serial: &str) -> Result<Option<Vec<u8>>> {
        let png = self.stdout(serial, &["exec-out", "screencap", "-p"], CAPTURE_TIMEOUT)?;
        Ok(Some(png).filter(|bytes| !bytes.is_empty()))
    }
}

/// Parse `wm size` output (`Physical size: 960x540`) into `(width, height)`.
pub fn parse_wm_size(output: &str) -> Option<(u32, u32)> {
    output
        .lines()
        .find(|line| line.to_ascii_lowercase().contains("size:"))
        .and_then(|line| line.rsplit(':').next())
        .and_then(|dims| {
            let (w, h) = dims.trim().split_once('x')?;
            Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_physical_size() {
        assert_eq!(parse_wm_size("Physical size: 960x540\n"), Some((960, 540)));
        assert_eq!(
            parse_wm_size("Physical size: 1920x1080\r\nOverride size: 1280x720\r\n"),
            Some((1920, 1080))
        );
        assert_eq!(parse_wm_size("error: device offline"), None);
        assert_eq!(parse_wm_size("Physical size: wide"), None);
    }

    #[test]
    fn missing_binary_falls_back_to_configured_resolution() {
        let client = AdbClient::new("/nonexistent/adb-binary", (1280, 720));
        assert_eq!(client.resolution("emulator-5554").unwrap(), (1280, 720));
        assert!(client.tap("emulator-5554", 1, 2).is_err());
        assert!(client.capture("emulator-5554").is_err());
        assert!(matches!(
            client.stdout("emulator-5554", &["shell", "true"], INPUT_TIMEOUT),
            Err(AdbError::Launch { .. })
        ));
    }

    #[cfg(unix)]
    fn fake_adb(dir: &std::path::Path, script: &str) -> AdbClient {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("adb");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        AdbClient::new(path, (960, 540))
    }

    #[cfg(unix)]
    #[test]
    fn reads_stdout_of_a_successful_call() {
        let dir = tempfile::tempdir().unwrap();
        let client = fake_adb(dir.path(), "echo 'Physical size: 1280x720'");
        assert_eq!(client.resolution("emulator-5554").unwrap(), (1280, 720));
    }

    #[cfg(unix)]
    #[test]
    fn failing_call_carries_its_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let client = fake_adb(dir.path(), "echo 'device offline' >&2; exit 1");
        match client.stdout("emulator-5554", &["shell", "input", "tap", "1", "2"], INPUT_TIMEOUT) {
            Err(AdbError::Exit { stderr, command, .. }) => {
                assert_eq!(stderr, "device offline");
                assert_eq!(command, "shell input tap 1 2");
            }
            other => panic!("expected an exit error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn stalled_call_is_killed_at_the_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let client = fake_adb(dir.path(), "exec sleep 5");
        let err = client
            .stdout("emulator-5554", &["exec-out", "screencap", "-p"], Duration::from_millis(100))
            .unwrap_err();
        assert!(matches!(err, AdbError::TimedOut { .. }));
    }
}
