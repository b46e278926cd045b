use std::io::{BufRead, BufReader, Read};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use super::{CmdOutput, ExecError, ExecOptions};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Exit code reported for a process killed by a signal.
const SIGNALLED: i32 = -1;

fn collect<R: Read>(reader: R, host: &str, stream: bool) -> std::io::Result<String> {
    let mut buf = String::new();
    for line in BufReader::new(reader).lines() {
        let line = line?;
        if stream {
            tracing::info!(host, "{}", line);
        }
        buf.push_str(&line);
        buf.push('\n');
    }
    Ok(buf)
}

/// Kills the whole process group of `child`. Anything the shell forked
/// holds the output pipes open, so killing `sh` alone leaves the readers
/// waiting.
fn kill_group(child: &mut Child) {
    let pgid = Pid::from_raw(child.id() as i32);
    if let Err(errno) = signal::killpg(pgid, Signal::SIGKILL) {
        tracing::warn!(pid = child.id(), %errno, "failed to kill process group");
        let _ = child.kill();
    }
    let _ = child.wait();
}

/// Spawns `command`, drains its output and waits for it, killing the
/// process once `opts.timeout` has elapsed.
pub(super) fn run(
    host: &str,
    display: &str,
    mut command: Command,
    opts: &ExecOptions,
) -> Result<CmdOutput, ExecError> {
    let io_err = |source| ExecError::Io {
        host: host.to_owned(),
        cmd: display.to_owned(),
        source,
    };

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
        .map_err(|source| ExecError::Spawn {
            host: host.to_owned(),
            cmd: display.to_owned(),
            source,
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let started = Instant::now();

    let (status, out, err) = crossbeam::thread::scope(|s| {
        let out_handle = s.spawn(|_| match stdout {
            Some(r) => collect(r, host, opts.long_running),
            None => Ok(String::new()),
        });
        let err_handle = s.spawn(|_| match stderr {
            Some(r) => collect(r, host, opts.long_running),
            None => Ok(String::new()),
        });

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Ok(Some(status)),
                Ok(None) => {}
                Err(e) => break Err(e),
            }
            if let Some(timeout) = opts.timeout {
                if started.elapsed() >= timeout {
                    kill_group(&mut child);
                    break Ok(None);
                }
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let out = out_handle.join().unwrap_or_else(|_| Ok(String::new()));
        let err = err_handle.join().unwrap_or_else(|_| Ok(String::new()));
        (status, out, err)
    })
    .map_err(|_| {
        io_err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "output reader panicked",
        ))
    })?;

    let status = status.map_err(io_err)?;
    let Some(status) = status else {
        return Err(ExecError::Timeout {
            host: host.to_owned(),
            cmd: display.to_owned(),
            timeout: opts.timeout.unwrap_or_default(),
        });
    };

    Ok(CmdOutput {
        stdout: out.map_err(io_err)?,
        stderr: err.map_err(io_err)?,
        exit_code: status.code().unwrap_or(SIGNALLED),
    })
}
