//! Subprocess backend
//!
//! Blocking invocations drain stdout/stderr on helper threads while the caller
//! polls for exit, so a wedged engine can be killed once the timeout passes.
//! Streaming invocations push stdout lines through a bounded channel.

use crate::backend::{EngineBackend, EngineRequest, LineStream, RawOutput, StreamPoll};
use crate::command::EngineCommand;
use crate::error::EngineError;
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const PROCESS_POLL_MS: u64 = 50;
/// Lines buffered between the stdout reader and the consumer
const LINE_QUEUE_DEPTH: usize = 256;

/// Runs the engine as a child process
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    command: EngineCommand,
    poll_interval: Duration,
}

impl ProcessBackend {
    pub fn new(command: EngineCommand) -> Self {
        Self {
            command,
            poll_interval: Duration::from_millis(PROCESS_POLL_MS),
        }
    }

    pub fn command(&self) -> &EngineCommand {
        &self.command
    }

    fn spawn(&self, request: &EngineRequest) -> Result<Child, EngineError> {
        let mut command = self.command.build(request);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        log::debug!("Engine command: {:?}", command);

        command.spawn().map_err(|source| EngineError::Spawn {
            program: self.command.program().to_string(),
            source,
        })
    }
}

impl EngineBackend for ProcessBackend {
    fn execute(
        &self,
        request: &EngineRequest,
        timeout: Option<Duration>,
    ) -> Result<RawOutput, EngineError> {
        let mut child = self.spawn(request)?;
        let stdout = spawn_collector(child.stdout.take());
        let stderr = spawn_collector(child.stderr.take());
        let start = Instant::now();

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if let Some(limit) = timeout {
                if start.elapsed() >= limit {
                    let _ = child.kill();
                    let _ = child.wait();
                    log::warn!(
                        "Engine `{}` (pid {}) exceeded {}s, killed",
                        request.op,
                        child.id(),
                        limit.as_secs()
                    );
                    return Err(EngineError::Timeout {
                        op: request.op.to_string(),
                        seconds: limit.as_secs(),
                    });
                }
            }
            thread::sleep(self.poll_interval);
        };

        Ok(RawOutput {
            stdout: join_collector(stdout),
            stderr: join_collector(stderr),
            success: status.success(),
            status: status.to_string(),
        })
    }

    fn stream(&self, request: &EngineRequest) -> Result<Box<dyn LineStream>, EngineError> {
        let mut child = self.spawn(request)?;
        let stderr = spawn_collector(child.stderr.take());
        let stdout = child.stdout.take();

        let (tx, rx) = mpsc::sync_channel(LINE_QUEUE_DEPTH);
        if let Some(pipe) = stdout {
            thread::spawn(move || {
                let mut reader = BufReader::new(pipe);
                let mut buf = Vec::new();
                loop {
                    buf.clear();
                    match reader.read_until(b'\n', &mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {
                            let line = String::from_utf8_lossy(&buf)
                                .trim_end_matches(['\r', '\n'])
                                .to_string();
                            if tx.send(line).is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }

        Ok(Box::new(ProcessStream {
            child,
            lines: rx,
            stderr,
            exit: None,
        }))
    }
}

fn spawn_collector<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut bytes = Vec::new();
            let _ = pipe.read_to_end(&mut bytes);
            String::from_utf8_lossy(&bytes).into_owned()
        })
    })
}

fn join_collector(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

struct ProcessStream {
    child: Child,
    lines: Receiver<String>,
    stderr: Option<JoinHandle<String>>,
    exit: Option<ExitStatus>,
}

impl LineStream for ProcessStream {
    fn poll_line(&mut self, wait: Duration) -> StreamPoll {
        match self.lines.recv_timeout(wait) {
            Ok(line) => StreamPoll::Line(line),
            Err(RecvTimeoutError::Timeout) => StreamPoll::Idle,
            Err(RecvTimeoutError::Disconnected) => StreamPoll::Closed,
        }
    }

    fn terminate(&mut self) -> Result<(), EngineError> {
        if self.exit.is_some() {
            return Ok(());
        }
        if self.child.try_wait()?.is_none() {
            log::debug!("Stopping engine stream (pid {})", self.child.id());
            // The process may exit between the check and the kill.
            let _ = self.child.kill();
        }
        self.exit = Some(self.child.wait()?);
        Ok(())
    }

    fn finish(&mut self) -> Result<RawOutput, EngineError> {
        let status = match self.exit {
            Some(status) => status,
            None => {
                let status = self.child.wait()?;
                self.exit = Some(status);
                status
            }
        };
        Ok(RawOutput {
            stdout: String::new(),
            stderr: join_collector(self.stderr.take()),
            success: status.success(),
            status: status.to_string(),
        })
    }
}

impl Drop for ProcessStream {
    fn drop(&mut self) {
        if self.exit.is_none() {
            let _ = self.terminate();
        }
    }
}
