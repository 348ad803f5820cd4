//! Host side of the `write`/`read` syscalls and of the execution trace.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use crate::vm::TraceRecord;

/// Output stream selected by a `write` syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
  Stdout,
  Stderr,
}

impl Stream {
  /// fd 2 is stderr, every other value is stdout.
  pub fn from_fd(fd: u32) -> Self {
    if fd == 2 {
      Self::Stderr
    } else {
      Self::Stdout
    }
  }
}

/// Everything the virtual machine can observe of the outside world.
pub trait Console {
  fn write(&mut self, stream: Stream, bytes: &[u8]) -> io::Result<()>;

  /// Fill `buf` from standard input, stopping early only at end of input.
  /// Returns the number of bytes read.
  fn read(&mut self, buf: &mut [u8]) -> usize;

  fn trace(&mut self, record: &TraceRecord);
}

/// The process's own stdin, stdout and stderr. Trace records go to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdConsole;

impl Console for StdConsole {
  fn write(&mut self, stream: Stream, bytes: &[u8]) -> io::Result<()> {
    match stream {
      Stream::Stdout => {
        let mut out = io::stdout().lock();
        out.write_all(bytes)?;
        out.flush()
      }
      Stream::Stderr => {
        let mut err = io::stderr().lock();
        err.write_all(bytes)?;
        err.flush()
      }
    }
  }

  fn read(&mut self, buf: &mut [u8]) -> usize {
    let mut input = io::stdin().lock();
    let mut filled = 0;
    while filled < buf.len() {
      match input.read(&mut buf[filled..]) {
        Ok(0) => break,
        Ok(n) => filled += n,
        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
        Err(e) => {
          tracing::warn!(error = %e, "stdin read failed, treating as end of input");
          break;
        }
      }
    }
    filled
  }

  fn trace(&mut self, record: &TraceRecord) {
    println!("{record}");
  }
}

/// An in-memory console: scripted input, captured output and traces.
#[derive(Debug, Default, Clone)]
pub struct BufferConsole {
  pub input: VecDeque<u8>,
  pub stdout: Vec<u8>,
  pub stderr: Vec<u8>,
  pub traces: Vec<TraceRecord>,
}

impl BufferConsole {
  pub fn with_input(input: impl AsRef<[u8]>) -> Self {
    Self {
      input: input.as_ref().iter().copied().collect(),
      ..Self::default()
    }
  }
}

impl Console for BufferConsole {
  fn write(&mut self, stream: Stream, bytes: &[u8]) -> io::Result<()> {
    match stream {
      Stream::Stdout => self.stdout.extend_from_slice(bytes),
      Stream::Stderr => self.stderr.extend_from_slice(bytes),
    }
    Ok(())
  }

  fn read(&mut self, buf: &mut [u8]) -> usize {
    let count = buf.len().min(self.input.len());
    for (slot, byte) in buf.iter_mut().zip(self.input.drain(..count)) {
      *slot = byte;
    }
    count
  }

  fn trace(&mut self, record: &TraceRecord) {
    self.traces.push(*record);
  }
}
