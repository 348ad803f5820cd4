//! Two-pass assembler for ByteCraft assembly.
//!
//! ```text
//! _main:
//!   mov r1, 1        ; SC_WRITE
//!   mov r2, 1        ; stdout
//!   mov r3, msg
//!   mov r4, 4
//!   syscall
//! loop:
//!   jmp loop
//!
//! _data:
//!   DB msg[4]        # zero-initialized
//! ```
//!
//! - `_main:` holds instructions and `label:` declarations, `_data:` holds
//!   `DB name[size]` buffers laid out right after the code.
//! - Operands are registers (`r1`..`r8`, `ip`, `rf`, `rs`), immediates
//!   (decimal, `0x` hex, or a symbol) and memory operands `[symbol]` /
//!   `[address]`.
//! - Encoding is `[op:1][mode:1][operands...]`, where the mode byte packs the
//!   destination type in its high nibble and the source type in its low
//!   nibble. Registers take one byte, immediates and addresses four
//!   (little-endian). `nop` and `syscall` are a lone opcode byte.
//!
//! The first pass sizes everything and binds symbols, the second resolves
//! them. Assembly stops at the first error.

mod encode;
mod error;
mod layout;
mod statement;

use std::fs;
use std::path::Path;

pub use error::{AsmError, AsmErrorKind, Error};

use crate::preprocess::{self, SourceLine};
use crate::region::Module;

/// Every module starts executing at its first code byte.
pub const ENTRY_POINT: u32 = 0;

/// Assemble source text into a [`Module`].
pub fn assemble(source: &str) -> Result<Module, AsmError> {
  let lines: Vec<SourceLine<'_>> = preprocess::lines(source).collect();

  let layout = layout::layout(&lines)?;
  if !layout.has_main {
    tracing::warn!("source has no _main: section, module will contain no code");
  }
  tracing::debug!(
    code_size = layout.code_size,
    data_size = layout.data.len(),
    labels = layout.code_symbols.len(),
    buffers = layout.data_symbols.len(),
    "layout complete"
  );

  let code = encode::encode(&lines, &layout)?;
  Ok(Module::new(ENTRY_POINT, code, layout.data))
}

/// Read a whole file and [`assemble`] it.
pub fn assemble_file(path: impl AsRef<Path>) -> Result<Module, Error> {
  let path = path.as_ref();
  let source = fs::read_to_string(path).map_err(|source| Error::Io {
    path: path.to_path_buf(),
    source,
  })?;
  tracing::debug!(path = %path.display(), "assembling");
  Ok(assemble(&source)?)
}
