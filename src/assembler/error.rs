use std::io;
use std::path::PathBuf;

use crate::opcode::Opcode;

/// The first structural problem found in a source, with its 1-based line.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at line {line}")]
pub struct AsmError {
  pub line: usize,
  pub kind: AsmErrorKind,
}

impl AsmError {
  pub fn new(line: usize, kind: AsmErrorKind) -> Self {
    Self { line, kind }
  }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AsmErrorKind {
  #[error("content outside of any section")]
  OutsideSection,

  #[error("empty label")]
  EmptyLabel,

  #[error("duplicate label '{0}'")]
  DuplicateLabel(String),

  #[error("unknown opcode '{0}'")]
  UnknownOpcode(String),

  #[error("{op} takes {expected} operand(s), found {found}")]
  OperandCount {
    op: Opcode,
    expected: usize,
    found: usize,
  },

  #[error("branch target cannot be [mem]")]
  BranchToMemory,

  #[error("cmp lhs must be a register")]
  CompareLhs,

  #[error("mov dst must be a register or [mem]")]
  MoveDestination,

  #[error("mov [mem], [mem] is not allowed")]
  MoveMemoryToMemory,

  #[error("{0} dst must be a register")]
  ArithmeticDestination(Opcode),

  #[error("only DB declarations are allowed in _data")]
  NotADeclaration,

  #[error("malformed DB declaration")]
  MalformedDeclaration,

  #[error("DB declaration is missing a name")]
  MissingName,

  #[error("DB size must be a number, found '{0}'")]
  InvalidSize(String),

  #[error("duplicate DB name '{0}'")]
  DuplicateBuffer(String),

  #[error("data section exceeds 4 GiB")]
  DataTooLarge,

  #[error("code section exceeds 4 GiB")]
  CodeTooLarge,

  #[error("unknown symbol '{0}'")]
  UnknownSymbol(String),
}

/// Failure of [`assemble_file`](super::assemble_file).
#[derive(thiserror::Error, Debug)]
pub enum Error {
  #[error("cannot open source file {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Asm(#[from] AsmError),
}
