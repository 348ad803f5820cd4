//! Classification of a single source line. Both assembler passes go through
//! [`parse`], so operand kinds and per-opcode rules can never disagree
//! between sizing and encoding.

use super::error::{AsmError, AsmErrorKind};
use crate::opcode::{Mode, Opcode, OperandType};
use crate::preprocess::SourceLine;
use crate::register::Register;

const MAIN_MARKER: &str = "_main:";
const DATA_MARKER: &str = "_data:";
const LABEL_SUFFIX: char = ':';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
  None,
  Main,
  Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand<'src> {
  Register(Register),
  /// A literal or a symbol reference, resolved during encoding.
  Immediate(&'src str),
  /// The address expression between the brackets of `[expr]`.
  Memory(&'src str),
}

impl<'src> Operand<'src> {
  pub fn classify(token: &'src str) -> Self {
    let token = token.trim();
    if let Some(reg) = Register::parse(token) {
      return Self::Register(reg);
    }
    match token
      .strip_prefix('[')
      .and_then(|rest| rest.strip_suffix(']'))
    {
      Some(inner) => Self::Memory(inner.trim()),
      None => Self::Immediate(token),
    }
  }

  pub fn ty(&self) -> OperandType {
    match self {
      Self::Register(_) => OperandType::Reg,
      Self::Immediate(_) => OperandType::Imm,
      Self::Memory(_) => OperandType::Mem,
    }
  }
}

/// An instruction whose operand kinds satisfy its opcode's rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction<'src> {
  pub op: Opcode,
  pub dst: Option<Operand<'src>>,
  pub src: Option<Operand<'src>>,
}

impl Instruction<'_> {
  fn operand_type(operand: Option<&Operand<'_>>) -> OperandType {
    operand.map_or(OperandType::None, Operand::ty)
  }

  /// The mode byte, absent for `nop` and `syscall`.
  pub fn mode(&self) -> Option<Mode> {
    let src = Self::operand_type(self.src.as_ref());
    if self.op.is_bare() {
      None
    } else if self.op.is_branch() {
      Some(Mode::branch(src))
    } else {
      Some(Mode::new(Self::operand_type(self.dst.as_ref()), src))
    }
  }

  /// Encoded size in bytes.
  pub fn size(&self) -> u32 {
    match self.mode() {
      None => 1,
      Some(_) => {
        2 + Self::operand_type(self.dst.as_ref()).encoded_size()
          + Self::operand_type(self.src.as_ref()).encoded_size()
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement<'src> {
  Section(Section),
  Label(&'src str),
  Instruction(Instruction<'src>),
  Declaration { name: &'src str, size: u32 },
}

/// Classify `line` as it appears inside `section`.
pub fn parse<'src>(line: &SourceLine<'src>, section: Section) -> Result<Statement<'src>, AsmError> {
  let text = line.text;
  let fail = |kind| AsmError::new(line.number, kind);

  match text {
    MAIN_MARKER => return Ok(Statement::Section(Section::Main)),
    DATA_MARKER => return Ok(Statement::Section(Section::Data)),
    _ => {}
  }

  match section {
    Section::None => Err(fail(AsmErrorKind::OutsideSection)),
    Section::Main => match text.strip_suffix(LABEL_SUFFIX) {
      Some(label) => {
        let label = label.trim();
        if label.is_empty() {
          return Err(fail(AsmErrorKind::EmptyLabel));
        }
        Ok(Statement::Label(label))
      }
      None => parse_instruction(text)
        .map(Statement::Instruction)
        .map_err(fail),
    },
    Section::Data => parse_declaration(text)
      .map(|(name, size)| Statement::Declaration { name, size })
      .map_err(fail),
  }
}

fn parse_instruction(text: &str) -> Result<Instruction<'_>, AsmErrorKind> {
  let (mnemonic, tail) = match text.split_once(|c: char| c == ' ' || c == '\t') {
    Some((mnemonic, tail)) => (mnemonic, tail.trim()),
    None => (text, ""),
  };
  let op = Opcode::from_mnemonic(mnemonic)
    .ok_or_else(|| AsmErrorKind::UnknownOpcode(mnemonic.to_string()))?;

  // a single trailing comma is tolerated
  let operands: Vec<Operand<'_>> = if tail.is_empty() {
    Vec::new()
  } else {
    let tail = tail.strip_suffix(',').unwrap_or(tail);
    tail.split(',').map(Operand::classify).collect()
  };

  let expect = |expected: usize| {
    if operands.len() == expected {
      Ok(())
    } else {
      Err(AsmErrorKind::OperandCount {
        op,
        expected,
        found: operands.len(),
      })
    }
  };

  if op.is_bare() {
    expect(0)?;
    return Ok(Instruction {
      op,
      dst: None,
      src: None,
    });
  }

  if op.is_branch() {
    expect(1)?;
    let target = operands[0];
    if target.ty() == OperandType::Mem {
      return Err(AsmErrorKind::BranchToMemory);
    }
    return Ok(Instruction {
      op,
      dst: None,
      src: Some(target),
    });
  }

  expect(2)?;
  let (dst, src) = (operands[0], operands[1]);
  match (op, dst.ty(), src.ty()) {
    (Opcode::Cmp, OperandType::Reg, _) => {}
    (Opcode::Cmp, _, _) => return Err(AsmErrorKind::CompareLhs),
    (Opcode::Mov, OperandType::Mem, OperandType::Mem) => {
      return Err(AsmErrorKind::MoveMemoryToMemory)
    }
    (Opcode::Mov, OperandType::Reg | OperandType::Mem, _) => {}
    (Opcode::Mov, _, _) => return Err(AsmErrorKind::MoveDestination),
    (_, OperandType::Reg, _) => {}
    _ => return Err(AsmErrorKind::ArithmeticDestination(op)),
  }
  Ok(Instruction {
    op,
    dst: Some(dst),
    src: Some(src),
  })
}

/// `DB name[size]`
fn parse_declaration(text: &str) -> Result<(&str, u32), AsmErrorKind> {
  let rest = match text.split_once(|c: char| c.is_ascii_whitespace()) {
    Some((keyword, rest)) if keyword.eq_ignore_ascii_case("db") => rest.trim(),
    _ => return Err(AsmErrorKind::NotADeclaration),
  };

  let (name, size) = rest
    .strip_suffix(']')
    .and_then(|body| body.split_once('['))
    .ok_or(AsmErrorKind::MalformedDeclaration)?;
  let (name, size) = (name.trim(), size.trim());
  if size.is_empty() || size.contains(['[', ']']) {
    return Err(AsmErrorKind::MalformedDeclaration);
  }
  if name.is_empty() {
    return Err(AsmErrorKind::MissingName);
  }
  let size = parse_number(size).ok_or_else(|| AsmErrorKind::InvalidSize(size.to_string()))?;
  Ok((name, size))
}

/// Decimal (optionally negative, wrapping to 32 bits) or `0x`-prefixed
/// hexadecimal. Wider values keep their low 32 bits.
pub fn parse_number(token: &str) -> Option<u32> {
  let token = token.trim();
  let hex = token
    .strip_prefix("0x")
    .or_else(|| token.strip_prefix("0X"));
  match hex {
    Some(digits) => u64::from_str_radix(digits, 16).ok().map(|v| v as u32),
    None => token.parse::<i64>().ok().map(|v| v as u32),
  }
}
