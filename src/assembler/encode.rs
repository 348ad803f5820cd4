//! Second pass: resolves symbols and emits the instruction stream.

use super::error::{AsmError, AsmErrorKind};
use super::layout::Layout;
use super::statement::{self, Instruction, Operand, Section, Statement};
use crate::preprocess::SourceLine;

pub fn encode(lines: &[SourceLine<'_>], layout: &Layout) -> Result<Vec<u8>, AsmError> {
  let mut code = Vec::with_capacity(layout.code_size as usize);
  let mut section = Section::None;

  for line in lines {
    match statement::parse(line, section)? {
      Statement::Section(next) => section = next,
      Statement::Instruction(instruction) => {
        emit(&mut code, &instruction, layout)
          .map_err(|kind| AsmError::new(line.number, kind))?;
      }
      Statement::Label(_) | Statement::Declaration { .. } => {}
    }
  }

  debug_assert_eq!(code.len(), layout.code_size as usize);
  Ok(code)
}

fn emit(code: &mut Vec<u8>, instruction: &Instruction<'_>, layout: &Layout) -> Result<(), AsmErrorKind> {
  code.push(instruction.op as u8);
  if let Some(mode) = instruction.mode() {
    code.push(mode.0);
  }
  for operand in [instruction.dst, instruction.src].into_iter().flatten() {
    match operand {
      Operand::Register(reg) => code.push(reg as u8),
      Operand::Immediate(token) | Operand::Memory(token) => {
        let value = layout
          .resolve(token)
          .ok_or_else(|| AsmErrorKind::UnknownSymbol(token.to_string()))?;
        code.extend_from_slice(&value.to_le_bytes());
      }
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::assembler::layout::layout;
  use crate::preprocess;

  fn encode_source(source: &str) -> Result<Vec<u8>, AsmError> {
    let lines: Vec<_> = preprocess::lines(source).collect();
    let layout = layout(&lines)?;
    encode(&lines, &layout)
  }

  #[test]
  fn bare_opcodes() {
    assert_eq!(encode_source("_main:\nnop\nsyscall\n").unwrap(), vec![0x00, 0x0B]);
  }

  #[test]
  fn register_and_immediate() {
    #[rustfmt::skip]
    let expected = vec![
      0x01, 0x12, 0x02, 0xEF, 0xBE, 0xAD, 0xDE, // mov r3, 0xDEADBEEF
      0x02, 0x11, 0x00, 0x01,                   // add r1, r2
    ];
    assert_eq!(
      encode_source("_main:\nmov r3, 0xDEADBEEF\nadd r1, r2\n").unwrap(),
      expected
    );
  }

  #[test]
  fn memory_operands_resolve_to_data_addresses() {
    // buf lives right after the 17 code bytes
    #[rustfmt::skip]
    let expected = vec![
      0x01, 0x32, 0x11, 0x00, 0x00, 0x00, 0x07, 0x00, 0x00, 0x00, // mov [buf], 7
      0x01, 0x13, 0x08, 0x11, 0x00, 0x00, 0x00,                   // mov ip, [buf]
    ];
    assert_eq!(
      encode_source("_main:\nmov [buf], 7\nmov ip, [buf]\n_data:\nDB buf[4]\n").unwrap(),
      expected
    );
  }

  #[test]
  fn branches_emit_only_a_source() {
    #[rustfmt::skip]
    let expected = vec![
      0x00,                               // top: nop
      0x06, 0x02, 0x00, 0x00, 0x00, 0x00, // jmp top
      0x0A, 0x01, 0x04,                   // jle r5
    ];
    assert_eq!(
      encode_source("_main:\ntop:\nnop\njmp top\njle r5\n").unwrap(),
      expected
    );
  }

  #[test]
  fn forward_references() {
    let code = encode_source("_main:\njmp end\nnop\nend:\nsyscall\n").unwrap();
    assert_eq!(&code[2..6], &7u32.to_le_bytes());
  }

  #[test]
  fn unknown_symbol_names_the_line() {
    let err = encode_source("_main:\nnop\njmp nowhere\n").unwrap_err();
    assert_eq!(
      err,
      AsmError::new(3, AsmErrorKind::UnknownSymbol("nowhere".into()))
    );
    assert_eq!(err.to_string(), "unknown symbol 'nowhere' at line 3");
  }
}
