//! First pass: sizes every instruction, binds labels and lays out the data
//! buffers, without resolving any operand value.

use std::collections::HashMap;

use super::error::{AsmError, AsmErrorKind};
use super::statement::{self, Section, Statement};
use crate::preprocess::SourceLine;

/// Everything the encoder needs to know about the program's shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layout {
  pub code_size: u32,
  pub code_symbols: HashMap<String, u32>,
  pub data_symbols: HashMap<String, u32>,
  /// Zero-filled, sized to the sum of every `DB` declaration.
  pub data: Vec<u8>,
  /// Whether a `_main:` marker was seen at all.
  pub has_main: bool,
}

impl Layout {
  /// Resolve an immediate or address token: a number first, then a label,
  /// then a data buffer.
  pub fn resolve(&self, token: &str) -> Option<u32> {
    statement::parse_number(token)
      .or_else(|| self.code_symbols.get(token).copied())
      .or_else(|| self.data_symbols.get(token).copied())
  }
}

pub fn layout<'src>(lines: &[SourceLine<'src>]) -> Result<Layout, AsmError> {
  let mut section = Section::None;
  let mut pc: u32 = 0;
  let mut has_main = false;
  let mut code_symbols = HashMap::new();
  let mut declarations: Vec<(&'src str, u32, usize)> = Vec::new();

  for line in lines {
    match statement::parse(line, section)? {
      Statement::Section(next) => {
        has_main |= next == Section::Main;
        section = next;
      }
      Statement::Label(label) => {
        if code_symbols.contains_key(label) {
          return Err(AsmError::new(
            line.number,
            AsmErrorKind::DuplicateLabel(label.to_string()),
          ));
        }
        code_symbols.insert(label.to_string(), pc);
      }
      Statement::Instruction(instruction) => {
        pc = pc
          .checked_add(instruction.size())
          .ok_or(AsmError::new(line.number, AsmErrorKind::CodeTooLarge))?;
      }
      Statement::Declaration { name, size } => {
        if declarations.iter().any(|(seen, _, _)| *seen == name) {
          return Err(AsmError::new(
            line.number,
            AsmErrorKind::DuplicateBuffer(name.to_string()),
          ));
        }
        declarations.push((name, size, line.number));
      }
    }
  }

  let code_size = pc;
  let mut data_symbols = HashMap::with_capacity(declarations.len());
  let mut offset: u32 = 0;
  for (name, size, line) in declarations {
    let address = code_size
      .checked_add(offset)
      .ok_or(AsmError::new(line, AsmErrorKind::DataTooLarge))?;
    data_symbols.insert(name.to_string(), address);
    offset = offset
      .checked_add(size)
      .ok_or(AsmError::new(line, AsmErrorKind::DataTooLarge))?;
  }

  Ok(Layout {
    code_size,
    code_symbols,
    data_symbols,
    data: vec![0; offset as usize],
    has_main,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::preprocess;

  fn layout_of(source: &str) -> Result<Layout, AsmError> {
    let lines: Vec<_> = preprocess::lines(source).collect();
    layout(&lines)
  }

  #[test]
  fn labels_bind_to_program_counter() {
    let layout = layout_of(
      "_main:\nstart:\n  mov r1, 1\nmiddle:\n  jmp start\nend:\n  syscall\n",
    )
    .unwrap();
    assert_eq!(layout.code_symbols["start"], 0);
    assert_eq!(layout.code_symbols["middle"], 7);
    assert_eq!(layout.code_symbols["end"], 13);
    assert_eq!(layout.code_size, 14);
    assert!(layout.has_main);
  }

  #[test]
  fn data_follows_code_in_declaration_order() {
    let layout = layout_of("_data:\nDB a[3]\nDB b[0x10]\n_main:\nnop\nnop\n").unwrap();
    assert_eq!(layout.code_size, 2);
    assert_eq!(layout.data_symbols["a"], 2);
    assert_eq!(layout.data_symbols["b"], 5);
    assert_eq!(layout.data, vec![0; 19]);
  }

  #[test]
  fn duplicate_label() {
    let err = layout_of("_main:\nx:\nnop\nx:\n").unwrap_err();
    assert_eq!(err, AsmError::new(4, AsmErrorKind::DuplicateLabel("x".into())));
  }

  #[test]
  fn duplicate_buffer() {
    let err = layout_of("_data:\nDB buf[1]\nDB buf[2]\n").unwrap_err();
    assert_eq!(
      err,
      AsmError::new(3, AsmErrorKind::DuplicateBuffer("buf".into()))
    );
  }

  #[test]
  fn label_and_buffer_namespaces_are_independent() {
    let layout = layout_of("_main:\nbuf:\nnop\n_data:\nDB buf[4]\n").unwrap();
    assert_eq!(layout.code_symbols["buf"], 0);
    assert_eq!(layout.data_symbols["buf"], 1);
    // labels win over buffers
    assert_eq!(layout.resolve("buf"), Some(0));
  }

  #[test]
  fn data_overflow() {
    let err = layout_of("_data:\nDB a[0xFFFFFFFF]\nDB b[1]\nDB c[1]\n").unwrap_err();
    assert_eq!(err, AsmError::new(3, AsmErrorKind::DataTooLarge));
  }

  #[test]
  fn missing_main_is_empty_code() {
    let layout = layout_of("_data:\nDB a[2]\n").unwrap();
    assert!(!layout.has_main);
    assert_eq!(layout.code_size, 0);
    assert_eq!(layout.data_symbols["a"], 0);
  }

  #[test]
  fn resolve_prefers_numbers() {
    let layout = layout_of("_main:\nx:\nnop\n").unwrap();
    assert_eq!(layout.resolve("0x10"), Some(16));
    assert_eq!(layout.resolve("x"), Some(0));
    assert_eq!(layout.resolve("y"), None);
  }
}
