use std::fmt;

/// A single ByteCraft opcode. Every instruction starts with one of these bytes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
  /// | Operation | Semantics/RTL  | Assembly |
  /// |-----------|----------------|----------|
  /// | No-op     | `(do nothing)` | `nop`    |
  Nop = 0x0,

  /// | Operation | Semantics/RTL | Assembly        |
  /// |-----------|---------------|-----------------|
  /// | Move      | `d ← s`       | `mov d, s`      |
  ///
  /// `d` is a register or `[mem]`, `s` is a register, immediate or `[mem]`,
  /// but never both `[mem]`. Moves into `rS` keep only the lowest bit.
  Mov = 0x1,

  /// | Operation | Semantics/RTL       | Assembly    |
  /// |-----------|---------------------|-------------|
  /// | Add       | `r[d] ← r[d] + s`   | `add rd, s` |
  Add = 0x2,

  /// | Operation | Semantics/RTL       | Assembly    |
  /// |-----------|---------------------|-------------|
  /// | Subtract  | `r[d] ← r[d] − s`   | `sub rd, s` |
  Sub = 0x3,

  /// | Operation   | Semantics/RTL     | Assembly    |
  /// |-------------|-------------------|-------------|
  /// | Logical XOR | `r[d] ← r[d] ^ s` | `xor rd, s` |
  Xor = 0x4,

  /// Replaces the `EQ`/`GT`/`LT` flags with the outcome of `r[l] ? s`. The
  /// comparison is signed when bit 0 of `rS` is set.
  ///
  /// | Operation | Semantics/RTL          | Assembly    |
  /// |-----------|------------------------|-------------|
  /// | Compare   | `rF ← flags(r[l] ? s)` | `cmp rl, s` |
  Cmp = 0x5,

  /// | Operation | Semantics/RTL | Assembly     |
  /// |-----------|---------------|--------------|
  /// | Jump      | `ip ← t`      | `jmp t`      |
  Jmp = 0x6,

  /// | Operation     | Semantics/RTL       | Assembly |
  /// |---------------|---------------------|----------|
  /// | Jump if equal | `if EQ : ip ← t`    | `jeq t`  |
  Jeq = 0x7,

  /// | Operation         | Semantics/RTL     | Assembly |
  /// |-------------------|-------------------|----------|
  /// | Jump if not equal | `if !EQ : ip ← t` | `jneq t` |
  Jneq = 0x8,

  /// | Operation      | Semantics/RTL    | Assembly |
  /// |----------------|------------------|----------|
  /// | Jump if larger | `if GT : ip ← t` | `jla t`  |
  Jla = 0x9,

  /// | Operation             | Semantics/RTL          | Assembly |
  /// |-----------------------|------------------------|----------|
  /// | Jump if less or equal | `if LT ∨ EQ : ip ← t`  | `jle t`  |
  Jle = 0xA,

  /// Service the request whose id is held in `r1`, see [`Syscall`].
  Syscall = 0xB,
}

/// The byte did not name any opcode.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unknown opcode byte {0:#04x}")]
pub struct UnknownOpcode(pub u8);

impl TryFrom<u8> for Opcode {
  type Error = UnknownOpcode;

  fn try_from(byte: u8) -> Result<Self, Self::Error> {
    Ok(match byte {
      0x0 => Self::Nop,
      0x1 => Self::Mov,
      0x2 => Self::Add,
      0x3 => Self::Sub,
      0x4 => Self::Xor,
      0x5 => Self::Cmp,
      0x6 => Self::Jmp,
      0x7 => Self::Jeq,
      0x8 => Self::Jneq,
      0x9 => Self::Jla,
      0xA => Self::Jle,
      0xB => Self::Syscall,
      other => return Err(UnknownOpcode(other)),
    })
  }
}

impl Opcode {
  /// Look up an opcode by its (case-insensitive) mnemonic.
  pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
    let op = match mnemonic.to_ascii_lowercase().as_str() {
      "nop" => Self::Nop,
      "mov" => Self::Mov,
      "add" => Self::Add,
      "sub" => Self::Sub,
      "xor" => Self::Xor,
      "cmp" => Self::Cmp,
      "jmp" => Self::Jmp,
      "jeq" => Self::Jeq,
      "jneq" => Self::Jneq,
      "jla" => Self::Jla,
      "jle" => Self::Jle,
      "syscall" => Self::Syscall,
      _ => return None,
    };
    Some(op)
  }

  pub fn mnemonic(self) -> &'static str {
    match self {
      Self::Nop => "nop",
      Self::Mov => "mov",
      Self::Add => "add",
      Self::Sub => "sub",
      Self::Xor => "xor",
      Self::Cmp => "cmp",
      Self::Jmp => "jmp",
      Self::Jeq => "jeq",
      Self::Jneq => "jneq",
      Self::Jla => "jla",
      Self::Jle => "jle",
      Self::Syscall => "syscall",
    }
  }

  /// Branches carry a single source operand and no destination.
  pub fn is_branch(self) -> bool {
    matches!(
      self,
      Self::Jmp | Self::Jeq | Self::Jneq | Self::Jla | Self::Jle
    )
  }

  /// Opcodes encoded as a lone byte, without a mode byte.
  pub fn is_bare(self) -> bool {
    matches!(self, Self::Nop | Self::Syscall)
  }
}

impl fmt::Display for Opcode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.mnemonic())
  }
}

/// The kind of an operand, stored as one nibble of the [`Mode`] byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
  None = 0,
  Reg = 1,
  Imm = 2,
  Mem = 3,
}

impl OperandType {
  pub fn from_nibble(nibble: u8) -> Option<Self> {
    match nibble & 0x0F {
      0 => Some(Self::None),
      1 => Some(Self::Reg),
      2 => Some(Self::Imm),
      3 => Some(Self::Mem),
      _ => None,
    }
  }

  /// Number of operand bytes following the mode byte for this kind.
  pub fn encoded_size(self) -> u32 {
    match self {
      Self::None => 0,
      Self::Reg => 1,
      Self::Imm | Self::Mem => 4,
    }
  }
}

/// The packed mode byte: high nibble is the destination type, low nibble the
/// source type. The raw byte is kept as-is; the accessors are a typed view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode(pub u8);

impl Mode {
  pub fn new(dst: OperandType, src: OperandType) -> Self {
    Self(((dst as u8) << 4) | src as u8)
  }

  /// Mode byte of a branch, which only has a source.
  pub fn branch(src: OperandType) -> Self {
    Self::new(OperandType::None, src)
  }

  pub fn dst(self) -> Option<OperandType> {
    OperandType::from_nibble(self.0 >> 4)
  }

  pub fn src(self) -> Option<OperandType> {
    OperandType::from_nibble(self.0)
  }
}

/// Requests serviced by the `syscall` instruction. The id is read from `r1`,
/// arguments from `r2`..`r4`, and results are returned in `r1`.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
  /// Halt the machine.
  Exit = 0,
  /// `r2` = fd, `r3` = address, `r4` = length. fd 2 is stderr, anything else
  /// stdout.
  Write = 1,
  /// `r2` = fd, `r3` = address, `r4` = max length. Only fd 0 is serviced.
  Read = 2,
  /// No filesystem is modelled, always fails with `0xFFFFFFFF`.
  Open = 3,
}

impl TryFrom<u32> for Syscall {
  type Error = u32;

  fn try_from(id: u32) -> Result<Self, Self::Error> {
    match id {
      0 => Ok(Self::Exit),
      1 => Ok(Self::Write),
      2 => Ok(Self::Read),
      3 => Ok(Self::Open),
      other => Err(other),
    }
  }
}
