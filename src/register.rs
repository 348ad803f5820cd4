use std::fmt;
use std::ops::BitOr;

/// Number of slots in the register file.
pub const REGISTER_COUNT: usize = 11;

/// Index of a register in the register file, as encoded in operand bytes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
  R1 = 0,
  R2,
  R3,
  R4,
  R5,
  R6,
  R7,
  R8,
  /// Instruction pointer.
  Ip,
  /// Flags, see [`Flags`].
  Rf,
  /// Mode register, only bit 0 (signed compare) is significant.
  Rs,
}

impl Register {
  pub const GENERAL: [Register; 8] = [
    Self::R1,
    Self::R2,
    Self::R3,
    Self::R4,
    Self::R5,
    Self::R6,
    Self::R7,
    Self::R8,
  ];

  pub fn from_index(index: u8) -> Option<Self> {
    let reg = match index {
      0 => Self::R1,
      1 => Self::R2,
      2 => Self::R3,
      3 => Self::R4,
      4 => Self::R5,
      5 => Self::R6,
      6 => Self::R7,
      7 => Self::R8,
      8 => Self::Ip,
      9 => Self::Rf,
      10 => Self::Rs,
      _ => return None,
    };
    Some(reg)
  }

  /// Parse an assembly register token: `r1`..`r8`, `ip`, `rf`, `rs`, in any
  /// case.
  pub fn parse(token: &str) -> Option<Self> {
    match token.trim().to_ascii_lowercase().as_str() {
      "ip" => Some(Self::Ip),
      "rf" => Some(Self::Rf),
      "rs" => Some(Self::Rs),
      other => match other.as_bytes() {
        [b'r', digit @ b'1'..=b'8'] => Self::from_index(digit - b'1'),
        _ => None,
      },
    }
  }

  pub fn index(self) -> usize {
    self as usize
  }

  pub fn name(self) -> &'static str {
    match self {
      Self::R1 => "r1",
      Self::R2 => "r2",
      Self::R3 => "r3",
      Self::R4 => "r4",
      Self::R5 => "r5",
      Self::R6 => "r6",
      Self::R7 => "r7",
      Self::R8 => "r8",
      Self::Ip => "IP",
      Self::Rf => "rF",
      Self::Rs => "rS",
    }
  }
}

impl fmt::Display for Register {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Typed view over the raw `rF` word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags(pub u32);

impl Flags {
  pub const EQ: Flags = Flags(1 << 0);
  pub const GT: Flags = Flags(1 << 1);
  pub const LT: Flags = Flags(1 << 2);
  /// The last conditional branch was taken. Informational only.
  pub const TEST_TRUE: Flags = Flags(1 << 3);
  pub const BAD_INSTR: Flags = Flags(1 << 4);
  pub const IP_OOB: Flags = Flags(1 << 5);
  pub const READ_OOB: Flags = Flags(1 << 6);
  pub const WRITE_OOB: Flags = Flags(1 << 7);

  pub const COMPARE: Flags = Flags(Self::EQ.0 | Self::GT.0 | Self::LT.0);
  pub const FAULTS: Flags =
    Flags(Self::BAD_INSTR.0 | Self::IP_OOB.0 | Self::READ_OOB.0 | Self::WRITE_OOB.0);

  // trace order
  const NAMED: [(Flags, &'static str); 8] = [
    (Self::EQ, "EQ"),
    (Self::GT, "GT"),
    (Self::LT, "LT"),
    (Self::TEST_TRUE, "TEST"),
    (Self::BAD_INSTR, "BAD"),
    (Self::IP_OOB, "IP_OOB"),
    (Self::READ_OOB, "R_OOB"),
    (Self::WRITE_OOB, "W_OOB"),
  ];

  /// True when any bit of `other` is set.
  pub fn intersects(self, other: Flags) -> bool {
    self.0 & other.0 != 0
  }

  pub fn contains(self, other: Flags) -> bool {
    self.0 & other.0 == other.0
  }

  pub fn insert(&mut self, other: Flags) {
    self.0 |= other.0;
  }

  pub fn remove(&mut self, other: Flags) {
    self.0 &= !other.0;
  }

  pub fn has_fault(self) -> bool {
    self.intersects(Self::FAULTS)
  }

  /// Names of the set flags, in the fixed order
  /// `EQ GT LT TEST BAD IP_OOB R_OOB W_OOB`.
  pub fn names(self) -> impl Iterator<Item = &'static str> {
    Self::NAMED
      .into_iter()
      .filter(move |(flag, _)| self.contains(*flag))
      .map(|(_, name)| name)
  }
}

impl BitOr for Flags {
  type Output = Flags;

  fn bitor(self, rhs: Flags) -> Flags {
    Flags(self.0 | rhs.0)
  }
}

impl fmt::Display for Flags {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let names: Vec<_> = self.names().collect();
    write!(f, "[{}]", names.join(" "))
  }
}
