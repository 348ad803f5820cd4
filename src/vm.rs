use std::fmt;
use std::ops::Range;

use crate::console::{Console, Stream};
use crate::opcode::{Mode, Opcode, OperandType, Syscall};
use crate::region::Region;
use crate::register::{Flags, Register, REGISTER_COUNT};

/// The type of a single register, and of every value the machine computes.
pub type Word = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
  Running,
  Halted,
}

/// A virtual machine for the ByteCraft instruction set.
///
/// Memory is a single flat image: the code region followed by the data
/// region. Instructions are only ever fetched from the code region, while
/// loads and stores may touch the whole image.
///
/// Faults never surface as errors. They set a bit in `rF` and halt the
/// machine, so callers inspect [`Vm::flags`] once [`Vm::run`] returns.
///
/// The `syscall` id is taken from `r1`. An older convention put it in the
/// high byte of `rF`; nothing reads it from there.
#[derive(Debug)]
pub struct Vm {
  registers: [Word; REGISTER_COUNT],
  memory: Vec<u8>,
  code_size: u32,
  state: State,
  tracing: bool,
}

impl Vm {
  /// Create a machine ready to execute `region` from its entry point
  pub fn new<R>(region: &R) -> Self
  where
    R: Region,
  {
    let mut registers = [0; REGISTER_COUNT];
    registers[Register::Ip.index()] = region.entry_point();
    Self {
      registers,
      memory: region.memory_image(),
      code_size: region.code().len() as u32,
      state: State::Running,
      tracing: true,
    }
  }

  /// Execute a single instruction, or `None` if the machine already halted
  pub fn step<C>(&mut self, console: &mut C) -> Option<()>
  where
    C: Console,
  {
    if self.state == State::Halted {
      return None;
    }

    let ip_before = self.register(Register::Ip);
    if ip_before >= self.code_size {
      self.fault(Fault::IpOutOfBounds);
      return Some(());
    }

    let mut task = Task::new(self, console);
    let byte = task.fetch8();
    // faults are already latched in rF
    task.execute(byte).ok();

    if self.tracing {
      console.trace(&TraceRecord::capture(self, ip_before, byte));
    }
    Some(())
  }

  /// Step until the machine halts. There is no step limit.
  pub fn run<C>(&mut self, console: &mut C)
  where
    C: Console,
  {
    while self.step(console).is_some() {}
    tracing::debug!(flags = %self.flags(), "machine halted");
  }

  pub fn state(&self) -> State {
    self.state
  }

  pub fn is_running(&self) -> bool {
    self.state == State::Running
  }

  pub fn register(&self, reg: Register) -> Word {
    self.registers[reg.index()]
  }

  /// Store `value` as-is, bypassing the instruction set's rules.
  pub fn set_register(&mut self, reg: Register, value: Word) {
    self.registers[reg.index()] = value;
  }

  pub fn flags(&self) -> Flags {
    Flags(self.register(Register::Rf))
  }

  pub fn memory(&self) -> &[u8] {
    &self.memory
  }

  pub fn code_size(&self) -> u32 {
    self.code_size
  }

  /// Emit a [`TraceRecord`] after every instruction. On by default.
  pub fn set_tracing(&mut self, tracing: bool) {
    self.tracing = tracing;
  }

  pub fn tracing(&self) -> bool {
    self.tracing
  }

  fn update_flags(&mut self, update: impl FnOnce(&mut Flags)) {
    let mut flags = self.flags();
    update(&mut flags);
    self.set_register(Register::Rf, flags.0);
  }

  fn halt(&mut self) {
    self.state = State::Halted;
  }

  fn fault(&mut self, fault: Fault) {
    self.update_flags(|flags| flags.insert(fault.flag()));
    self.halt();
    tracing::warn!(%fault, ip = self.register(Register::Ip), "machine faulted");
  }

  /// Byte range `[address, address + count)` of memory, or `None` if any of it
  /// lies outside the image.
  fn span(&self, address: Word, count: Word) -> Option<Range<usize>> {
    let len = self.memory.len() as u64;
    let (address, count) = (u64::from(address), u64::from(count));
    if address > len || count > len || address + count > len {
      return None;
    }
    Some(address as usize..(address + count) as usize)
  }
}

/// One line of the execution trace, captured after an instruction ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRecord {
  pub ip_before: Word,
  pub opcode: u8,
  pub general: [Word; 8],
  pub ip_after: Word,
  pub flags: Flags,
  /// Bit 0 of `rS`.
  pub signed: bool,
}

impl TraceRecord {
  fn capture(vm: &Vm, ip_before: Word, opcode: u8) -> Self {
    Self {
      ip_before,
      opcode,
      general: Register::GENERAL.map(|reg| vm.register(reg)),
      ip_after: vm.register(Register::Ip),
      flags: vm.flags(),
      signed: vm.register(Register::Rs) & 1 != 0,
    }
  }
}

impl fmt::Display for TraceRecord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "IP:{:08X} OP:{:02X} | ", self.ip_before, self.opcode)?;
    for (reg, value) in Register::GENERAL.iter().zip(self.general) {
      write!(f, "{reg}:{value:08X} ")?;
    }
    write!(
      f,
      "IP:{:08X} rF:{:08X} rS:{} [",
      self.ip_after,
      self.flags.0,
      u8::from(self.signed)
    )?;
    for name in self.flags.names() {
      write!(f, "{name} ")?;
    }
    f.write_str("]")
  }
}

/// Why the current instruction stopped. The matching flag is raised and the
/// machine halted before one is returned.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
  #[error("bad instruction")]
  BadInstruction,

  #[error("instruction pointer out of bounds")]
  IpOutOfBounds,

  #[error("read out of bounds")]
  ReadOutOfBounds,

  #[error("write out of bounds")]
  WriteOutOfBounds,
}

impl Fault {
  fn flag(self) -> Flags {
    match self {
      Self::BadInstruction => Flags::BAD_INSTR,
      Self::IpOutOfBounds => Flags::IP_OOB,
      Self::ReadOutOfBounds => Flags::READ_OOB,
      Self::WriteOutOfBounds => Flags::WRITE_OOB,
    }
  }
}

type Exec<T = ()> = Result<T, Fault>;

struct Task<'vm, 'console, C> {
  vm: &'vm mut Vm,
  console: &'console mut C,
}

impl<'vm, 'console, C> Task<'vm, 'console, C>
where
  C: Console,
{
  fn new(vm: &'vm mut Vm, console: &'console mut C) -> Self {
    Self { vm, console }
  }

  fn fail<T>(&mut self, fault: Fault) -> Exec<T> {
    self.vm.fault(fault);
    Err(fault)
  }

  /// Advance the instruction pointer over `count` code bytes. A fetch that
  /// would run past the code region raises `IP_OOB`, leaves `IP` alone and
  /// yields `None`.
  fn eat(&mut self, count: u32) -> Option<Range<usize>> {
    let ip = self.vm.register(Register::Ip);
    let end = u64::from(ip) + u64::from(count);
    if end > u64::from(self.vm.code_size) {
      self.vm.fault(Fault::IpOutOfBounds);
      return None;
    }
    self.vm.set_register(Register::Ip, end as Word);
    Some(ip as usize..end as usize)
  }

  // A truncated fetch reads as zero and the instruction completes with it.
  fn fetch8(&mut self) -> u8 {
    self.eat(1).map_or(0, |at| self.vm.memory[at.start])
  }

  fn fetch32(&mut self) -> Word {
    self.eat(4).map_or(0, |at| read_le(&self.vm.memory[at]))
  }

  fn fetch_mode(&mut self) -> Mode {
    Mode(self.fetch8())
  }

  fn fetch_register(&mut self) -> Exec<Register> {
    let index = self.fetch8();
    match Register::from_index(index) {
      Some(reg) => Ok(reg),
      None => self.fail(Fault::BadInstruction),
    }
  }

  fn load32(&mut self, address: Word) -> Exec<Word> {
    let at = self.readable(address, 4)?;
    Ok(read_le(&self.vm.memory[at]))
  }

  fn store32(&mut self, address: Word, value: Word) -> Exec {
    let at = self.writable(address, 4)?;
    self.vm.memory[at].copy_from_slice(&value.to_le_bytes());
    Ok(())
  }

  fn readable(&mut self, address: Word, count: Word) -> Exec<Range<usize>> {
    match self.vm.span(address, count) {
      Some(at) => Ok(at),
      None => self.fail(Fault::ReadOutOfBounds),
    }
  }

  fn writable(&mut self, address: Word, count: Word) -> Exec<Range<usize>> {
    match self.vm.span(address, count) {
      Some(at) => Ok(at),
      None => self.fail(Fault::WriteOutOfBounds),
    }
  }

  /// Decode the source operand described by `ty`: a register, an immediate
  /// or a memory load.
  fn source(&mut self, ty: Option<OperandType>) -> Exec<Word> {
    match ty {
      Some(OperandType::Reg) => {
        let reg = self.fetch_register()?;
        Ok(self.vm.register(reg))
      }
      Some(OperandType::Imm) => Ok(self.fetch32()),
      Some(OperandType::Mem) => {
        let address = self.fetch32();
        self.load32(address)
      }
      _ => self.fail(Fault::BadInstruction),
    }
  }

  /// Decode the register destination that every non-`mov` operation needs.
  fn destination_register(&mut self, mode: Mode) -> Exec<Register> {
    match mode.dst() {
      Some(OperandType::Reg) => self.fetch_register(),
      _ => self.fail(Fault::BadInstruction),
    }
  }

  fn execute(&mut self, byte: u8) -> Exec {
    let op = match Opcode::try_from(byte) {
      Ok(op) => op,
      Err(_) => return self.fail(Fault::BadInstruction),
    };
    match op {
      Opcode::Nop => Ok(()),
      Opcode::Mov => mov(self),
      Opcode::Add => arithmetic(self, Word::wrapping_add),
      Opcode::Sub => arithmetic(self, Word::wrapping_sub),
      Opcode::Xor => arithmetic(self, |lhs, rhs| lhs ^ rhs),
      Opcode::Cmp => compare(self),
      Opcode::Jmp => branch(self, |_| true),
      Opcode::Jeq => branch(self, |flags| flags.contains(Flags::EQ)),
      Opcode::Jneq => branch(self, |flags| !flags.contains(Flags::EQ)),
      Opcode::Jla => branch(self, |flags| flags.contains(Flags::GT)),
      Opcode::Jle => branch(self, |flags| flags.intersects(Flags::LT | Flags::EQ)),
      Opcode::Syscall => syscall(self),
    }
  }
}

fn read_le(bytes: &[u8]) -> Word {
  let mut word = [0u8; 4];
  word.copy_from_slice(bytes);
  Word::from_le_bytes(word)
}

// d ← s, rS keeps only bit 0
fn mov<C>(task: &mut Task<'_, '_, C>) -> Exec
where
  C: Console,
{
  let mode = task.fetch_mode();
  match mode.dst() {
    Some(OperandType::Reg) => {
      let dst = task.fetch_register()?;
      let value = task.source(mode.src())?;
      let value = if dst == Register::Rs { value & 1 } else { value };
      task.vm.set_register(dst, value);
      Ok(())
    }
    Some(OperandType::Mem) => {
      let address = task.fetch32();
      let value = match mode.src() {
        Some(OperandType::Mem) => return task.fail(Fault::BadInstruction),
        src => task.source(src)?,
      };
      task.store32(address, value)
    }
    _ => task.fail(Fault::BadInstruction),
  }
}

// r[d] ← r[d] op s, wrapping
fn arithmetic<C>(task: &mut Task<'_, '_, C>, op: impl FnOnce(Word, Word) -> Word) -> Exec
where
  C: Console,
{
  let mode = task.fetch_mode();
  let dst = task.destination_register(mode)?;
  let rhs = task.source(mode.src())?;
  let result = op(task.vm.register(dst), rhs);
  task.vm.set_register(dst, result);
  Ok(())
}

// rF ← EQ | GT | LT of r[l] ? s
fn compare<C>(task: &mut Task<'_, '_, C>) -> Exec
where
  C: Console,
{
  let mode = task.fetch_mode();
  let lhs = task.destination_register(mode)?;
  let lhs = task.vm.register(lhs);
  let rhs = task.source(mode.src())?;

  let signed = task.vm.register(Register::Rs) & 1 != 0;
  let ordering = if signed {
    (lhs as i32).cmp(&(rhs as i32))
  } else {
    lhs.cmp(&rhs)
  };
  let outcome = match ordering {
    std::cmp::Ordering::Equal => Flags::EQ,
    std::cmp::Ordering::Greater => Flags::GT,
    std::cmp::Ordering::Less => Flags::LT,
  };
  task.vm.update_flags(|flags| {
    flags.remove(Flags::COMPARE);
    flags.insert(outcome);
  });
  Ok(())
}

// if taken(rF) : ip ← t
fn branch<C>(task: &mut Task<'_, '_, C>, taken: impl FnOnce(Flags) -> bool) -> Exec
where
  C: Console,
{
  let mode = task.fetch_mode();
  let target = match mode.src() {
    Some(OperandType::Imm) => task.fetch32(),
    Some(OperandType::Reg) => {
      let reg = task.fetch_register()?;
      task.vm.register(reg)
    }
    _ => return task.fail(Fault::BadInstruction),
  };

  if taken(task.vm.flags()) {
    task.vm.update_flags(|flags| flags.insert(Flags::TEST_TRUE));
    task.vm.set_register(Register::Ip, target);
  } else {
    task.vm.update_flags(|flags| flags.remove(Flags::TEST_TRUE));
  }
  Ok(())
}

fn syscall<C>(task: &mut Task<'_, '_, C>) -> Exec
where
  C: Console,
{
  let id = task.vm.register(Register::R1);
  let args = [Register::R2, Register::R3, Register::R4].map(|reg| task.vm.register(reg));
  tracing::trace!(id, ?args, "syscall");

  match Syscall::try_from(id) {
    Ok(Syscall::Exit) => task.vm.halt(),
    Ok(Syscall::Write) => {
      let [fd, address, count] = args;
      let at = task.readable(address, count)?;
      if let Err(e) = task
        .console
        .write(Stream::from_fd(fd), &task.vm.memory[at])
      {
        tracing::warn!(error = %e, fd, "write syscall failed on the host");
      }
      task.vm.set_register(Register::R1, count);
    }
    Ok(Syscall::Read) => {
      let [fd, address, count] = args;
      let at = task.writable(address, count)?;
      let read = if fd == 0 {
        let mut input = vec![0u8; at.len()];
        let read = task.console.read(&mut input).min(input.len());
        task.vm.memory[at.start..at.start + read].copy_from_slice(&input[..read]);
        read
      } else {
        0
      };
      task.vm.set_register(Register::R1, read as Word);
    }
    Ok(Syscall::Open) => task.vm.set_register(Register::R1, Word::MAX),
    Err(_) => return task.fail(Fault::BadInstruction),
  }
  Ok(())
}
