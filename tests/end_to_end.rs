use bytecraft::assembler::{self, AsmErrorKind};
use bytecraft::bvm;
use bytecraft::console::BufferConsole;
use bytecraft::region::{Module, Region};
use bytecraft::register::{Flags, Register};
use bytecraft::vm::{State, Vm};

fn run(module: &Module, console: &mut BufferConsole) -> Vm {
  let mut vm = Vm::new(module);
  vm.run(console);
  vm
}

#[test]
fn deadbeef_then_exit() {
  let module = assembler::assemble(
    "_main:\n mov r3, 0xDEADBEEF\n mov r1, 0\n mov r2, 0\n syscall\n",
  )
  .unwrap();
  let vm = run(&module, &mut BufferConsole::default());
  assert_eq!(vm.register(Register::R3), 0xDEADBEEF);
  assert_eq!(vm.state(), State::Halted);
  assert!(!vm.flags().has_fault());
}

#[test]
fn save_then_load_reproduces_module() {
  let module = assembler::assemble(
    "_main:\nstart:\n  mov [buf], 0x41\n  jmp start\n_data:\n  DB buf[4]\n  DB other[0x3]\n",
  )
  .unwrap();
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let path = dir.path().join("program.bvm");

  bvm::save(&path, &module).unwrap();
  let loaded = bvm::load(&path).unwrap();

  assert_eq!(loaded.entry_point(), module.entry_point());
  assert_eq!(loaded.code(), module.code());
  assert_eq!(loaded.data(), module.data());
}

#[test]
fn load_rejects_truncated_files() {
  let module = assembler::assemble("_main:\nnop\n_data:\nDB buf[8]\n").unwrap();
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let path = dir.path().join("short.bvm");

  let bytes = bvm::encode(&module);
  std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
  let err = bvm::load(&path).unwrap_err();
  assert_eq!(err.to_string(), "truncated payload");

  std::fs::write(&path, &bytes[..10]).unwrap();
  let err = bvm::load(&path).unwrap_err();
  assert_eq!(err.to_string(), "truncated header");

  std::fs::write(&path, b"ELF\0").unwrap();
  let err = bvm::load(&path).unwrap_err();
  assert_eq!(err.to_string(), "bad magic");
}

#[test]
fn echo_input_through_data_buffer() {
  let source = "
    ; read up to 16 bytes into buf, then write them back out
    _main:
      mov r1, 2        ; read
      mov r2, 0        ; stdin
      mov r3, buf
      mov r4, 16
      syscall
      mov r4, r1       # bytes read
      mov r1, 1        ; write
      mov r2, 1        ; stdout
      mov r3, buf
      syscall
      mov r1, 0
      syscall

    _data:
      DB buf[16]
  ";
  let module = assembler::assemble(source).unwrap();
  let mut console = BufferConsole::with_input("ping");
  let vm = run(&module, &mut console);
  assert_eq!(console.stdout, b"ping");
  assert!(!vm.flags().has_fault());
  assert_eq!(vm.state(), State::Halted);
}

#[test]
fn counting_loop() {
  let source = "
    _main:
      mov r1, 0
    loop:
      add r1, 1
      cmp r1, 5
      jneq loop
      mov [result], r1
      mov r1, 0
      syscall
    _data:
      DB result[4]
  ";
  let module = assembler::assemble(source).unwrap();
  let vm = run(&module, &mut BufferConsole::default());
  let code_size = module.code().len();
  assert_eq!(&vm.memory()[code_size..], &5u32.to_le_bytes());
  assert!(vm.flags().contains(Flags::EQ));
  assert!(!vm.flags().contains(Flags::TEST_TRUE));
}

#[test]
fn signed_loop_with_jle() {
  let source = "
    _main:
      mov rs, 1
      mov r2, -3
    again:
      add r2, 1
      cmp r2, 0
      jle again
      mov r1, 0
      syscall
  ";
  let module = assembler::assemble(source).unwrap();
  let vm = run(&module, &mut BufferConsole::default());
  assert_eq!(vm.register(Register::R2), 1);
  assert!(vm.flags().contains(Flags::GT));
}

#[test]
fn faulting_program_halts_with_flag() {
  let module = assembler::assemble("_main:\nmov r1, 99\nsyscall\nnop\n").unwrap();
  let mut console = BufferConsole::default();
  let vm = run(&module, &mut console);
  assert_eq!(vm.flags(), Flags::BAD_INSTR);
  assert_eq!(vm.register(Register::Ip), 8);
  assert_eq!(console.traces.len(), 2);
}

#[test]
fn out_of_bounds_store_through_register_address() {
  let module = assembler::assemble("_main:\nmov [0x1000], 1\n").unwrap();
  let vm = run(&module, &mut BufferConsole::default());
  assert_eq!(vm.flags(), Flags::WRITE_OOB);
}

#[test]
fn assembly_errors() {
  let err = assembler::assemble("_main:\n  nop\n  mul r1, r2\n").unwrap_err();
  assert_eq!(err.line, 3);
  assert!(err.to_string().contains("line 3"));

  let err = assembler::assemble("_main:\nx:\nx:\n").unwrap_err();
  assert_eq!(err.kind, AsmErrorKind::DuplicateLabel("x".into()));

  let err = assembler::assemble("_data:\nDB b[1]\nDB b[1]\n").unwrap_err();
  assert_eq!(err.kind, AsmErrorKind::DuplicateBuffer("b".into()));

  let err = assembler::assemble("nop\n").unwrap_err();
  assert_eq!(err.kind, AsmErrorKind::OutsideSection);

  for op in ["jmp", "jeq", "jneq", "jla", "jle"] {
    let err = assembler::assemble(&format!("_main:\n{op} [x]\n")).unwrap_err();
    assert_eq!(err.kind, AsmErrorKind::BranchToMemory);
  }

  let err = assembler::assemble("_main:\nmov [a], [b]\n_data:\nDB a[4]\nDB b[4]\n").unwrap_err();
  assert_eq!(err.kind, AsmErrorKind::MoveMemoryToMemory);
  assert!(assembler::assemble("_main:\nmov r1, [a]\n_data:\nDB a[4]\n").is_ok());
}

#[test]
fn assemble_file_reads_from_disk() {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  let path = dir.path().join("prog.asm");
  std::fs::write(&path, "_main:\n  nop\n").unwrap();
  let module = assembler::assemble_file(&path).unwrap();
  assert_eq!(module.code(), &[0x00]);
}
