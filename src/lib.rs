//! ByteCraft: a small register machine, its assembler and its module format.
//!
//! Eight general registers `r1`..`r8`, an instruction pointer `IP`, a flags
//! register `rF` and a mode register `rS`, all 32 bits wide. Source text goes
//! through the [`assembler`] into a [`Module`](region::Module), which [`bvm`]
//! persists and [`vm`] runs.

pub mod assembler;
pub mod bvm;
pub mod console;
pub mod opcode;
pub mod preprocess;
pub mod region;
pub mod register;
pub mod vm;
