use std::path::PathBuf;
use std::process::ExitCode;

use bytecraft::console::StdConsole;
use bytecraft::region::Region;
use bytecraft::vm::Vm;
use bytecraft::{assembler, bvm};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bytecraft", version, about = "ByteCraft assembler and virtual machine")]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Assemble a source file into a .bvm module
  Asm {
    input: PathBuf,
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: PathBuf,
  },
  /// Run a .bvm module until it halts
  Run {
    program: PathBuf,
    /// Do not print a trace line after every instruction
    #[arg(long)]
    no_trace: bool,
  },
}

fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    )
    .with_writer(std::io::stderr)
    .init();

  match Cli::parse().command {
    Command::Asm { input, output } => {
      let module = match assembler::assemble_file(&input) {
        Ok(module) => module,
        Err(e) => {
          eprintln!("Assembly failed: {e}");
          return ExitCode::FAILURE;
        }
      };
      if let Err(e) = bvm::save(&output, &module) {
        eprintln!("Save failed: {e}");
        return ExitCode::FAILURE;
      }
      println!(
        "Assembled OK: entry={} code={}B data={}B",
        module.entry_point(),
        module.code().len(),
        module.data().len()
      );
    }
    Command::Run { program, no_trace } => {
      let module = match bvm::load(&program) {
        Ok(module) => module,
        Err(e) => {
          eprintln!("Load failed: {e}");
          return ExitCode::FAILURE;
        }
      };
      let mut vm = Vm::new(&module);
      vm.set_tracing(!no_trace);
      vm.run(&mut StdConsole);
      if vm.flags().has_fault() {
        tracing::warn!(flags = %vm.flags(), "program halted on a fault");
      }
    }
  }
  ExitCode::SUCCESS
}
