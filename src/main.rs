use std::path::Path;
use std::process::ExitCode;
use std::{env, fs, io};

use spooky::bytecode::disasm::print_executable;
use spooky::bytecode::{CodegenOptions, Executable};
use spooky::lang::TypedProgram;
use spooky::runtime::Vm;

fn main() -> ExitCode {
    match run(env::args().skip(1).collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(1)
        }
    }
}

fn run(args: Vec<String>) -> Result<(), String> {
    let Some(command) = args.first() else {
        return Err(usage());
    };
    match command.as_str() {
        "compile" => cmd_compile(&args[1..]),
        "run" => cmd_run(&args[1..]),
        "disasm" => cmd_disasm(&args[1..]),
        "help" | "--help" | "-h" => {
            println!("{}", usage());
            Ok(())
        }
        other => Err(format!("unknown command '{}'\n\n{}", other, usage())),
    }
}

fn usage() -> String {
    [
        "SPOOKY - typed program back end and register VM",
        "",
        "Usage:",
        "  spooky compile <typed.ast> <out.spook> [--optimize]",
        "  spooky run <exe.spook>",
        "  spooky disasm <exe.spook>",
    ]
    .join("\n")
}

fn cmd_compile(args: &[String]) -> Result<(), String> {
    let mut paths = Vec::new();
    let mut options = CodegenOptions::default();
    for arg in args {
        match arg.as_str() {
            "-O" | "--optimize" => options.optimize = true,
            flag if flag.starts_with('-') => return Err(format!("unknown flag '{}'", flag)),
            path => paths.push(path),
        }
    }
    let &[input, output] = paths.as_slice() else {
        return Err("usage: spooky compile <typed.ast> <out.spook> [--optimize]".to_string());
    };

    let bytes = fs::read(input).map_err(|e| format!("failed to read '{}': {}", input, e))?;
    let program = TypedProgram::decode(&bytes)
        .map_err(|e| format!("'{}' is not a typed program: {}", input, e))?;

    let name = Path::new(output)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("a");
    let exe = spooky::compile(name, &program, &options)
        .map_err(|e| format!("{}: {}", input, e))?;
    let encoded = exe.to_bytes();
    fs::write(output, &encoded).map_err(|e| format!("failed to write '{}': {}", output, e))?;
    println!(
        "compiled '{}' -> '{}' ({} instructions, {} bytes)",
        input,
        output,
        exe.text().len(),
        encoded.len()
    );
    Ok(())
}

fn cmd_run(args: &[String]) -> Result<(), String> {
    let [input] = args else {
        return Err("usage: spooky run <exe.spook>".to_string());
    };
    let exe = load(input)?;
    let mut vm = Vm::builder(exe).std_lib(io::stdout()).build();
    vm.run().map_err(|e| {
        format!(
            "runtime error at {:04} after {} instructions: {}",
            vm.ip(),
            vm.instructions(),
            e
        )
    })
}

fn cmd_disasm(args: &[String]) -> Result<(), String> {
    let [input] = args else {
        return Err("usage: spooky disasm <exe.spook>".to_string());
    };
    print_executable(&load(input)?);
    Ok(())
}

fn load(path: &str) -> Result<Executable, String> {
    let bytes = fs::read(path).map_err(|e| format!("failed to read '{}': {}", path, e))?;
    Executable::from_bytes(&bytes).map_err(|e| format!("{}: {}", path, e))
}
