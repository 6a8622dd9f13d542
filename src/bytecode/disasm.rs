use crate::bytecode::{Executable, Instruction};
use std::collections::BTreeSet;
use std::fmt::Write;

/// Print disassembly of an executable
pub fn print_executable(exe: &Executable) {
    print!("{}", render(exe));
}

/// Return disassembly as a String
pub fn render(exe: &Executable) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "════════════════════════════════════════");
    let _ = writeln!(output, " {}", exe.name());
    let _ = writeln!(
        output,
        " {} instructions, {} data cells",
        exe.text().len(),
        exe.data().len()
    );
    let _ = writeln!(output, "════════════════════════════════════════");
    output.push_str(&disassemble_text(exe.text()));
    output.push_str(&render_data(exe.data()));
    output
}

/// One line per instruction, `►` on every jump target.
pub fn disassemble_text(text: &[Instruction]) -> String {
    let jump_targets = collect_jump_targets(text);
    let mut output = String::new();
    for (ip, instruction) in text.iter().enumerate() {
        let marker = if jump_targets.contains(&(ip as i32)) {
            '►'
        } else {
            ' '
        };
        let _ = writeln!(output, "{:04}{} {}", ip, marker, instruction);
    }
    output
}

fn collect_jump_targets(text: &[Instruction]) -> BTreeSet<i32> {
    text.iter().filter_map(Instruction::jump_target).collect()
}

fn render_data(data: &[i32]) -> String {
    let cells: Vec<String> = data.iter().map(|v| v.to_string()).collect();
    format!("data: [{}]\n", cells.join(", "))
}
