// Benchmark helper functions - Rust's dead code analysis doesn't understand
// that these are used by benchmark files in the same directory
// See: https://users.rust-lang.org/t/cargo-rustc-benches-awarnings/110111/2
#[allow(dead_code)]
pub fn generate_routine(steps: usize) -> String {
    let mut content = String::from("void skills() {\n  auton::setPose(-36, 60, 90);\n");
    for step in 0..steps {
        let x = step as f64 * 1.5;
        match step % 4 {
            0 => content.push_str(&format!("  auton::moveTo({x}, 24, 1000, 90);\n")),
            1 => content.push_str(&format!("  // step {step}\n  auton::turnTo({x}, 0, 600);\n")),
            2 => content.push_str("  auton::intake();\n  auton::wait(250);\n"),
            _ => content.push_str(&format!(
                "  auton::follow(\"paths/step{step}.txt\", 3000, 12, /* reverse */ false);\n"
            )),
        }
    }
    content.push_str("}\n");
    content
}

/// Offset of the `n`th occurrence of `needle`
#[allow(dead_code)]
pub fn nth_offset(text: &str, needle: &str, n: usize) -> usize {
    text.match_indices(needle)
        .nth(n)
        .map(|(offset, _)| offset)
        .unwrap_or(0)
}
