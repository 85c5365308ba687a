//! Header fuzz target: arbitrary text goes through `dissectgen::parse`, and every model
//! that parses goes through `dissectgen::generate`.
//!
//! Checked on each input:
//! - neither stage panics (layout arithmetic saturates, errors are typed)
//! - generation is deterministic: a second run yields the same bytes
//! - the dissector starts with the `config.h` include and has one `case` label and one
//!   dispatcher per parsed message
//!
//! Build with: cargo fuzz run parser_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let Ok(header) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(model) = dissectgen::parse(header) else {
        return;
    };
    let Ok(dissector) = dissectgen::generate(&model) else {
        return;
    };
    let again = dissectgen::generate(&model).expect("second generation of the same model");
    assert_eq!(dissector, again, "generation is not deterministic");
    assert!(dissector.starts_with("#include \"config.h\"\n"));
    for message in model.messages() {
        let case = format!("        case {}:\n", message.identifier);
        assert_eq!(dissector.matches(&case).count(), 1, "{}", message.identifier);
        let dispatcher = format!("static void dissect_{}(\n", message.identifier);
        assert_eq!(dissector.matches(&dispatcher).count(), 1, "{}", message.identifier);
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run parser_fuzz");
}
