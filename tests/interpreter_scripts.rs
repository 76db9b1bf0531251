// Script-level tests: small programs through the library, whole scripts
// through the real binary.

use std::io::Write;
use std::process::Command;

use test_case::test_case;
use uvforth::runtime::built_ins::{base_words::register_base_words, uv_words::register_uv_words};
use uvforth::runtime::data_structures::value::Value;
use uvforth::runtime::error::Result;
use uvforth::runtime::interpreter::forth_interpreter::ForthInterpreter;
use uvforth::runtime::interpreter::{CodeManagement, InterpreterStack};

fn eval_and_stack(source: &str) -> Result<Vec<Value>> {
    let mut interp = ForthInterpreter::new()?;

    register_base_words(&mut interp);
    register_uv_words(&mut interp);

    interp.process_source("<test>", source)?;
    Ok(interp.stack().clone())
}

#[test_case("42", &[Value::Int(42)]; "integer literal")]
#[test_case("0x2a 052 42", &[Value::Int(42), Value::Int(42), Value::Int(42)]; "every base")]
#[test_case("\"hi\"", &[Value::Str(b"hi".to_vec())]; "string literal")]
#[test_case("1 dup", &[Value::Int(1), Value::Int(1)]; "dup")]
#[test_case("1 2 drop", &[Value::Int(1)]; "drop")]
#[test_case("( ignored ) 1 \\ also ignored", &[Value::Int(1)]; "comments")]
#[test_case(": f 1 ; f", &[Value::Int(1)]; "colon definition")]
#[test_case(": f 1 ; : f 2 ; f", &[Value::Int(2)]; "newest definition wins")]
#[test_case(": f g ; : g 3 ; f", &[Value::Int(3)]; "late binding")]
#[test_case(": f \"x\" dup ; f drop", &[Value::Str(b"x".to_vec())]; "definitions nest words")]
fn scripts_leave_the_expected_stack(source: &str, expected: &[Value]) {
    assert_eq!(eval_and_stack(source).unwrap(), expected);
}

#[test_case("nope", "Unknown word"; "unknown word")]
#[test_case("]", "Unexpected ']'"; "stray close bracket")]
#[test_case("[ 1", "Unclosed quotation"; "unclosed quotation")]
#[test_case("drop", "Stack underflow"; "underflow")]
#[test_case(":", "Expected a name"; "missing definition name")]
fn bad_scripts_fail_with_a_diagnostic(source: &str, fragment: &str) {
    let error = eval_and_stack(source).unwrap_err();

    assert!(
        error.error().contains(fragment),
        "expected '{}' in '{}'",
        fragment,
        error.error()
    );
}

#[test]
fn a_quotation_is_one_value() {
    let stack = eval_and_stack("[ \"x\" print ]").unwrap();

    assert_eq!(stack.len(), 1);
    assert!(stack[0].is_quote());
}

// Everything below exercises the installed binary, prompt excluded.

fn run_scripts(sources: &[&str]) -> std::process::Output {
    let files: Vec<tempfile::NamedTempFile> = sources
        .iter()
        .map(|source| {
            let mut file = tempfile::NamedTempFile::new().expect("could not create a script file");

            file.write_all(source.as_bytes()).unwrap();
            file.flush().unwrap();
            file
        })
        .collect();

    let mut command = Command::new(env!("CARGO_BIN_EXE_uvforth"));

    for file in &files {
        command.arg(file.path());
    }

    command.output().expect("failed to run the interpreter")
}

#[test]
fn greet_writes_hello_and_exits_cleanly() {
    let output = run_scripts(&[": greet \"hello\" print cr ; greet"]);

    assert!(output.status.success());
    assert_eq!(output.stdout, b"hello\n");
}

#[test]
fn script_files_run_in_order() {
    let output = run_scripts(&[": greet \"one\" print cr ;", "greet \"two\" print cr"]);

    assert!(output.status.success());
    assert_eq!(output.stdout, b"one\ntwo\n");
}

#[test]
fn words_lists_the_whole_vocabulary() {
    let output = run_scripts(&["words"]);

    assert!(output.status.success());

    let listing = String::from_utf8(output.stdout).unwrap();
    assert!(listing.ends_with('\n'));

    for name in [
        "dup",
        "drop",
        "cr",
        "print",
        "bye",
        "words",
        "uv:run",
        "uv:timer",
        "uv:timer-start",
        "uv:timer-stop",
        "uv:close",
        "uv:tcp",
        "uv:tcp-bind",
        "uv:listen",
        "uv:read-start",
        "uv:tcp-connect",
        "uv:write",
    ] {
        assert!(
            listing.split_whitespace().any(|word| word == name),
            "missing {} in listing",
            name
        );
    }
}

#[test]
fn a_timer_callback_prints_and_stops_the_loop() {
    let output =
        run_scripts(&["uv:timer 100 0 [ \"tick\" print cr drop bye ] uv:timer-start uv:run"]);

    assert!(output.status.success());
    assert_eq!(output.stdout, b"tick\n");
}

#[test]
fn a_fatal_error_exits_with_code_one() {
    let output = run_scripts(&["nope"]);

    assert_eq!(output.status.code(), Some(1));

    let diagnostics = String::from_utf8_lossy(&output.stderr);
    assert!(diagnostics.contains("Unknown word 'nope'"));
}

#[test]
fn an_unreadable_script_exits_with_code_one() {
    let output = Command::new(env!("CARGO_BIN_EXE_uvforth"))
        .arg("definitely/not/a/real/script.f")
        .output()
        .expect("failed to run the interpreter");

    assert_eq!(output.status.code(), Some(1));
}
