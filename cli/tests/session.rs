use cli::run_session;
use std::io::Cursor;
use thread_stdio::StdioConfig;

fn config() -> StdioConfig {
    StdioConfig {
        wait_slice_ms: Some(10),
        ..StdioConfig::default()
    }
}

fn session(input: &str, nonblocking: bool) -> (i32, String) {
    let mut output = Vec::new();
    let code = run_session(
        config(),
        nonblocking,
        Cursor::new(input.as_bytes().to_vec()),
        &mut output,
    )
    .unwrap();
    (code, String::from_utf8(output).unwrap())
}

#[test]
fn test_commands() {
    let (code, output) = session("echo hi\nupper abc\ncount\nquit 3\n", false);
    assert_eq!(code, 3);
    assert_eq!(output, "> hi\n> ABC\n> 3\n> bye\n");
}

#[test]
fn test_end_of_input_quits() {
    let (code, output) = session("echo x\n", false);
    assert_eq!(code, 0);
    assert_eq!(output, "> x\n> bye\n");
}

#[test]
fn test_unknown_and_empty() {
    let (_, output) = session("\nfrobnicate\nquit\n", true);
    assert_eq!(output, "> > unknown command: frobnicate\n> bye\n");
}

#[test]
fn test_spam_fits_in_capacity() {
    let (code, output) = session("spam 3\nquit\n", true);
    assert_eq!(code, 0);
    assert_eq!(
        output,
        "> spam 0\nspam 1\nspam 2\nspam: 3 of 3 lines\n> bye\n"
    );
}

#[test]
fn test_input_after_quit_is_ignored() {
    let (code, output) = session("quit 7\necho never\n", false);
    assert_eq!(code, 7);
    assert_eq!(output, "> bye\n");
}

#[test]
fn test_load_config_capacity_override() {
    let config = cli::load_config(None, Some(8)).unwrap();
    assert_eq!(config.capacity, 8);
    assert!(cli::load_config(None, Some(0)).is_err());
}
