use crate::server::relay::{OutputRelay, OutputStream, RelayFiles, RelaySummary, RelayTargets};

use tempfile::tempdir;
use tokio::io::{AsyncBufReadExt, BufReader};

fn lines_of(text: &'static str) -> tokio::io::Lines<BufReader<&'static [u8]>> {
    BufReader::new(text.as_bytes()).lines()
}

/// **VALUE**: Verifies every relayed line reaches the configured log file in order.
///
/// **WHY THIS MATTERS**: The stdout log is the only record of what the viewer server did when
/// something goes wrong in a notebook.
///
/// **BUG THIS CATCHES**: Would catch lost or reordered lines, or a file that is not flushed
/// when the relay finishes.
#[tokio::test]
async fn given_stdout_target_when_stream_ends_then_all_lines_are_written() {
    // GIVEN: A relay writing stdout into a temp directory that does not exist yet
    let dir = tempdir().unwrap();
    let log = dir.path().join("logs").join("server.out");
    let targets = RelayTargets {
        stdout: Some(log.clone()),
        stderr: None,
    };
    let mut relay = OutputRelay::new(targets.open().unwrap());

    // WHEN: Three lines are relayed and the stream ends
    relay.attach(OutputStream::Stdout, lines_of("one\ntwo\nthree\n"));
    let summary = relay.join().await;

    // THEN: The file holds the lines in order
    assert_eq!(
        summary,
        RelaySummary {
            written: 3,
            dropped: 0
        }
    );
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "one\ntwo\nthree\n");
}

/// **VALUE**: Verifies stdout and stderr are kept apart.
///
/// **WHY THIS MATTERS**: Server errors must not be buried in the regular output log.
///
/// **BUG THIS CATCHES**: Would catch the writer routing every line to the first open file.
#[tokio::test]
async fn given_both_targets_when_streams_end_then_each_file_gets_its_stream() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("server.out");
    let err = dir.path().join("server.err");
    let targets = RelayTargets {
        stdout: Some(out.clone()),
        stderr: Some(err.clone()),
    };
    let mut relay = OutputRelay::new(targets.open().unwrap());

    relay.attach(OutputStream::Stdout, lines_of("ready\n"));
    relay.attach(OutputStream::Stderr, lines_of("warning: slow disk\n"));
    let summary = relay.join().await;

    assert_eq!(summary.written, 2);
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "ready\n");
    assert_eq!(std::fs::read_to_string(&err).unwrap(), "warning: slow disk\n");
}

/// **VALUE**: Verifies output is still drained when no log file is configured.
///
/// **WHY THIS MATTERS**: An undrained pipe fills up and blocks the server on its next write.
///
/// **BUG THIS CATCHES**: Would catch the relay skipping streams without a destination, or
/// `join()` hanging when there is no writer thread.
#[tokio::test]
async fn given_no_targets_when_stream_ends_then_join_returns_without_writes() {
    let mut relay = OutputRelay::new(RelayFiles::default());

    relay.attach(OutputStream::Stdout, lines_of("a\nb\n"));
    assert_eq!(relay.dropped(), 0);
    let summary = relay.join().await;

    assert_eq!(summary, RelaySummary::default());
}

/// **VALUE**: Verifies stream names used in log messages.
///
/// **WHY THIS MATTERS**: Trace output is filtered by these names when debugging.
///
/// **BUG THIS CATCHES**: Would catch the two streams being labelled the same.
#[test]
fn given_output_streams_when_displayed_then_use_lowercase_names() {
    assert_eq!(OutputStream::Stdout.to_string(), "stdout");
    assert_eq!(OutputStream::Stderr.to_string(), "stderr");
}
