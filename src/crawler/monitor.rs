//! Operator input monitor
//!
//! One task owns stdin for the whole process. Empty lines feed the
//! stop trigger: three consecutive empty lines request a cooperative
//! shutdown via the shared cancellation flag. Non-empty lines are
//! forwarded to whoever is waiting on operator confirmation, which is
//! how the CAPTCHA gate hears "solved".

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Consecutive empty lines that request shutdown
const STOP_THRESHOLD: u32 = 3;

/// Handles shared between the monitor task and the crawl
pub struct MonitorHandles {
    /// Set once the stop trigger fires; checked between crawl steps
    pub cancel: Arc<AtomicBool>,
    /// Non-empty operator lines, in order
    pub confirmations: mpsc::UnboundedReceiver<String>,
}

/// Spawns the blocking stdin reader and returns its handles
///
/// The reader runs on a detached OS thread, not a runtime blocking task:
/// stdin on a TTY never hits EOF, and a blocking task stuck in `read`
/// would keep the runtime's shutdown waiting forever after the crawl
/// finishes. A detached thread just dies with the process.
pub fn spawn_stdin_monitor() -> MonitorHandles {
    let cancel = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::unbounded_channel();

    let flag = cancel.clone();
    spawn_reader_thread(move || {
        let stdin = std::io::stdin();
        monitor_input(stdin.lock(), &flag, &tx);
    });

    MonitorHandles {
        cancel,
        confirmations: rx,
    }
}

fn spawn_reader_thread(read_loop: impl FnOnce() + Send + 'static) {
    std::thread::spawn(read_loop);
}

fn monitor_input<R: BufRead>(
    reader: R,
    cancel: &AtomicBool,
    confirmations: &mpsc::UnboundedSender<String>,
) {
    let mut empty_streak = 0u32;

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!("Stdin read error, stopping monitor: {}", e);
                return;
            }
        };

        if line.trim().is_empty() {
            empty_streak += 1;
            if empty_streak >= STOP_THRESHOLD {
                tracing::info!("Stop requested from console");
                cancel.store(true, Ordering::SeqCst);
                return;
            }
        } else {
            empty_streak = 0;
            if confirmations.send(line).is_err() {
                // Receiver gone, crawl is over.
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_three_empty_lines_trigger_cancel() {
        let cancel = AtomicBool::new(false);
        let (tx, _rx) = mpsc::unbounded_channel();
        monitor_input(Cursor::new("\n\n\n"), &cancel, &tx);
        assert!(cancel.load(Ordering::SeqCst));
    }

    #[test]
    fn test_nonempty_line_resets_streak() {
        let cancel = AtomicBool::new(false);
        let (tx, mut rx) = mpsc::unbounded_channel();
        monitor_input(Cursor::new("\n\nsolved\n\n\n"), &cancel, &tx);
        assert!(!cancel.load(Ordering::SeqCst));
        assert_eq!(rx.try_recv().unwrap(), "solved");
    }

    #[test]
    fn test_nonempty_lines_forwarded_in_order() {
        let cancel = AtomicBool::new(false);
        let (tx, mut rx) = mpsc::unbounded_channel();
        monitor_input(Cursor::new("first\nsecond\n"), &cancel, &tx);
        assert_eq!(rx.try_recv().unwrap(), "first");
        assert_eq!(rx.try_recv().unwrap(), "second");
    }

    #[test]
    fn test_blocked_reader_does_not_delay_runtime_shutdown() {
        use std::io::BufReader;
        use std::net::{TcpListener, TcpStream};
        use std::time::{Duration, Instant};

        // A connected socket with no data and no close: reads block
        // indefinitely, like stdin on an idle TTY.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let _writer = TcpStream::connect(addr).unwrap();
        let (reader, _) = listener.accept().unwrap();

        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, _rx) = mpsc::unbounded_channel();
        let flag = cancel.clone();
        spawn_reader_thread(move || {
            monitor_input(BufReader::new(reader), &flag, &tx);
        });

        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {});

        let started = Instant::now();
        drop(runtime);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_whitespace_only_counts_as_empty() {
        let cancel = AtomicBool::new(false);
        let (tx, _rx) = mpsc::unbounded_channel();
        monitor_input(Cursor::new("  \n\t\n \n"), &cancel, &tx);
        assert!(cancel.load(Ordering::SeqCst));
    }
}
