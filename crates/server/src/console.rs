use std::io::{self, BufRead};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

pub fn is_quit_command(line: &str) -> bool {
    matches!(line.trim(), "/quit" | "quit" | "exit")
}

/// Clears `running` when a quit command is typed on stdin. A closed stdin is
/// ignored so the server keeps running detached.
pub fn spawn_quit_watcher(running: Arc<AtomicBool>) -> io::Result<()> {
    thread::Builder::new().name("stdin".into()).spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };

            if is_quit_command(&line) {
                log::info!("Quit requested");
                running.store(false, Ordering::SeqCst);
                break;
            }
        }
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_commands() {
        assert!(is_quit_command("/quit"));
        assert!(is_quit_command("  quit\n"));
        assert!(is_quit_command("exit"));
        assert!(!is_quit_command("hello"));
        assert!(!is_quit_command(""));
    }
}
