use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread;

const LINE_QUEUE: usize = 64;

pub enum ConsoleLine {
    Text(String),
    Quit,
}

/// Reads stdin on a helper thread so the tick loop never blocks.
pub struct Console {
    lines: Receiver<ConsoleLine>,
}

impl Console {
    pub fn spawn() -> io::Result<Self> {
        let (tx, rx) = mpsc::sync_channel(LINE_QUEUE);

        thread::Builder::new()
            .name("stdin".into())
            .spawn(move || read_lines(tx))?;

        Ok(Self { lines: rx })
    }

    pub fn try_next(&self) -> Option<ConsoleLine> {
        self.lines.try_recv().ok()
    }
}

fn read_lines(tx: SyncSender<ConsoleLine>) {
    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            break;
        };

        let entry = match line.trim() {
            "/quit" => ConsoleLine::Quit,
            "" => continue,
            _ => ConsoleLine::Text(line),
        };

        match tx.try_send(entry) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => log::warn!("Input queue full, line dropped"),
            Err(TrySendError::Disconnected(_)) => return,
        }
    }

    let _ = tx.send(ConsoleLine::Quit);
}
