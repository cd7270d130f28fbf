use crossterm::cursor::MoveToColumn;
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};
use std::io::Write;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const TICK: Duration = Duration::from_millis(100);

/// Progress indicator running as a background task.
///
/// Call [`Spinner::finish`] to stop it and wait until its line is cleared.
/// Dropping an unfinished spinner aborts the task.
pub struct Spinner {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Spinner {
    pub fn start_on<W>(mut out: W, label: &str) -> Self
    where
        W: Write + Send + 'static,
    {
        let token = CancellationToken::new();
        let stop = token.clone();
        let label = label.to_string();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK);
            let mut frame = 0usize;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let glyph = FRAMES[frame % FRAMES.len()];
                        frame += 1;
                        let _ = queue!(out, MoveToColumn(0), Clear(ClearType::CurrentLine));
                        let _ = write!(out, "{glyph} {label}");
                        let _ = out.flush();
                    }
                }
            }
            let _ = queue!(out, MoveToColumn(0), Clear(ClearType::CurrentLine));
            let _ = out.flush();
        });

        Self {
            token,
            task: Some(task),
        }
    }

    pub async fn finish(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::debug!(error = %e, "spinner task ended abnormally");
            }
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
