//! Terminal progress bar fed by the scheduler's progress channel.

use std::io::Write;

use tokio::sync::mpsc;
use wbm_core::scheduler::ProgressUpdate;

const BAR_WIDTH: usize = 40;

/// Draws the bar for each update until the channel closes.
pub async fn render_loop(mut rx: mpsc::Receiver<ProgressUpdate>) {
    let mut drew = false;
    while let Some(update) = rx.recv().await {
        render(update.processed, update.total);
        drew = true;
    }
    if drew {
        println!();
    }
}

fn render(current: usize, total: usize) {
    let ratio = if total > 0 {
        current as f64 / total as f64
    } else {
        0.0
    };
    let filled = (ratio * BAR_WIDTH as f64).round() as usize;
    let bar: String = "█".repeat(filled.min(BAR_WIDTH)) + &"-".repeat(BAR_WIDTH.saturating_sub(filled));
    print!("\r[{}] {}% ({}/{})", bar, (ratio * 100.0).round() as u32, current, total);
    let _ = std::io::stdout().flush();
}
