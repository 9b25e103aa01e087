//! Progress indicators
//!
//! The batch bar starts hidden and only appears once a run has taken longer
//! than [`SHOW_AFTER`], so quick conversions print nothing but results.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long a batch runs before its progress bar is drawn
pub const SHOW_AFTER: Duration = Duration::from_millis(500);

fn file_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} files {msg}")
        .map(|style| style.progress_chars("█▓░"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// File progress bar that stays hidden for short batches.
///
/// A watcher thread switches the bar to stderr once the delay passes, so a
/// single slow file still gets a spinner while it is being worked on.
pub struct DeferredProgress {
    bar: ProgressBar,
    started: Instant,
    visible: Arc<AtomicBool>,
    watcher: Option<(Sender<()>, JoinHandle<()>)>,
}

impl DeferredProgress {
    /// Bar for `total` files, shown after [`SHOW_AFTER`] when stderr is a
    /// terminal someone is watching
    pub fn new(total: u64) -> Self {
        Self::with_delay(total, SHOW_AFTER, console::user_attended_stderr())
    }

    /// Bar with an explicit delay; `enabled = false` never draws
    pub fn with_delay(total: u64, delay: Duration, enabled: bool) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::hidden());
        bar.set_style(file_style());
        let visible = Arc::new(AtomicBool::new(false));

        let watcher = if enabled {
            spawn_watcher(bar.clone(), Arc::clone(&visible), delay)
        } else {
            None
        };

        Self {
            bar,
            started: Instant::now(),
            visible,
            watcher,
        }
    }

    /// Name the file being worked on
    pub fn start_file(&mut self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    /// Mark one file as done
    pub fn finish_file(&mut self) {
        self.bar.inc(1);
    }

    /// Whether the bar has been drawn
    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }

    /// Files marked done so far
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Clear the bar and return how long the batch took
    pub fn finish(mut self) -> Duration {
        if let Some((stop, handle)) = self.watcher.take() {
            let _ = stop.send(());
            let _ = handle.join();
        }
        if self.is_visible() {
            self.bar.finish_and_clear();
        }
        self.started.elapsed()
    }
}

/// Wait for `delay` unless told to stop (or the sender is dropped), then
/// draw the bar. Returns `None` if the thread could not be started, in
/// which case the bar stays hidden.
fn spawn_watcher(
    bar: ProgressBar,
    visible: Arc<AtomicBool>,
    delay: Duration,
) -> Option<(Sender<()>, JoinHandle<()>)> {
    let (stop, stopped) = mpsc::channel::<()>();
    let handle = thread::Builder::new()
        .name("progress-reveal".into())
        .spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(delay) {
                bar.set_draw_target(ProgressDrawTarget::stderr());
                bar.enable_steady_tick(Duration::from_millis(100));
                visible.store(true, Ordering::Release);
            }
        })
        .ok()?;
    Some((stop, handle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_until_visible(progress: &DeferredProgress) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if progress.is_visible() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        progress.is_visible()
    }

    #[test]
    fn test_hidden_for_fast_batch() {
        let mut progress = DeferredProgress::with_delay(3, Duration::from_secs(60), true);
        for _ in 0..3 {
            progress.start_file("a.heic");
            progress.finish_file();
        }
        assert!(!progress.is_visible());
        assert_eq!(progress.position(), 3);
        assert!(progress.finish() < Duration::from_secs(60));
    }

    #[test]
    fn test_shown_once_delay_passes() {
        let mut progress = DeferredProgress::with_delay(2, Duration::ZERO, true);
        progress.start_file("a.heic");
        assert!(wait_until_visible(&progress));
        progress.finish_file();
        progress.finish();
    }

    #[test]
    fn test_shown_while_single_slow_file_runs() {
        let mut progress = DeferredProgress::with_delay(1, Duration::from_millis(20), true);
        progress.start_file("huge.heic");
        assert!(wait_until_visible(&progress));
        assert_eq!(progress.position(), 0);
        progress.finish_file();
        progress.finish();
    }

    #[test]
    fn test_disabled_never_shows() {
        let mut progress = DeferredProgress::with_delay(1, Duration::ZERO, false);
        progress.start_file("a.heic");
        progress.finish_file();
        thread::sleep(Duration::from_millis(20));
        assert!(!progress.is_visible());
        progress.finish();
    }
}
