//! Display collaborators.
//!
//! The worker posts each result string here and moves on. Implementations must
//! be callable from any thread; anything UI-bound has to marshal onto its own
//! thread itself.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};

/// Receives formatted result strings (`"Result: <label>"`).
pub trait DisplaySink: Send + Sync {
    fn post(&self, text: String);
}

/// Writes results to the log at info level.
#[derive(Debug, Default)]
pub struct LogDisplay;

impl DisplaySink for LogDisplay {
    fn post(&self, text: String) {
        log::info!("{}", text);
    }
}

/// Forwards results over a channel to whichever thread owns the display.
pub struct ChannelDisplay {
    tx: Sender<String>,
}

impl ChannelDisplay {
    pub fn new() -> (Self, Receiver<String>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl DisplaySink for ChannelDisplay {
    fn post(&self, text: String) {
        if self.tx.send(text).is_err() {
            log::debug!("display receiver dropped; result discarded");
        }
    }
}

/// Keeps only the most recent result, like a text view showing the last update.
#[derive(Debug, Default)]
pub struct LatestLabel {
    text: Mutex<Option<String>>,
}

impl LatestLabel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest posted text, or `None` if nothing was ever classified.
    pub fn get(&self) -> Option<String> {
        self.text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DisplaySink for LatestLabel {
    fn post(&self, text: String) {
        *self.text.lock().unwrap_or_else(PoisonError::into_inner) = Some(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_label_overwrites() {
        let display = LatestLabel::new();
        assert_eq!(display.get(), None);
        display.post("Result: Acne".into());
        display.post("Result: Healthy".into());
        assert_eq!(display.get().as_deref(), Some("Result: Healthy"));
    }

    #[test]
    fn channel_display_forwards_in_order() {
        let (display, rx) = ChannelDisplay::new();
        display.post("Result: Eczema".into());
        display.post("Result: Rosacea".into());
        assert_eq!(rx.recv().unwrap(), "Result: Eczema");
        assert_eq!(rx.recv().unwrap(), "Result: Rosacea");

        drop(rx);
        // Receiver gone: posting is silently dropped.
        display.post("Result: Acne".into());
    }

    #[test]
    fn channel_display_posts_from_worker_threads() {
        let (display, rx) = ChannelDisplay::new();
        let display: std::sync::Arc<dyn DisplaySink> = std::sync::Arc::new(display);
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let display = display.clone();
                std::thread::spawn(move || display.post("Result: Healthy".into()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(rx.try_iter().count(), 2);
    }
}
