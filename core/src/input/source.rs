use async_trait::async_trait;
use tokio::sync::mpsc;

use super::event::InputEvent;

/// A stream of human input events.
///
/// `next_event` must be cancel-safe: the watcher races it against the
/// shutdown signal and drops it when shutdown wins.
#[async_trait]
pub trait InputSource: Send {
    fn name(&self) -> &str;

    /// Wait for the next event. `None` means the source is exhausted.
    async fn next_event(&mut self) -> Option<InputEvent>;

    /// The engine accepted the event.
    async fn acknowledge(&mut self, _event: &InputEvent) {}

    /// The engine refused the event (e.g. unknown task id).
    async fn reject(&mut self, _event: &InputEvent, _reason: &str) {}
}

pub type InputSender = mpsc::Sender<InputEvent>;

/// Source fed through an in-process channel.
pub struct ChannelInputSource {
    rx: mpsc::Receiver<InputEvent>,
}

/// Create a bounded channel source. The source ends once every sender is
/// dropped and the buffer is drained.
pub fn channel_source(capacity: usize) -> (InputSender, ChannelInputSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, ChannelInputSource { rx })
}

#[async_trait]
impl InputSource for ChannelInputSource {
    fn name(&self) -> &str {
        "channel"
    }

    async fn next_event(&mut self) -> Option<InputEvent> {
        self.rx.recv().await
    }
}
