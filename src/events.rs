use crossbeam_channel::{unbounded, Receiver, Sender};

/// Asynchronous application events posted from OS callbacks, hotkeys or
/// capture backends, handled on the application thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    Restart,
    Benchmark,
    /// The captured window went away; fall back to desktop capture.
    WindowClosed,
    ToggleActive,
    Quit,
}

#[derive(Clone)]
pub struct EventSender(Sender<AppEvent>);

impl EventSender {
    pub fn post(&self, event: AppEvent) {
        let _ = self.0.send(event);
    }
}

pub struct EventQueue {
    sender: Sender<AppEvent>,
    receiver: Receiver<AppEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    pub fn sender(&self) -> EventSender {
        EventSender(self.sender.clone())
    }

    pub fn post(&self, event: AppEvent) {
        let _ = self.sender.send(event);
    }

    /// Takes everything queued right now. Events posted while the batch is
    /// handled land in the next batch.
    pub fn drain(&self) -> Vec<AppEvent> {
        self.receiver.try_iter().collect()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
