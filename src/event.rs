use std::time::Duration;
use tokio::sync::mpsc;

/// Application events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
  /// Periodic tick for polling in-flight queries
  Tick,
  /// Ctrl-C
  Interrupt,
}

/// Event handler that produces ticks until interrupted
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
      let mut ticks = tokio::time::interval(tick_rate);
      let ctrl_c = tokio::signal::ctrl_c();
      tokio::pin!(ctrl_c);

      loop {
        tokio::select! {
          _ = ticks.tick() => {
            if tx.send(Event::Tick).is_err() {
              break;
            }
          }
          _ = &mut ctrl_c => {
            let _ = tx.send(Event::Interrupt);
            break;
          }
        }
      }
    });

    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
