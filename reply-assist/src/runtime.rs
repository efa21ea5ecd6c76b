//! Drives an [`Overlay`] on the tokio runtime: host events arrive over a
//! channel and the scheduler's virtual clock follows wall time.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

use crate::controller::{HostEvent, Overlay};
use crate::dom::HostDom;
use crate::error::AppError;

/// Maps wall time onto the overlay's millisecond clock.
struct Clock {
    origin: Instant,
    base_ms: u64,
}

impl Clock {
    fn starting_at(base_ms: u64) -> Self {
        Self {
            origin: Instant::now(),
            base_ms,
        }
    }

    fn now_ms(&self) -> u64 {
        self.base_ms + self.origin.elapsed().as_millis() as u64
    }

    fn instant_of(&self, ms: u64) -> Instant {
        self.origin + Duration::from_millis(ms.saturating_sub(self.base_ms))
    }
}

/// Runs until the event channel closes, then hands the overlay back.
pub async fn run<D: HostDom>(
    mut overlay: Overlay<D>,
    mut events: mpsc::UnboundedReceiver<HostEvent>,
) -> Overlay<D> {
    let clock = Clock::starting_at(overlay.now_ms());
    info!("overlay runtime started");

    loop {
        let deadline = overlay.next_deadline().map(|ms| clock.instant_of(ms));

        tokio::select! {
            biased;

            event = events.recv() => match event {
                Some(event) => {
                    overlay.advance_to(clock.now_ms());
                    let consumed = overlay.handle_event(event);
                    debug!(consumed, "host event handled");
                }
                None => break,
            },
            _ = sleep_until(deadline.unwrap_or(clock.origin)), if deadline.is_some() => {
                overlay.advance_to(clock.now_ms());
            }
        }
    }

    info!(
        pending = overlay.pending_tasks(),
        "overlay runtime stopped"
    );
    overlay
}

/// Sending side of a spawned overlay.
pub struct OverlayHandle<D: HostDom> {
    events: mpsc::UnboundedSender<HostEvent>,
    task: JoinHandle<Overlay<D>>,
}

impl<D> OverlayHandle<D>
where
    D: HostDom + Send + 'static,
{
    pub fn send(&self, event: HostEvent) -> Result<(), AppError> {
        self.events
            .send(event)
            .map_err(|_| AppError::Runtime("overlay task is no longer running".to_string()))
    }

    /// Closes the event channel and waits for the overlay to drain.
    pub async fn shutdown(self) -> Result<Overlay<D>, AppError> {
        drop(self.events);
        self.task
            .await
            .map_err(|err| AppError::Runtime(format!("overlay task failed: {err}")))
    }
}

/// Spawns [`run`] on the current tokio runtime.
pub fn spawn<D>(overlay: Overlay<D>) -> OverlayHandle<D>
where
    D: HostDom + Send + 'static,
{
    let (events, receiver) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(overlay, receiver));
    OverlayHandle { events, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverlayConfig;
    use crate::dom::{MemoryDom, NodeId};
    use crate::geometry::{Rect, Size};
    use crate::settings::Settings;

    fn started_overlay() -> Overlay<MemoryDom> {
        let mut dom = MemoryDom::new("/home", Size::new(1280.0, 800.0));
        let body = dom.body();
        let form = dom.element(body, "form", &[]);
        let input = dom.element(form, "textarea", &[("data-testid", "tweetTextarea_0")]);
        let submit = dom.element(form, "button", &[("data-testid", "tweetButton")]);
        dom.set_rect(input, Rect::new(100.0, 100.0, 400.0, 40.0));
        dom.set_rect(submit, Rect::new(420.0, 150.0, 80.0, 32.0));

        let mut overlay =
            Overlay::new(dom, OverlayConfig::default(), Settings::default()).unwrap();
        overlay.start();
        overlay
    }

    fn live_button(overlay: &Overlay<MemoryDom>) -> Option<NodeId> {
        overlay
            .session()
            .button
            .map(|button| button.node)
            .filter(|node| overlay.dom().is_connected(*node))
    }

    #[tokio::test(start_paused = true)]
    async fn timers_fire_on_wall_clock() {
        let mut overlay = started_overlay();
        let original = live_button(&overlay).unwrap();
        overlay.dom_mut().remove(original);

        let handle = spawn(overlay);
        tokio::time::sleep(Duration::from_millis(150)).await;
        let overlay = handle.shutdown().await.unwrap();

        let rebuilt = live_button(&overlay).unwrap();
        assert_ne!(rebuilt, original);
        assert!(overlay.now_ms() >= 100);
    }

    #[tokio::test(start_paused = true)]
    async fn events_reach_the_overlay_in_order() {
        let handle = spawn(started_overlay());
        handle
            .send(HostEvent::SettingsChanged(Settings {
                enabled: false,
                ..Settings::default()
            }))
            .unwrap();
        handle.send(HostEvent::Mutation).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let overlay = handle.shutdown().await.unwrap();
        assert!(!overlay.settings().enabled);
        assert_eq!(live_button(&overlay), None);
    }

    #[tokio::test]
    async fn send_fails_once_the_receiver_is_gone() {
        let (events, receiver) = mpsc::unbounded_channel();
        drop(receiver);
        let handle = OverlayHandle::<MemoryDom> {
            events,
            task: tokio::spawn(async { started_overlay() }),
        };
        assert!(matches!(
            handle.send(HostEvent::Scroll),
            Err(AppError::Runtime(_))
        ));
        assert!(handle.shutdown().await.is_ok());
    }
}
