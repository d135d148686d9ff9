use std::sync::Arc;
use std::time::Duration;

use finder_core::Station;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::{SourceError, StationSource};

/// Refresh period of the station the user is charging at.
pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub enum PollEvent<E> {
    Refreshed(Station),
    Failed(E),
    /// The station is no longer flagged or no longer exists. No further
    /// events follow.
    Stopped,
}

/// Periodically refreshes the station flagged `isChargingHere`.
///
/// At most one refresh is in flight; ticks that fire while one is pending are
/// skipped. Dropping the poller stops the timer and any pending refresh.
pub struct ChargingPoller<E> {
    events: mpsc::UnboundedReceiver<PollEvent<E>>,
    task: JoinHandle<()>,
}

impl<E: SourceError> ChargingPoller<E> {
    pub fn spawn<S>(source: Arc<S>, station_id: String, period: Duration) -> Self
    where
        S: StationSource<Error = E>,
    {
        let (sender, events) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut refreshes = JoinSet::new();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !refreshes.is_empty() {
                            tracing::debug!("Refresh of station {} still in flight, skipping", station_id);
                            continue;
                        }
                        let source = Arc::clone(&source);
                        let id = station_id.clone();
                        refreshes.spawn(async move { source.fetch_station(&id).await });
                    }
                    Some(joined) = refreshes.join_next() => {
                        let event = match joined {
                            Ok(Ok(station)) if station.is_charging_here => PollEvent::Refreshed(station),
                            Ok(Ok(station)) => {
                                tracing::info!("No longer charging at station {}", station.id);
                                let _ = sender.send(PollEvent::Refreshed(station));
                                PollEvent::Stopped
                            }
                            Ok(Err(err)) if err.is_not_found() => {
                                tracing::info!("Station {} disappeared", station_id);
                                PollEvent::Stopped
                            }
                            Ok(Err(err)) => {
                                tracing::warn!("Could not refresh station {}: {}", station_id, err);
                                PollEvent::Failed(err)
                            }
                            Err(err) => {
                                tracing::warn!("Refresh task of station {} failed: {}", station_id, err);
                                continue;
                            }
                        };
                        let stopped = matches!(event, PollEvent::Stopped);
                        if sender.send(event).is_err() || stopped {
                            break;
                        }
                    }
                }
            }
        });
        ChargingPoller { events, task }
    }

    /// Wait for the next event. `None` once the poller has stopped.
    pub async fn next(&mut self) -> Option<PollEvent<E>> {
        self.events.recv().await
    }
}

impl<E> Drop for ChargingPoller<E> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
