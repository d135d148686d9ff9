use std::sync::{Arc, Mutex};
use std::time::Duration;

use finder_core::charging::TICK_INTERVAL;
use finder_core::{
    ChargeContext, ChargingSimulator, ChargingStatus, CoreError, PaymentMethod, TickOutcome,
    Ticket,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::lock;

/// What the detail page renders for the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargingSnapshot {
    pub status: ChargingStatus,
    pub progress: u8,
    pub cancelled: bool,
    pub confirming_stop: bool,
    pub has_ticket: bool,
}

impl ChargingSnapshot {
    fn of(simulator: &ChargingSimulator) -> Self {
        ChargingSnapshot {
            status: simulator.status(),
            progress: simulator.progress(),
            cancelled: simulator.was_cancelled(),
            confirming_stop: simulator.is_confirming_stop(),
            has_ticket: simulator.has_ticket(),
        }
    }
}

/// A [`ChargingSimulator`] driven by a tokio interval.
///
/// The timer task only exists while the simulator is charging. It is aborted
/// on completion, on a confirmed stop, on logout and when the run is dropped.
pub struct ChargingRun {
    simulator: Arc<Mutex<ChargingSimulator>>,
    snapshots: Arc<watch::Sender<ChargingSnapshot>>,
    timer: Option<JoinHandle<()>>,
    interval: Duration,
}

impl ChargingRun {
    pub fn new(simulator: ChargingSimulator) -> Self {
        Self::with_interval(simulator, TICK_INTERVAL)
    }

    pub fn with_interval(simulator: ChargingSimulator, interval: Duration) -> Self {
        let (snapshots, _) = watch::channel(ChargingSnapshot::of(&simulator));
        ChargingRun {
            simulator: Arc::new(Mutex::new(simulator)),
            snapshots: Arc::new(snapshots),
            timer: None,
            interval,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ChargingSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> ChargingSnapshot {
        ChargingSnapshot::of(&lock(&self.simulator))
    }

    pub fn ticket(&self) -> Option<Ticket> {
        lock(&self.simulator).ticket().cloned()
    }

    /// Whether the timer task is still alive.
    pub fn is_ticking(&self) -> bool {
        self.timer.as_ref().is_some_and(|timer| !timer.is_finished())
    }

    /// Apply `f` to the simulator and publish the resulting snapshot.
    fn update<R>(&self, f: impl FnOnce(&mut ChargingSimulator) -> R) -> R {
        let mut simulator = lock(&self.simulator);
        let result = f(&mut simulator);
        self.snapshots.send_replace(ChargingSnapshot::of(&simulator));
        result
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    pub fn context(
        &self,
        station_status: finder_core::Availability,
        vehicle_compatible: Option<bool>,
    ) -> ChargeContext {
        lock(&self.simulator).context(station_status, vehicle_compatible)
    }

    pub fn buy_ticket(
        &self,
        method: &PaymentMethod,
        price_label: impl Into<String>,
    ) -> Result<Ticket, CoreError> {
        self.update(|simulator| simulator.buy_ticket(method, price_label).cloned())
    }

    /// Start charging and the timer. Must be called inside a tokio runtime.
    pub fn start(&mut self, context: &ChargeContext) -> bool {
        if !self.update(|simulator| simulator.start(context)) {
            return false;
        }
        self.stop_timer();

        let simulator = Arc::clone(&self.simulator);
        let snapshots = Arc::clone(&self.snapshots);
        let period = self.interval;
        self.timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let outcome = {
                    let mut simulator = lock(&simulator);
                    let outcome = simulator.tick();
                    snapshots.send_replace(ChargingSnapshot::of(&simulator));
                    outcome
                };
                match outcome {
                    TickOutcome::Progressed(progress) => {
                        tracing::debug!("Charging progress {}%", progress);
                    }
                    TickOutcome::Completed | TickOutcome::Ignored => break,
                }
            }
        }));
        true
    }

    pub fn request_stop(&self) -> bool {
        self.update(ChargingSimulator::request_stop)
    }

    pub fn dismiss_stop(&self) {
        self.update(ChargingSimulator::dismiss_stop);
    }

    pub fn confirm_stop(&mut self) -> bool {
        let stopped = self.update(ChargingSimulator::confirm_stop);
        if stopped {
            self.stop_timer();
        }
        stopped
    }

    pub fn dismiss_completion(&mut self) {
        self.stop_timer();
        self.update(ChargingSimulator::dismiss_completion);
    }

    pub fn set_authenticated(&mut self, authenticated: bool) {
        if !authenticated {
            self.stop_timer();
        }
        self.update(|simulator| simulator.set_authenticated(authenticated));
    }
}

impl Drop for ChargingRun {
    fn drop(&mut self) {
        self.stop_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finder_core::Availability;

    fn ready_run() -> ChargingRun {
        let run = ChargingRun::new(ChargingSimulator::new(true));
        run.buy_ticket(
            &PaymentMethod {
                id: "ewallet".into(),
                label: "E-wallet".into(),
            },
            "IDR 2466/kWh",
        )
        .expect("Could not buy a ticket");
        run
    }

    fn start(run: &mut ChargingRun) -> bool {
        let context = run.context(Availability::Available, Some(true));
        run.start(&context)
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_completes_and_clears_the_timer() {
        let mut run = ready_run();
        let mut snapshots = run.subscribe();
        assert!(start(&mut run));
        assert!(run.is_ticking());

        let done = snapshots
            .wait_for(|s| s.status == ChargingStatus::Done)
            .await
            .expect("Timer dropped the channel")
            .clone();
        assert_eq!(done.progress, 100);
        assert!(done.has_ticket);
        assert_eq!(
            run.ticket().map(|ticket| ticket.price_label),
            Some("IDR 2466/kWh".to_string())
        );

        tokio::task::yield_now().await;
        assert!(!run.is_ticking());

        run.dismiss_completion();
        assert_eq!(run.snapshot().status, ChargingStatus::Idle);
        assert_eq!(run.snapshot().progress, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_refused_without_ticket_spawns_nothing() {
        let mut run = ChargingRun::new(ChargingSimulator::new(true));
        assert!(!start(&mut run));
        assert!(!run.is_ticking());
        tokio::time::sleep(TICK_INTERVAL * 5).await;
        assert_eq!(run.snapshot().progress, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_stop_cancels_the_timer() {
        let mut run = ready_run();
        assert!(start(&mut run));
        tokio::time::sleep(TICK_INTERVAL * 3 + Duration::from_millis(10)).await;
        assert_eq!(run.snapshot().progress, 12);

        assert!(run.request_stop());
        assert!(run.snapshot().confirming_stop);
        assert!(run.confirm_stop());
        assert!(!run.is_ticking());

        tokio::time::sleep(TICK_INTERVAL * 5).await;
        let snapshot = run.snapshot();
        assert_eq!(snapshot.status, ChargingStatus::Idle);
        assert_eq!(snapshot.progress, 0);
        assert!(snapshot.cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_stops_session_and_drops_ticket() {
        let mut run = ready_run();
        assert!(start(&mut run));
        tokio::time::sleep(TICK_INTERVAL * 2 + Duration::from_millis(10)).await;

        run.set_authenticated(false);
        assert!(!run.is_ticking());
        let snapshot = run.snapshot();
        assert_eq!(snapshot.status, ChargingStatus::Idle);
        assert!(!snapshot.has_ticket);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_the_run_aborts_the_timer() {
        let mut run = ready_run();
        let mut snapshots = run.subscribe();
        assert!(start(&mut run));
        snapshots.borrow_and_update();

        drop(run);
        // Every sender is gone once the timer task is aborted.
        assert!(snapshots.changed().await.is_err());
    }
}
