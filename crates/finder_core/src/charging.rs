use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Availability, CoreError, PaymentMethod, Ticket};

/// How often a running session advances.
pub const TICK_INTERVAL: Duration = Duration::from_millis(700);

/// Percentage points added on every tick.
pub const PROGRESS_STEP: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargingStatus {
    #[default]
    Idle,
    Charging,
    Done,
}

/// Everything the detail page knows when the user presses "start".
#[derive(Debug, Clone, Copy)]
pub struct ChargeContext {
    pub authenticated: bool,
    pub station_status: Availability,
    /// `None` when no vehicle is selected.
    pub vehicle_compatible: Option<bool>,
    pub has_ticket: bool,
}

impl ChargeContext {
    pub fn can_charge(&self) -> bool {
        self.authenticated
            && self.station_status == Availability::Available
            && self.vehicle_compatible != Some(false)
            && self.has_ticket
    }
}

/// Result of one timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not charging, nothing changed.
    Ignored,
    Progressed(u8),
    /// Progress reached 100. The timer must be cleared.
    Completed,
}

/// Client-side simulation of a charging session on the station detail page.
///
/// `Idle -> Charging -> Done -> Idle`, plus a user-confirmed stop from
/// `Charging` back to `Idle`. The simulator only moves on explicit calls; the
/// periodic [`tick`](Self::tick) is driven by whoever owns the timer.
#[derive(Debug, Clone, Default)]
pub struct ChargingSimulator {
    status: ChargingStatus,
    progress: u8,
    cancelled: bool,
    confirming_stop: bool,
    authenticated: bool,
    ticket: Option<Ticket>,
}

impl ChargingSimulator {
    pub fn new(authenticated: bool) -> Self {
        ChargingSimulator {
            authenticated,
            ..Default::default()
        }
    }

    pub fn status(&self) -> ChargingStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// The last session was stopped by the user. Display only.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn is_confirming_stop(&self) -> bool {
        self.confirming_stop
    }

    /// The completion dialog is shown while the session is done.
    pub fn is_completion_open(&self) -> bool {
        self.status == ChargingStatus::Done
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn ticket(&self) -> Option<&Ticket> {
        self.ticket.as_ref()
    }

    pub fn has_ticket(&self) -> bool {
        self.ticket.is_some()
    }

    /// Build the start context for a station with the simulator's own auth
    /// and ticket state.
    pub fn context(
        &self,
        station_status: Availability,
        vehicle_compatible: Option<bool>,
    ) -> ChargeContext {
        ChargeContext {
            authenticated: self.authenticated,
            station_status,
            vehicle_compatible,
            has_ticket: self.has_ticket(),
        }
    }

    /// Buy a ticket, replacing any previous one.
    pub fn buy_ticket(
        &mut self,
        method: &PaymentMethod,
        price_label: impl Into<String>,
    ) -> Result<&Ticket, CoreError> {
        if !self.authenticated {
            return Err(CoreError::NotAuthenticated);
        }
        let ticket = Ticket::new(method, price_label.into());
        tracing::info!("Bought ticket {} with {}", ticket.id, ticket.method_label);
        Ok(self.ticket.insert(ticket))
    }

    /// Start charging if `context` allows it.
    ///
    /// Returns `true` when the session started; the caller then starts the
    /// repeating timer. Anything else leaves the simulator untouched.
    pub fn start(&mut self, context: &ChargeContext) -> bool {
        if self.status != ChargingStatus::Idle || !context.can_charge() {
            tracing::debug!("Refusing to start charging from {:?}", self.status);
            return false;
        }
        tracing::info!("Charging started");
        self.status = ChargingStatus::Charging;
        self.progress = 0;
        self.cancelled = false;
        self.confirming_stop = false;
        true
    }

    pub fn tick(&mut self) -> TickOutcome {
        if self.status != ChargingStatus::Charging {
            return TickOutcome::Ignored;
        }
        self.progress = self.progress.saturating_add(PROGRESS_STEP).min(100);
        if self.progress == 100 {
            tracing::info!("Charging completed");
            self.status = ChargingStatus::Done;
            self.confirming_stop = false;
            TickOutcome::Completed
        } else {
            TickOutcome::Progressed(self.progress)
        }
    }

    /// Open the stop confirmation. Only meaningful while charging.
    pub fn request_stop(&mut self) -> bool {
        if self.status == ChargingStatus::Charging {
            self.confirming_stop = true;
        }
        self.confirming_stop
    }

    /// Close the stop confirmation and keep charging.
    pub fn dismiss_stop(&mut self) {
        self.confirming_stop = false;
    }

    /// Commit a requested stop. Returns `true` if the session was stopped, in
    /// which case the timer must be cleared.
    pub fn confirm_stop(&mut self) -> bool {
        if !self.confirming_stop || self.status != ChargingStatus::Charging {
            return false;
        }
        tracing::info!("Charging cancelled at {}%", self.progress);
        self.status = ChargingStatus::Idle;
        self.progress = 0;
        self.cancelled = true;
        self.confirming_stop = false;
        true
    }

    /// Close the completion dialog.
    pub fn dismiss_completion(&mut self) {
        if self.status == ChargingStatus::Done {
            self.status = ChargingStatus::Idle;
            self.progress = 0;
        }
    }

    /// Logging out invalidates the session, the ticket and any open dialog.
    pub fn set_authenticated(&mut self, authenticated: bool) {
        self.authenticated = authenticated;
        if !authenticated {
            self.reset();
        }
    }

    /// Back to a fresh idle simulator, ticket dropped.
    pub fn reset(&mut self) {
        if self.status == ChargingStatus::Charging {
            tracing::info!("Charging session reset at {}%", self.progress);
        }
        self.status = ChargingStatus::Idle;
        self.progress = 0;
        self.cancelled = false;
        self.confirming_stop = false;
        self.ticket = None;
    }

    /// Energy delivered so far, in whole kWh.
    pub fn delivered_kwh(&self, ticket_kwh: f64) -> f64 {
        delivered_kwh(ticket_kwh, self.progress)
    }

    pub fn remaining_minutes(&self, total_minutes: f64) -> f64 {
        remaining_minutes(total_minutes, self.progress)
    }
}

pub fn delivered_kwh(ticket_kwh: f64, progress: u8) -> f64 {
    if !ticket_kwh.is_finite() {
        return 0.0;
    }
    (ticket_kwh * f64::from(progress) / 100.0).round()
}

pub fn remaining_minutes(total_minutes: f64, progress: u8) -> f64 {
    if !total_minutes.is_finite() {
        return 0.0;
    }
    let left = f64::from(100 - progress.min(100)) / 100.0;
    (left * total_minutes).ceil().max(0.0)
}
