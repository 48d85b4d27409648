//! Map interaction controller: owns the pin list and the
//! click/confirm/cancel/error state machine, and drives a [`ReportStore`].

use std::time::Duration;

use report_store::{AppendReceipt, ReportStore};
use shared::{
    domain::{Coordinate, Report},
    error::StoreError,
};
use tokio::{sync::broadcast, time::timeout};
use tracing::{debug, info, warn};

pub mod events;
pub mod rows;
pub mod state;

pub use events::{ControllerError, ControllerEvent, ErrorCategory, ErrorContext, Pin};
pub use rows::{parse_rows, ParsedRows};
pub use state::{Action, ControllerState, ControllerStatus, PendingSelection, TransitionError};

pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(90);
const EVENT_CHANNEL_CAPACITY: usize = 64;

pub struct MapController<S: ReportStore> {
    store: S,
    state: ControllerState,
    reports: Vec<Report>,
    operation_timeout: Duration,
    events: broadcast::Sender<ControllerEvent>,
}

impl<S: ReportStore> MapController<S> {
    pub fn new(store: S) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            state: ControllerState::Idle,
            reports: Vec::new(),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            events,
        }
    }

    pub fn with_operation_timeout(mut self, operation_timeout: Duration) -> Self {
        self.operation_timeout = operation_timeout;
        self
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn status(&self) -> ControllerStatus {
        self.state.status()
    }

    pub fn pending(&self) -> Option<PendingSelection> {
        self.state.pending()
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    pub fn pins(&self) -> Vec<Pin> {
        self.reports.iter().map(Pin::from).collect()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// Initial load and user-triggered reloads. A reload from `Error`
    /// replaces the error.
    pub async fn load(&mut self) -> Result<(), TransitionError> {
        if !matches!(self.state, ControllerState::Idle | ControllerState::Error(_)) {
            return Err(self.reject(Action::Load));
        }

        self.transition(ControllerState::Loading);
        match self.fetch_reports().await {
            Ok(parsed) => {
                self.replace_reports(parsed);
                self.transition(ControllerState::Idle);
            }
            Err(err) => self.fail(ErrorContext::Load, &err),
        }
        Ok(())
    }

    /// Captures a map click. A click while awaiting confirmation replaces the
    /// pending selection; a click while an error is shown replaces the error.
    pub fn click(&mut self, latitude: f64, longitude: f64) -> Result<(), TransitionError> {
        if self.state.is_busy() {
            return Err(self.reject(Action::Click));
        }

        let selection = PendingSelection::from(Coordinate::new(latitude, longitude)?);
        debug!(latitude, longitude, "map position selected");
        self.transition(ControllerState::AwaitingConfirmation(selection));
        Ok(())
    }

    pub async fn confirm(&mut self) -> Result<(), TransitionError> {
        let ControllerState::AwaitingConfirmation(selection) = self.state else {
            return Err(self.reject(Action::Confirm));
        };

        self.transition(ControllerState::Submitting(selection));
        let receipt = match self.submit(selection).await {
            Ok(receipt) => receipt,
            Err(err) => {
                self.fail(ErrorContext::Submit, &err);
                return Ok(());
            }
        };

        // Refetch so the pins follow the store's own ordering and formatting.
        match self.fetch_reports().await {
            Ok(parsed) => {
                self.replace_reports(parsed);
                self.transition(ControllerState::Idle);
            }
            Err(err) => {
                self.reports.push(receipt.report);
                self.emit_pins(0);
                self.fail(ErrorContext::Load, &err);
            }
        }
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        if !matches!(self.state, ControllerState::AwaitingConfirmation(_)) {
            return Err(self.reject(Action::Cancel));
        }
        self.transition(ControllerState::Idle);
        Ok(())
    }

    pub fn dismiss_error(&mut self) -> Result<(), TransitionError> {
        if !matches!(self.state, ControllerState::Error(_)) {
            return Err(self.reject(Action::DismissError));
        }
        self.transition(ControllerState::Idle);
        Ok(())
    }

    async fn fetch_reports(&self) -> Result<ParsedRows, StoreError> {
        let rows = match timeout(self.operation_timeout, self.store.get_reports()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(StoreError::Fetch(format!(
                    "request timed out after {}s",
                    self.operation_timeout.as_secs_f32()
                )))
            }
        };
        Ok(parse_rows(&rows))
    }

    async fn submit(&self, selection: PendingSelection) -> Result<AppendReceipt, StoreError> {
        let pending = self
            .store
            .add_report(selection.latitude, selection.longitude);
        match timeout(self.operation_timeout, pending).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Submit(format!(
                "request timed out after {}s",
                self.operation_timeout.as_secs_f32()
            ))),
        }
    }

    fn replace_reports(&mut self, parsed: ParsedRows) {
        info!(
            reports = parsed.reports.len(),
            skipped = parsed.skipped,
            "report pins refreshed"
        );
        self.reports = parsed.reports;
        self.emit_pins(parsed.skipped);
    }

    fn emit_pins(&self, skipped_rows: usize) {
        let _ = self.events.send(ControllerEvent::PinsUpdated {
            pins: self.pins(),
            skipped_rows,
        });
    }

    fn fail(&mut self, context: ErrorContext, err: &StoreError) {
        warn!(?context, code = ?err.code(), "report operation failed: {err}");
        self.transition(ControllerState::Error(ControllerError::from_store_error(
            context, err,
        )));
    }

    fn reject(&self, action: Action) -> TransitionError {
        debug!(?action, state = ?self.status(), "rejected controller action");
        TransitionError::NotAllowed {
            action,
            state: self.status(),
        }
    }

    fn transition(&mut self, next: ControllerState) {
        let status = next.status();
        self.state = next;
        let _ = self.events.send(ControllerEvent::StateChanged(status));
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
