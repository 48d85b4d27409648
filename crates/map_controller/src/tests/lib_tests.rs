use super::*;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use shared::protocol::CellValue;
use tokio::sync::Mutex;

#[derive(Clone, Default)]
struct FakeStore {
    rows: Arc<Mutex<Vec<Vec<Value>>>>,
    fail_get: Arc<Mutex<Option<StoreError>>>,
    fail_add: Arc<Mutex<Option<StoreError>>>,
    fail_get_after_add: Arc<Mutex<Option<StoreError>>>,
    delay: Option<Duration>,
    get_calls: Arc<Mutex<usize>>,
    add_calls: Arc<Mutex<Vec<(f64, f64)>>>,
}

impl FakeStore {
    async fn with_rows(rows: Vec<Vec<Value>>) -> Self {
        let store = Self::default();
        *store.rows.lock().await = rows;
        store
    }

    async fn network_calls(&self) -> usize {
        *self.get_calls.lock().await + self.add_calls.lock().await.len()
    }
}

#[async_trait]
impl ReportStore for FakeStore {
    async fn add_report(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<AppendReceipt, StoreError> {
        self.add_calls.lock().await.push((latitude, longitude));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.fail_add.lock().await.clone() {
            return Err(err);
        }

        let report = Report::new(
            "2024-05-01T09:30:00.000Z",
            Coordinate::new(latitude, longitude).map_err(|err| StoreError::Submit(err.to_string()))?,
        );
        self.rows.lock().await.push(report.to_row());
        if let Some(err) = self.fail_get_after_add.lock().await.take() {
            *self.fail_get.lock().await = Some(err);
        }
        Ok(AppendReceipt {
            report,
            updated_range: None,
        })
    }

    async fn get_reports(&self) -> Result<Vec<Vec<CellValue>>, StoreError> {
        *self.get_calls.lock().await += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.fail_get.lock().await.clone() {
            return Err(err);
        }
        Ok(self.rows.lock().await.clone())
    }
}

fn helsinki_row() -> Vec<Value> {
    vec![
        json!("2024-04-30T18:00:00.000Z"),
        json!("60.1699"),
        json!("24.9384"),
    ]
}

async fn loaded_controller(rows: Vec<Vec<Value>>) -> (MapController<FakeStore>, FakeStore) {
    let store = FakeStore::with_rows(rows).await;
    let mut controller = MapController::new(store.clone());
    controller.load().await.expect("load allowed");
    (controller, store)
}

#[tokio::test]
async fn load_populates_pins_and_emits_state_changes() {
    let store = FakeStore::with_rows(vec![helsinki_row()]).await;
    let mut controller = MapController::new(store.clone());
    let mut rx = controller.subscribe_events();

    controller.load().await.expect("load allowed");

    assert_eq!(controller.status(), ControllerStatus::Idle);
    assert_eq!(
        controller.pins(),
        vec![Pin {
            latitude: 60.1699,
            longitude: 24.9384,
            timestamp: "2024-04-30T18:00:00.000Z".into(),
        }]
    );
    assert_eq!(
        rx.try_recv().expect("loading event"),
        ControllerEvent::StateChanged(ControllerStatus::Loading)
    );
    assert!(matches!(
        rx.try_recv().expect("pins event"),
        ControllerEvent::PinsUpdated { ref pins, skipped_rows: 0 } if pins.len() == 1
    ));
    assert_eq!(
        rx.try_recv().expect("idle event"),
        ControllerEvent::StateChanged(ControllerStatus::Idle)
    );
}

#[tokio::test]
async fn empty_sheet_yields_no_pins_and_no_error() {
    let (controller, _store) = loaded_controller(Vec::new()).await;

    assert!(controller.pins().is_empty());
    assert_eq!(controller.state(), &ControllerState::Idle);
}

#[tokio::test]
async fn malformed_rows_are_skipped() {
    let store = FakeStore::with_rows(vec![
        vec![json!("Timestamp"), json!("Latitude"), json!("Longitude")],
        helsinki_row(),
        vec![json!("2024-05-01T00:00:00.000Z"), json!("NaN"), json!("24.9")],
        vec![json!("2024-05-01T00:00:00.000Z")],
    ])
    .await;
    let mut controller = MapController::new(store);
    let mut rx = controller.subscribe_events();

    controller.load().await.expect("load allowed");

    assert_eq!(controller.pins().len(), 1);
    let _loading = rx.try_recv().expect("loading event");
    assert!(matches!(
        rx.try_recv().expect("pins event"),
        ControllerEvent::PinsUpdated { skipped_rows: 3, .. }
    ));
}

#[tokio::test]
async fn click_then_cancel_makes_no_network_calls() {
    let store = FakeStore::default();
    let mut controller = MapController::new(store.clone());

    controller.click(60.20, 24.95).expect("click");
    assert_eq!(
        controller.pending(),
        Some(PendingSelection {
            latitude: 60.20,
            longitude: 24.95
        })
    );

    controller.cancel().expect("cancel");

    assert_eq!(controller.state(), &ControllerState::Idle);
    assert_eq!(controller.pending(), None);
    assert_eq!(store.network_calls().await, 0);
}

#[tokio::test]
async fn second_click_replaces_pending_selection() {
    let mut controller = MapController::new(FakeStore::default());

    controller.click(60.20, 24.95).expect("first click");
    controller.click(60.17, 24.94).expect("second click");

    assert_eq!(
        controller.pending(),
        Some(PendingSelection {
            latitude: 60.17,
            longitude: 24.94
        })
    );
}

#[tokio::test]
async fn click_outside_valid_range_is_rejected() {
    let mut controller = MapController::new(FakeStore::default());

    let err = controller.click(95.0, 24.95).expect_err("must reject");

    assert!(matches!(err, TransitionError::InvalidCoordinate(_)));
    assert_eq!(controller.state(), &ControllerState::Idle);
}

#[tokio::test]
async fn confirm_submits_and_refetches_one_more_pin() {
    let (mut controller, store) = loaded_controller(vec![helsinki_row()]).await;
    let before = controller.pins().len();

    controller.click(60.20, 24.95).expect("click");
    controller.confirm().await.expect("confirm");

    assert_eq!(controller.state(), &ControllerState::Idle);
    assert_eq!(controller.pending(), None);
    assert_eq!(controller.pins().len(), before + 1);
    assert_eq!(*store.add_calls.lock().await, vec![(60.20, 24.95)]);
    assert_eq!(*store.get_calls.lock().await, 2);

    let last = controller.reports().last().expect("new report");
    assert_eq!((last.latitude, last.longitude), (60.20, 24.95));
}

#[tokio::test]
async fn submit_failure_enters_error_and_keeps_pins() {
    let (mut controller, store) = loaded_controller(vec![helsinki_row()]).await;
    *store.fail_add.lock().await = Some(StoreError::Submit("quota exceeded".into()));
    let before = controller.pins();

    controller.click(60.20, 24.95).expect("click");
    controller.confirm().await.expect("confirm");

    let err = controller.state().error().expect("error state");
    assert_eq!(err.context(), ErrorContext::Submit);
    assert!(err.message().contains("quota exceeded"));
    assert_eq!(controller.pending(), None);
    assert_eq!(controller.pins(), before);
    assert_eq!(*store.get_calls.lock().await, 1);
}

#[tokio::test]
async fn refetch_failure_after_submit_appends_locally() {
    let (mut controller, store) = loaded_controller(vec![helsinki_row()]).await;
    *store.fail_get_after_add.lock().await =
        Some(StoreError::Fetch("backend unavailable".into()));

    controller.click(60.20, 24.95).expect("click");
    controller.confirm().await.expect("confirm");

    let err = controller.state().error().expect("error state");
    assert_eq!(err.context(), ErrorContext::Load);
    assert_eq!(err.category(), ErrorCategory::Transport);
    assert_eq!(controller.pins().len(), 2);
    assert_eq!(controller.pins()[1].latitude, 60.20);
}

#[tokio::test]
async fn auth_failure_preserves_previous_pins() {
    let (mut controller, store) = loaded_controller(vec![helsinki_row()]).await;
    let unauthorized = StoreError::Auth("token request failed with status 401 Unauthorized".into());
    *store.fail_get.lock().await = Some(unauthorized.clone());
    *store.fail_add.lock().await = Some(unauthorized);
    let before = controller.pins();

    controller.load().await.expect("reload allowed");
    let err = controller.state().error().expect("error state").clone();
    assert!(err.requires_reauth());
    assert_eq!(err.context(), ErrorContext::Load);
    assert_eq!(controller.pins(), before);

    controller.dismiss_error().expect("dismiss");
    controller.click(60.20, 24.95).expect("click");
    controller.confirm().await.expect("confirm");

    let err = controller.state().error().expect("error state");
    assert!(err.requires_reauth());
    assert_eq!(err.context(), ErrorContext::Submit);
    assert_eq!(controller.pins(), before);
}

#[tokio::test]
async fn dismiss_error_returns_to_idle_without_data_change() {
    let store = FakeStore::default();
    *store.fail_get.lock().await = Some(StoreError::Fetch("boom".into()));
    let mut controller = MapController::new(store.clone());

    controller.load().await.expect("load allowed");
    assert_eq!(controller.status(), ControllerStatus::Error);

    controller.dismiss_error().expect("dismiss");
    assert_eq!(controller.state(), &ControllerState::Idle);
    assert!(controller.pins().is_empty());
    assert_eq!(*store.get_calls.lock().await, 1);
}

#[tokio::test]
async fn actions_invalid_for_current_state_are_rejected() {
    let store = FakeStore::default();
    let mut controller = MapController::new(store.clone());

    assert_eq!(
        controller.confirm().await,
        Err(TransitionError::NotAllowed {
            action: Action::Confirm,
            state: ControllerStatus::Idle
        })
    );
    assert!(controller.cancel().is_err());
    assert!(controller.dismiss_error().is_err());

    controller.click(1.0, 2.0).expect("click");
    assert_eq!(
        controller.load().await,
        Err(TransitionError::NotAllowed {
            action: Action::Load,
            state: ControllerStatus::AwaitingConfirmation
        })
    );

    *store.fail_add.lock().await = Some(StoreError::Submit("nope".into()));
    controller.confirm().await.expect("confirm");
    assert_eq!(
        controller.cancel(),
        Err(TransitionError::NotAllowed {
            action: Action::Cancel,
            state: ControllerStatus::Error
        })
    );
    assert_eq!(*store.get_calls.lock().await, 0);
    assert_eq!(store.add_calls.lock().await.len(), 1);
}

#[tokio::test]
async fn click_while_error_is_shown_opens_confirmation() {
    let (mut controller, store) = loaded_controller(vec![helsinki_row()]).await;
    *store.fail_add.lock().await = Some(StoreError::Submit("quota exceeded".into()));
    controller.click(60.20, 24.95).expect("click");
    controller.confirm().await.expect("confirm");
    assert_eq!(controller.status(), ControllerStatus::Error);
    let before = controller.pins();

    controller.click(60.17, 24.94).expect("click from error");

    assert_eq!(
        controller.state(),
        &ControllerState::AwaitingConfirmation(PendingSelection {
            latitude: 60.17,
            longitude: 24.94
        })
    );
    assert_eq!(controller.pins(), before);

    *store.fail_add.lock().await = None;
    controller.confirm().await.expect("confirm");
    assert_eq!(controller.status(), ControllerStatus::Idle);
    assert_eq!(controller.pins().len(), before.len() + 1);
}

#[test]
fn click_is_rejected_while_a_request_is_in_flight() {
    let selection = PendingSelection {
        latitude: 1.0,
        longitude: 2.0,
    };
    let mut controller = MapController::new(FakeStore::default());

    controller.state = ControllerState::Submitting(selection);
    assert_eq!(
        controller.click(3.0, 4.0),
        Err(TransitionError::NotAllowed {
            action: Action::Click,
            state: ControllerStatus::Submitting
        })
    );

    controller.state = ControllerState::Loading;
    assert!(controller.click(3.0, 4.0).is_err());
    assert_eq!(controller.pending(), None);
}

#[tokio::test]
async fn hung_store_call_times_out_into_error() {
    let store = FakeStore {
        delay: Some(Duration::from_secs(5)),
        ..FakeStore::default()
    };
    let mut controller =
        MapController::new(store).with_operation_timeout(Duration::from_millis(50));

    controller.load().await.expect("load allowed");

    let err = controller.state().error().expect("error state");
    assert_eq!(err.category(), ErrorCategory::Transport);
    assert!(err.message().contains("timed out"));
}

#[test]
fn busy_states_are_reported() {
    let selection = PendingSelection {
        latitude: 1.0,
        longitude: 2.0,
    };
    assert!(ControllerState::Loading.is_busy());
    assert!(ControllerState::Submitting(selection).is_busy());
    assert!(!ControllerState::AwaitingConfirmation(selection).is_busy());
    assert!(!ControllerState::Idle.is_busy());
}
