//! Controller state machine: states, actions and rejected transitions.

use serde::Serialize;
use shared::domain::{Coordinate, CoordinateError};
use thiserror::Error;

use crate::events::ControllerError;

/// A clicked coordinate awaiting confirm or cancel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PendingSelection {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<Coordinate> for PendingSelection {
    fn from(coordinate: Coordinate) -> Self {
        Self {
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControllerState {
    Idle,
    Loading,
    AwaitingConfirmation(PendingSelection),
    Submitting(PendingSelection),
    Error(ControllerError),
}

impl ControllerState {
    pub fn status(&self) -> ControllerStatus {
        match self {
            Self::Idle => ControllerStatus::Idle,
            Self::Loading => ControllerStatus::Loading,
            Self::AwaitingConfirmation(_) => ControllerStatus::AwaitingConfirmation,
            Self::Submitting(_) => ControllerStatus::Submitting,
            Self::Error(_) => ControllerStatus::Error,
        }
    }

    pub fn pending(&self) -> Option<PendingSelection> {
        match self {
            Self::AwaitingConfirmation(selection) | Self::Submitting(selection) => {
                Some(*selection)
            }
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ControllerError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }

    /// A network call is in flight; affordances that start another one must
    /// be disabled.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Loading | Self::Submitting(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerStatus {
    Idle,
    Loading,
    AwaitingConfirmation,
    Submitting,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Load,
    Click,
    Confirm,
    Cancel,
    DismissError,
}

impl Action {
    fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Click => "click",
            Self::Confirm => "confirm",
            Self::Cancel => "cancel",
            Self::DismissError => "dismiss_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransitionError {
    #[error("cannot {} while {state:?}", .action.as_str())]
    NotAllowed {
        action: Action,
        state: ControllerStatus,
    },
    #[error("invalid map position: {0}")]
    InvalidCoordinate(#[from] CoordinateError),
}
