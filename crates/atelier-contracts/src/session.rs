//! The editing-session state machine.
//!
//! Exactly one state is active at a time. Transitions replace the state
//! wholesale; images travel by value and are never mutated in place. The
//! session performs no I/O: `begin` hands out a [`Submission`] snapshot, the
//! caller runs it wherever it likes and reports back through `complete` with
//! the generation id it was given. A completion whose generation no longer
//! matches the in-flight submission is reported stale and discarded, which is
//! what makes `upload` and `reset` safe while an operation is running.

use serde::{Deserialize, Serialize};

use crate::error::{EditError, MERGE_NEEDS_REFERENCE_MESSAGE};
use crate::image::{EditedImage, WorkingImage};
use crate::request::OperationRequest;

/// State names for status display and event payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Empty,
    Idle,
    Processing,
    ResultReady,
    Failed,
}

impl SessionPhase {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Idle => "idle",
            Self::Processing => "processing",
            Self::ResultReady => "result_ready",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No primary image loaded.
    Empty,
    /// A primary image (and possibly a reference) is loaded and editable.
    Idle {
        working: WorkingImage,
        reference: Option<WorkingImage>,
    },
    /// One submission is in flight.
    Processing {
        working: WorkingImage,
        reference: Option<WorkingImage>,
        request: OperationRequest,
        generation: u64,
    },
    /// A result arrived and awaits keep/revert. The pre-submission image is
    /// retained for side-by-side display.
    ResultReady {
        working: WorkingImage,
        reference: Option<WorkingImage>,
        result: EditedImage,
    },
    /// The submission failed. Image, reference, and request are retained so
    /// retry, undo, and reset all stay available.
    Failed {
        working: WorkingImage,
        reference: Option<WorkingImage>,
        request: OperationRequest,
        error: EditError,
    },
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        match self {
            Self::Empty => SessionPhase::Empty,
            Self::Idle { .. } => SessionPhase::Idle,
            Self::Processing { .. } => SessionPhase::Processing,
            Self::ResultReady { .. } => SessionPhase::ResultReady,
            Self::Failed { .. } => SessionPhase::Failed,
        }
    }
}

/// Snapshot handed to the dispatcher when a submission begins.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub generation: u64,
    pub request: OperationRequest,
    pub working: WorkingImage,
    pub reference: Option<WorkingImage>,
}

/// What `complete` did with a finished operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    Stale,
}

#[derive(Debug)]
pub struct EditSession {
    state: SessionState,
    history: Vec<WorkingImage>,
    next_generation: u64,
}

impl Default for EditSession {
    fn default() -> Self {
        Self::new()
    }
}

impl EditSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Empty,
            history: Vec::new(),
            next_generation: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub fn history_depth(&self) -> usize {
        self.history.len()
    }

    pub fn working(&self) -> Option<&WorkingImage> {
        match &self.state {
            SessionState::Empty => None,
            SessionState::Idle { working, .. }
            | SessionState::Processing { working, .. }
            | SessionState::ResultReady { working, .. }
            | SessionState::Failed { working, .. } => Some(working),
        }
    }

    pub fn reference(&self) -> Option<&WorkingImage> {
        match &self.state {
            SessionState::Empty => None,
            SessionState::Idle { reference, .. }
            | SessionState::Processing { reference, .. }
            | SessionState::ResultReady { reference, .. }
            | SessionState::Failed { reference, .. } => reference.as_ref(),
        }
    }

    pub fn result(&self) -> Option<&EditedImage> {
        match &self.state {
            SessionState::ResultReady { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn last_error(&self) -> Option<&EditError> {
        match &self.state {
            SessionState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Generation of the in-flight submission, if any.
    pub fn in_flight(&self) -> Option<u64> {
        match &self.state {
            SessionState::Processing { generation, .. } => Some(*generation),
            _ => None,
        }
    }

    /// Load a new primary image. Allowed from any state; drops the history,
    /// the reference, and any pending result or failure. An operation already
    /// in flight keeps running, but its completion will no longer match and
    /// gets discarded on arrival.
    pub fn upload(&mut self, image: WorkingImage) {
        self.history.clear();
        self.state = SessionState::Idle {
            working: image,
            reference: None,
        };
    }

    /// Attach or replace the merge reference. Only meaningful while preparing
    /// or running an edit; history and primary image are untouched.
    pub fn attach_reference(&mut self, image: WorkingImage) -> Result<(), EditError> {
        match &mut self.state {
            SessionState::Idle { reference, .. } | SessionState::Processing { reference, .. } => {
                *reference = Some(image);
                Ok(())
            }
            _ => Err(EditError::Validation(
                "a reference can only be attached while preparing or running an edit".to_string(),
            )),
        }
    }

    /// Drop the merge reference, e.g. when the UI leaves merge mode.
    pub fn clear_reference(&mut self) {
        if let SessionState::Idle { reference, .. } | SessionState::Processing { reference, .. } =
            &mut self.state
        {
            *reference = None;
        }
    }

    /// Start an operation. Valid from `Idle`, and from `Failed` so a user can
    /// adjust parameters after an error without losing the image. Merge
    /// additionally requires a reference; that check happens before any state
    /// change, so a rejected submit leaves the session exactly where it was.
    pub fn begin(&mut self, request: OperationRequest) -> Result<Submission, EditError> {
        let (working, reference) = match &self.state {
            SessionState::Idle { working, reference }
            | SessionState::Failed {
                working, reference, ..
            } => (working.clone(), reference.clone()),
            SessionState::Empty => {
                return Err(EditError::Validation(
                    "load an image before submitting an edit".to_string(),
                ))
            }
            SessionState::Processing { .. } => {
                return Err(EditError::Validation(
                    "an edit is already in flight".to_string(),
                ))
            }
            SessionState::ResultReady { .. } => {
                return Err(EditError::Validation(
                    "keep or discard the current result before starting another edit".to_string(),
                ))
            }
        };
        if request.needs_reference() && reference.is_none() {
            return Err(EditError::Validation(
                MERGE_NEEDS_REFERENCE_MESSAGE.to_string(),
            ));
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        self.state = SessionState::Processing {
            working: working.clone(),
            reference: reference.clone(),
            request: request.clone(),
            generation,
        };
        Ok(Submission {
            generation,
            request,
            working,
            reference,
        })
    }

    /// Apply a finished operation. Anything other than an exact match with the
    /// in-flight generation leaves the state alone and reports `Stale`.
    pub fn complete(
        &mut self,
        generation: u64,
        outcome: Result<EditedImage, EditError>,
    ) -> Completion {
        match std::mem::replace(&mut self.state, SessionState::Empty) {
            SessionState::Processing {
                working,
                reference,
                request,
                generation: current,
            } if current == generation => {
                self.state = match outcome {
                    Ok(result) => SessionState::ResultReady {
                        working,
                        reference,
                        result,
                    },
                    Err(error) => SessionState::Failed {
                        working,
                        reference,
                        request,
                        error,
                    },
                };
                Completion::Applied
            }
            other => {
                self.state = other;
                Completion::Stale
            }
        }
    }

    /// Re-run the failed submission with its parameters unchanged.
    pub fn retry(&mut self) -> Result<Submission, EditError> {
        let request = match &self.state {
            SessionState::Failed { request, .. } => request.clone(),
            _ => {
                return Err(EditError::Validation(
                    "there is no failed edit to retry".to_string(),
                ))
            }
        };
        self.begin(request)
    }

    /// Adopt the result as the new working image. The replaced image is pushed
    /// onto the undo history and the reference is cleared.
    pub fn continue_with_new(&mut self) -> Result<(), EditError> {
        match std::mem::replace(&mut self.state, SessionState::Empty) {
            SessionState::ResultReady {
                working, result, ..
            } => {
                self.history.push(working);
                self.state = SessionState::Idle {
                    working: WorkingImage::from_result(&result),
                    reference: None,
                };
                Ok(())
            }
            other => {
                self.state = other;
                Err(EditError::Validation(
                    "there is no result to continue from".to_string(),
                ))
            }
        }
    }

    /// Discard the result and return to the pre-submission image. History and
    /// reference are untouched.
    pub fn continue_with_original(&mut self) -> Result<(), EditError> {
        match std::mem::replace(&mut self.state, SessionState::Empty) {
            SessionState::ResultReady {
                working, reference, ..
            } => {
                self.state = SessionState::Idle { working, reference };
                Ok(())
            }
            other => {
                self.state = other;
                Err(EditError::Validation(
                    "there is no result to discard".to_string(),
                ))
            }
        }
    }

    /// Pop the most recent history entry back into the working slot. Allowed
    /// from `Idle` and `Failed` (clearing the failure); the replaced image is
    /// discarded, so undo is strictly linear. Returns false when nothing
    /// changed.
    pub fn undo(&mut self) -> bool {
        let previous = match self.history.pop() {
            Some(image) => image,
            None => return false,
        };
        match std::mem::replace(&mut self.state, SessionState::Empty) {
            SessionState::Idle { reference, .. } | SessionState::Failed { reference, .. } => {
                self.state = SessionState::Idle {
                    working: previous,
                    reference,
                };
                true
            }
            other => {
                self.history.push(previous);
                self.state = other;
                false
            }
        }
    }

    /// Drop everything: image, reference, result, failure, and history. The
    /// generation counter keeps counting so in-flight completions stay stale.
    pub fn reset(&mut self) {
        self.history.clear();
        self.state = SessionState::Empty;
    }
}
