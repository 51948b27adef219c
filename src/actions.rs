//! Action bar state machine: create / bulk import / voice entry modals and the
//! refresh requests they produce.
//!
//! Prefilled forms coming from other views (a pending registration being turned
//! into a student, for instance) arrive over a typed channel instead of a global
//! event, and go through the same prefill transition as voice entry.

use std::sync::mpsc::{channel, Receiver, Sender};

use serde::Serialize;

use crate::error::{RecordsError, RecordsResult};
use crate::record::EntityRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FormMode {
    Create,
    Prefill,
}

/// Where a prefilled snapshot came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "camelCase")]
pub enum PrefillOrigin {
    VoiceEntry,
    Registration { registration_id: String },
    /// Another screen handing over a snapshot, named by the caller.
    View { view: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ActionState {
    Idle,
    CsvImportOpen,
    VoiceEntryOpen,
    FormOpen {
        mode: FormMode,
        #[serde(skip_serializing_if = "Option::is_none")]
        prefill: Option<EntityRecord>,
        #[serde(skip_serializing_if = "Option::is_none")]
        origin: Option<PrefillOrigin>,
    },
}

impl ActionState {
    fn name(&self) -> &'static str {
        match self {
            ActionState::Idle => "idle",
            ActionState::CsvImportOpen => "csv import is open",
            ActionState::VoiceEntryOpen => "voice entry is open",
            ActionState::FormOpen { .. } => "a form is open",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionEvent {
    ClickAdd,
    ClickImport,
    ClickVoice,
    CsvImportComplete,
    CsvImportCancelled,
    VoiceEntryComplete(EntityRecord),
    VoiceEntryCancelled,
    FormSaved,
    FormCancelled,
    External(PrefillRequest),
}

impl ActionEvent {
    fn name(&self) -> &'static str {
        match self {
            ActionEvent::ClickAdd => "add a record",
            ActionEvent::ClickImport => "open csv import",
            ActionEvent::ClickVoice => "open voice entry",
            ActionEvent::CsvImportComplete => "complete csv import",
            ActionEvent::CsvImportCancelled => "cancel csv import",
            ActionEvent::VoiceEntryComplete(_) => "complete voice entry",
            ActionEvent::VoiceEntryCancelled => "cancel voice entry",
            ActionEvent::FormSaved => "save the form",
            ActionEvent::FormCancelled => "cancel the form",
            ActionEvent::External(_) => "open a prefilled form",
        }
    }

    /// Parses the wire name of an event. Events carrying data are built by the caller.
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "clickAdd" => ActionEvent::ClickAdd,
            "clickImport" => ActionEvent::ClickImport,
            "clickVoice" => ActionEvent::ClickVoice,
            "csvImportComplete" => ActionEvent::CsvImportComplete,
            "csvImportCancelled" => ActionEvent::CsvImportCancelled,
            "voiceEntryCancelled" => ActionEvent::VoiceEntryCancelled,
            "formSaved" => ActionEvent::FormSaved,
            "formCancelled" => ActionEvent::FormCancelled,
            _ => return None,
        })
    }
}

/// Out-of-band request to open the form prefilled.
#[derive(Debug, Clone, PartialEq)]
pub struct PrefillRequest {
    pub snapshot: EntityRecord,
    pub origin: PrefillOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub state: ActionState,
    /// The owning list surface should re-fetch.
    pub refresh: bool,
}

#[derive(Debug)]
pub struct ActionBar {
    state: ActionState,
    inbox: Receiver<PrefillRequest>,
    outbox: Sender<PrefillRequest>,
}

impl Default for ActionBar {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionBar {
    pub fn new() -> Self {
        let (outbox, inbox) = channel();
        Self {
            state: ActionState::Idle,
            inbox,
            outbox,
        }
    }

    pub fn state(&self) -> &ActionState {
        &self.state
    }

    /// Handle other views use to ask this bar for a prefilled form.
    pub fn prefill_sender(&self) -> Sender<PrefillRequest> {
        self.outbox.clone()
    }

    /// Applies one event. Invalid transitions leave the state untouched.
    pub fn dispatch(&mut self, event: ActionEvent) -> RecordsResult<Transition> {
        use ActionEvent as E;
        use ActionState as S;

        let (next, refresh) = match (&self.state, event) {
            (S::Idle, E::ClickAdd) => (
                S::FormOpen {
                    mode: FormMode::Create,
                    prefill: None,
                    origin: None,
                },
                false,
            ),
            (S::Idle, E::ClickImport) => (S::CsvImportOpen, false),
            (S::Idle, E::ClickVoice) => (S::VoiceEntryOpen, false),
            (S::Idle, E::External(req)) => (
                S::FormOpen {
                    mode: FormMode::Prefill,
                    prefill: Some(req.snapshot),
                    origin: Some(req.origin),
                },
                false,
            ),
            (S::VoiceEntryOpen, E::VoiceEntryComplete(data)) => (
                S::FormOpen {
                    mode: FormMode::Prefill,
                    prefill: Some(data),
                    origin: Some(PrefillOrigin::VoiceEntry),
                },
                false,
            ),
            (S::VoiceEntryOpen, E::VoiceEntryCancelled) => (S::Idle, false),
            (S::CsvImportOpen, E::CsvImportComplete) => (S::Idle, true),
            (S::CsvImportOpen, E::CsvImportCancelled) => (S::Idle, false),
            (S::FormOpen { .. }, E::FormSaved) => (S::Idle, true),
            (S::FormOpen { .. }, E::FormCancelled) => (S::Idle, false),
            (state, event) => {
                return Err(RecordsError::InvalidTransition {
                    state: state.name().to_string(),
                    event: event.name().to_string(),
                })
            }
        };

        self.state = next;
        Ok(Transition {
            state: self.state.clone(),
            refresh,
        })
    }

    /// Delivers at most one queued prefill request, and only while idle; anything
    /// else stays queued until the current modal closes.
    pub fn pump(&mut self) -> Option<Transition> {
        if self.state != ActionState::Idle {
            return None;
        }
        let req = self.inbox.try_recv().ok()?;
        self.dispatch(ActionEvent::External(req)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;

    fn data() -> EntityRecord {
        let mut rec = EntityRecord::new();
        rec.set("first_name", FieldValue::text("Isha"));
        rec
    }

    #[test]
    fn import_completion_refreshes() {
        let mut bar = ActionBar::new();
        assert_eq!(bar.dispatch(ActionEvent::ClickImport).expect("open").state, ActionState::CsvImportOpen);
        let t = bar.dispatch(ActionEvent::CsvImportComplete).expect("complete");
        assert_eq!(t.state, ActionState::Idle);
        assert!(t.refresh);
    }

    #[test]
    fn voice_entry_opens_prefilled_form() {
        let mut bar = ActionBar::new();
        bar.dispatch(ActionEvent::ClickVoice).expect("voice");
        let t = bar
            .dispatch(ActionEvent::VoiceEntryComplete(data()))
            .expect("complete");
        let ActionState::FormOpen { mode, prefill, origin } = t.state else {
            panic!("expected form");
        };
        assert_eq!(mode, FormMode::Prefill);
        assert_eq!(prefill, Some(data()));
        assert_eq!(origin, Some(PrefillOrigin::VoiceEntry));
        assert!(!t.refresh);
    }

    #[test]
    fn save_refreshes_but_cancel_does_not() {
        let mut bar = ActionBar::new();
        bar.dispatch(ActionEvent::ClickAdd).expect("add");
        assert!(bar.dispatch(ActionEvent::FormSaved).expect("saved").refresh);
        bar.dispatch(ActionEvent::ClickAdd).expect("add");
        assert!(!bar.dispatch(ActionEvent::FormCancelled).expect("cancel").refresh);
        assert_eq!(bar.state(), &ActionState::Idle);
    }

    #[test]
    fn invalid_transition_keeps_state() {
        let mut bar = ActionBar::new();
        bar.dispatch(ActionEvent::ClickImport).expect("open");
        let err = bar.dispatch(ActionEvent::ClickVoice);
        assert!(matches!(err, Err(RecordsError::InvalidTransition { .. })));
        assert_eq!(bar.state(), &ActionState::CsvImportOpen);
        assert!(bar.dispatch(ActionEvent::FormSaved).is_err());
    }

    #[test]
    fn external_prefill_waits_until_idle() {
        let mut bar = ActionBar::new();
        let tx = bar.prefill_sender();
        bar.dispatch(ActionEvent::ClickImport).expect("open");
        tx.send(PrefillRequest {
            snapshot: data(),
            origin: PrefillOrigin::Registration {
                registration_id: "reg-1".into(),
            },
        })
        .expect("send");
        assert!(bar.pump().is_none());
        bar.dispatch(ActionEvent::CsvImportCancelled).expect("cancel");
        let t = bar.pump().expect("delivered");
        assert!(matches!(
            t.state,
            ActionState::FormOpen { mode: FormMode::Prefill, origin: Some(PrefillOrigin::Registration { .. }), .. }
        ));
        assert!(bar.pump().is_none());
    }
}
