use serde::{Deserialize, Serialize};

use crate::core::alerts::model::AlertType;
use crate::core::model::MediaKind;

/// Entries of the emergency action menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    EmergencyCall,
    AlertContacts,
    RecordVideo,
    RecordAudio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionEffect {
    /// Run the confirmation countdown, then dispatch
    Confirm(AlertType),
    /// Dispatch right away
    Dispatch(AlertType),
    /// Start an evidence capture and stay in the menu
    Record(MediaKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionHandler {
    pub kind: ActionKind,
    pub effect: ActionEffect,
}

static HANDLERS: [ActionHandler; 4] = [
    ActionHandler {
        kind: ActionKind::EmergencyCall,
        effect: ActionEffect::Confirm(AlertType::Sos),
    },
    ActionHandler {
        kind: ActionKind::AlertContacts,
        effect: ActionEffect::Dispatch(AlertType::Panic),
    },
    ActionHandler {
        kind: ActionKind::RecordVideo,
        effect: ActionEffect::Record(MediaKind::Video),
    },
    ActionHandler {
        kind: ActionKind::RecordAudio,
        effect: ActionEffect::Record(MediaKind::Audio),
    },
];

impl ActionKind {
    const fn index(self) -> usize {
        match self {
            Self::EmergencyCall => 0,
            Self::AlertContacts => 1,
            Self::RecordVideo => 2,
            Self::RecordAudio => 3,
        }
    }

    pub fn handler(self) -> &'static ActionHandler {
        &HANDLERS[self.index()]
    }

    pub fn all() -> &'static [ActionKind] {
        &[
            Self::EmergencyCall,
            Self::AlertContacts,
            Self::RecordVideo,
            Self::RecordAudio,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_table_matches_kinds() {
        for kind in ActionKind::all() {
            let handler = kind.handler();
            assert_eq!(handler.kind, *kind);
        }
    }

    #[test]
    fn test_only_emergency_call_confirms() {
        let confirming: Vec<_> = ActionKind::all()
            .iter()
            .filter(|k| matches!(k.handler().effect, ActionEffect::Confirm(_)))
            .collect();
        assert_eq!(confirming, vec![&ActionKind::EmergencyCall]);
    }
}
