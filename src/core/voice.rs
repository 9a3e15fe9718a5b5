//! Voice command classification.
//!
//! Transcripts come from the platform speech recognizer. Only the
//! emergency category escalates; the others are reported for the UI.

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::alerts::model::AlertType;
use super::escalation::TriggerSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Emergency,
    Navigation,
    SafetyCheck,
    Contact,
    /// Matched no category, including empty transcripts
    Unknown,
}

/// A classified transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceCommand {
    pub kind: CommandKind,
    /// Alert type named in the transcript, if any
    pub alert_hint: Option<AlertType>,
    pub transcript: String,
}

impl VoiceCommand {
    /// Trigger to feed the escalation machine, for emergency commands only.
    pub const fn trigger(&self) -> Option<TriggerSignal> {
        match self.kind {
            CommandKind::Emergency => Some(TriggerSignal::voice(self.alert_hint)),
            _ => None,
        }
    }
}

pub struct VoiceCommandClassifier {
    // Checked in order; the first match wins.
    categories: Vec<(CommandKind, Regex)>,
    hints: Vec<(AlertType, Regex)>,
}

impl VoiceCommandClassifier {
    pub fn new() -> Self {
        let categories = vec![
            (
                CommandKind::Emergency,
                Regex::new(r"(?i)\b(help|sos|emergency|unsafe|danger)\b")
                    .expect("Invalid emergency regex"),
            ),
            (
                CommandKind::Navigation,
                Regex::new(r"(?i)\b(take|route|directions|way)\b").expect("Invalid navigation regex"),
            ),
            (
                CommandKind::SafetyCheck,
                Regex::new(r"(?i)\b(check|analyze|safe|look)\b").expect("Invalid safety regex"),
            ),
            (
                CommandKind::Contact,
                Regex::new(r"(?i)\b(call|message|alert|notify)\b").expect("Invalid contact regex"),
            ),
        ];

        let hints = vec![
            (
                AlertType::Fire,
                Regex::new(r"(?i)\b(fire|smoke)\b").expect("Invalid fire regex"),
            ),
            (
                AlertType::Medical,
                Regex::new(r"(?i)\b(medical|ambulance|hurt|injured)\b").expect("Invalid medical regex"),
            ),
            (
                AlertType::Police,
                Regex::new(r"(?i)\b(police|robbed|attacked)\b").expect("Invalid police regex"),
            ),
        ];

        Self { categories, hints }
    }

    /// Classifies one transcript. Anything that matches no category is
    /// `Unknown`.
    pub fn classify(&self, transcript: &str) -> VoiceCommand {
        let transcript = transcript.trim();
        let kind = self
            .categories
            .iter()
            .find(|(_, re)| re.is_match(transcript))
            .map_or(CommandKind::Unknown, |(kind, _)| *kind);

        let alert_hint = self
            .hints
            .iter()
            .find(|(_, re)| re.is_match(transcript))
            .map(|(alert_type, _)| *alert_type);

        VoiceCommand {
            kind,
            alert_hint,
            transcript: transcript.to_string(),
        }
    }
}

impl Default for VoiceCommandClassifier {
    fn default() -> Self {
        Self::new()
    }
}
