//! Acknowledgement tokens
//!
//! Every alert sent while acknowledgements are enabled carries an opaque
//! token. The registry maps tokens to the incident they were issued for: a
//! target incident (identified by the target name plus the target's current
//! token) or a hook incident (kept inline, hooks have no recovery).
//!
//! All operations run against [`SharedState`] under its write lock, so an
//! acknowledgement either lands on the incident it was issued for or finds
//! the incident already resolved.

use std::collections::HashMap;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::notifier::Acknowledgement;
use crate::state::{elapsed, SharedState};
use crate::VigilError;

const TOKEN_BYTES: usize = 32;

/// An incident raised by an inbound hook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookIncident {
    pub hook_name: String,
    pub message: String,
    pub triggered_at: DateTime<Utc>,
    /// Channels the hook alert went to
    pub alerts: Vec<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub note: Option<String>,
}

/// What a token acknowledges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AckSubject {
    Target { name: String },
    Hook(HookIncident),
}

#[derive(Debug, Clone)]
pub struct AckEntry {
    pub subject: AckSubject,
    pub issued_at: DateTime<Utc>,
}

/// Token to incident map
#[derive(Debug)]
pub struct AckRegistry {
    entries: HashMap<String, AckEntry>,
    ttl: Duration,
}

impl AckRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, token: &str) -> Option<&AckEntry> {
        self.entries.get(token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, subject: AckSubject, now: DateTime<Utc>) -> String {
        loop {
            let token = generate_token();
            if !self.entries.contains_key(&token) {
                self.entries.insert(
                    token.clone(),
                    AckEntry {
                        subject,
                        issued_at: now,
                    },
                );
                return token;
            }
        }
    }
}

/// 32 random bytes, URL-safe base64 without padding
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Read-only view of the incident behind a token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckView {
    /// Target or hook name
    pub subject: String,
    pub kind: String,
    pub message: Option<String>,
    pub since: Option<DateTime<Utc>>,
    /// The incident is still open
    pub active: bool,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

/// Result of an acknowledgement request
#[derive(Debug, Clone)]
pub struct AckOutcome {
    pub view: AckView,
    /// Set on the first acknowledgement only; the caller delivers it
    pub acknowledgement: Option<Acknowledgement>,
    /// Channels to notify about the acknowledgement
    pub channels: Vec<String>,
}

impl AckOutcome {
    pub fn already_acknowledged(&self) -> bool {
        self.acknowledgement.is_none()
    }
}

impl SharedState {
    /// Issue a token for `subject`, pruning expired tokens of closed incidents
    pub fn issue_token(&mut self, subject: AckSubject, now: DateTime<Utc>) -> String {
        self.prune_tokens(now);
        self.registry.insert(subject, now)
    }

    /// Issue a token for the target's current incident unless it already has one
    pub fn ensure_target_token(&mut self, name: &str, now: DateTime<Utc>) -> Option<String> {
        let existing = self.target(name)?.current_ack_token.clone();
        if existing.is_some() {
            return existing;
        }
        let token = self.issue_token(
            AckSubject::Target {
                name: name.to_string(),
            },
            now,
        );
        if let Some(target) = self.target_mut(name) {
            target.current_ack_token = Some(token.clone());
        }
        Some(token)
    }

    fn prune_tokens(&mut self, now: DateTime<Utc>) {
        let ttl = self.registry.ttl;
        let targets = &self.targets;
        self.registry.entries.retain(|token, entry| {
            if elapsed(entry.issued_at, now) < ttl {
                return true;
            }
            // Expired tokens survive only while their target incident is open
            match &entry.subject {
                AckSubject::Target { name } => targets
                    .iter()
                    .any(|t| &t.name == name && t.current_ack_token.as_deref() == Some(token)),
                AckSubject::Hook(_) => false,
            }
        });
    }

    /// View of the incident behind `token`
    pub fn ack_view(&self, token: &str) -> crate::Result<AckView> {
        let entry = self.registry.get(token).ok_or(VigilError::UnknownToken)?;
        Ok(self.view_of(token, &entry.subject))
    }

    fn view_of(&self, token: &str, subject: &AckSubject) -> AckView {
        match subject {
            AckSubject::Target { name } => {
                let current = self
                    .target(name)
                    .filter(|t| t.is_down && t.current_ack_token.as_deref() == Some(token));
                AckView {
                    subject: name.clone(),
                    kind: "target".to_string(),
                    message: current.and_then(|t| t.message.clone()),
                    since: current.and_then(|t| t.down_since),
                    active: current.is_some(),
                    acknowledged: current.is_some_and(|t| t.is_acknowledged()),
                    acknowledged_by: current.and_then(|t| t.acknowledged_by.clone()),
                    acknowledged_at: current.and_then(|t| t.acknowledged_at),
                    note: current.and_then(|t| t.acknowledgement_note.clone()),
                }
            }
            AckSubject::Hook(incident) => AckView {
                subject: incident.hook_name.clone(),
                kind: "hook".to_string(),
                message: Some(incident.message.clone()),
                since: Some(incident.triggered_at),
                active: incident.acknowledged_at.is_none(),
                acknowledged: incident.acknowledged_at.is_some(),
                acknowledged_by: incident.acknowledged_by.clone(),
                acknowledged_at: incident.acknowledged_at,
                note: incident.note.clone(),
            },
        }
    }

    /// Acknowledge the incident behind `token`.
    ///
    /// A repeated acknowledgement succeeds without side effects. A target
    /// token that is no longer the target's current token (the incident
    /// recovered) fails with [`VigilError::NoActiveIncident`].
    pub fn acknowledge(
        &mut self,
        token: &str,
        by: &str,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> crate::Result<AckOutcome> {
        let subject = self
            .registry
            .get(token)
            .map(|entry| entry.subject.clone())
            .ok_or(VigilError::UnknownToken)?;

        let (acknowledgement, channels) = match subject {
            AckSubject::Target { ref name } => {
                let target = self
                    .target_mut(name)
                    .filter(|t| t.is_down && t.current_ack_token.as_deref() == Some(token))
                    .ok_or(VigilError::NoActiveIncident)?;

                if target.is_acknowledged() {
                    (None, Vec::new())
                } else {
                    target.acknowledged_at = Some(now);
                    target.acknowledged_by = Some(by.to_string());
                    target.acknowledgement_note = note.clone();
                    tracing::info!("Target '{}' acknowledged by {}", name, by);
                    (
                        Some(Acknowledgement {
                            subject: name.clone(),
                            acknowledged_by: by.to_string(),
                            note,
                            acknowledged_at: now,
                        }),
                        target.alerts.clone(),
                    )
                }
            }
            AckSubject::Hook(_) => {
                let Some(AckEntry {
                    subject: AckSubject::Hook(incident),
                    ..
                }) = self.registry.entries.get_mut(token)
                else {
                    return Err(VigilError::UnknownToken);
                };

                if incident.acknowledged_at.is_some() {
                    (None, Vec::new())
                } else {
                    incident.acknowledged_at = Some(now);
                    incident.acknowledged_by = Some(by.to_string());
                    incident.note = note.clone();
                    tracing::info!("Hook '{}' acknowledged by {}", incident.hook_name, by);
                    (
                        Some(Acknowledgement {
                            subject: incident.hook_name.clone(),
                            acknowledged_by: by.to_string(),
                            note,
                            acknowledged_at: now,
                        }),
                        incident.alerts.clone(),
                    )
                }
            }
        };

        let view = self.ack_view(token)?;
        Ok(AckOutcome {
            view,
            acknowledgement,
            channels,
        })
    }
}
