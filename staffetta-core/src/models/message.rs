use serde::{Deserialize, Serialize};

use crate::models::session::Role;

/// Messaggio persistito dal server e notificato via WS.
///
/// Immutabile dopo l'append: in questo sottosistema non esistono edit né
/// delete, il log è solo accodabile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: String,
    pub text: String,
    /// Ruolo del mittente (non identità).
    pub sender: Role,
    /// Display name del visitatore mittente, oppure "admin".
    pub sender_id: String,
    /// Presente solo quando `sender = admin`: il display name a cui
    /// l'admin sta rispondendo. I messaggi dei visitatori non lo portano mai.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    pub timestamp: String, // RFC3339 UTC, assegnato dal server all'append
}

impl Message {
    /// Display name che identifica la conversazione di questo messaggio:
    /// `sender_id` se lo manda un visitatore, `recipient_id` se lo manda
    /// un admin. `None` per un messaggio admin senza destinatario.
    pub fn conversation_name(&self) -> Option<&str> {
        match self.sender {
            Role::Visitor => Some(self.sender_id.as_str()),
            Role::Admin => self.recipient_id.as_deref(),
        }
    }
}
