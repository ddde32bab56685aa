//! Proiezione lato client della history: derivazioni pure, nessuno stato
//! proprio oltre a quello passato in input. Il client idrata la history via
//! HTTP e poi la aggiorna con i push live senza re-interrogare lo store.

use std::collections::BTreeSet;

use crate::error::RelayError;
use crate::models::{Message, ADMIN_NAME};

/// Display name dei visitatori presenti nella history (esclude "admin").
pub fn derive_conversations(history: &[Message]) -> BTreeSet<String> {
    history
        .iter()
        .filter_map(|m| m.conversation_name())
        .filter(|name| *name != ADMIN_NAME)
        .map(str::to_string)
        .collect()
}

/// Vero se il messaggio appartiene alla conversazione `display_name`.
fn matches_conversation(m: &Message, display_name: &str) -> bool {
    m.sender_id == display_name || m.recipient_id.as_deref() == Some(display_name)
}

/// Thread ordinato di una conversazione: i messaggi della history (già in
/// ordine di store) con `sender_id` o `recipient_id` uguale al nome dato.
pub fn derive_thread(history: &[Message], display_name: &str) -> Vec<Message> {
    history
        .iter()
        .filter(|m| matches_conversation(m, display_name))
        .cloned()
        .collect()
}

/// Accoda un push live al thread aperto, se e solo se il messaggio passa il
/// filtro della conversazione corrente. Ritorna true se accodato.
pub fn append_live(thread: &mut Vec<Message>, incoming: Message, display_name: &str) -> bool {
    if matches_conversation(&incoming, display_name) {
        thread.push(incoming);
        true
    } else {
        false
    }
}

/// Macchina a stati del widget visitatore: `AwaitingName → Active`, senza
/// transizione inversa. Dopo una disconnessione il widget resta `Active` e
/// si ri-identifica con lo stesso nome alla riconnessione.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WidgetState {
    #[default]
    AwaitingName,
    Active {
        display_name: String,
    },
}

impl WidgetState {
    /// Transizione su invio del nome. Fallisce con `InvalidIdentity` se il
    /// nome è vuoto dopo il trim; è un no-op se il widget è già attivo.
    pub fn submit_name(&mut self, name: &str) -> Result<(), RelayError> {
        if let WidgetState::Active { .. } = self {
            return Ok(());
        }
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(RelayError::InvalidIdentity);
        }
        *self = WidgetState::Active {
            display_name: trimmed.to_string(),
        };
        Ok(())
    }

    pub fn display_name(&self) -> Option<&str> {
        match self {
            WidgetState::AwaitingName => None,
            WidgetState::Active { display_name } => Some(display_name),
        }
    }
}
