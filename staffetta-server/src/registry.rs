//! Identity Registry: mappa ogni connessione live al suo ruolo/display name
//! e alla mailbox per i push server → client. Stato di processo, ricostruito
//! vuoto ad ogni riavvio.

use std::collections::BTreeSet;

use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;

use staffetta_core::{RelayError, Role, Session, ADMIN_NAME};

/// Una sessione registrata insieme al sender usato per inoltrare i
/// messaggi (già serializzati) alla sua connessione WebSocket.
#[derive(Debug, Clone)]
pub struct LiveSession {
    pub session: Session,
    pub tx: UnboundedSender<String>,
}

#[derive(Debug, Default)]
pub struct Registry {
    sessions: DashMap<String, LiveSession>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Registra una sessione per `connection_id`. Per i visitatori il
    /// display name è obbligatorio e viene trimmato (`InvalidIdentity` se
    /// resta vuoto); per gli admin vale sempre la costante "admin".
    /// Una seconda register sullo stesso id rimpiazza atomicamente la
    /// precedente: mai due entry per la stessa connessione.
    pub fn register(
        &self,
        connection_id: &str,
        role: Role,
        display_name: Option<&str>,
        tx: UnboundedSender<String>,
    ) -> Result<Session, RelayError> {
        let display_name = match role {
            Role::Admin => ADMIN_NAME.to_string(),
            Role::Visitor => {
                let trimmed = display_name.unwrap_or_default().trim();
                if trimmed.is_empty() {
                    return Err(RelayError::InvalidIdentity);
                }
                trimmed.to_string()
            }
        };
        let session = Session {
            connection_id: connection_id.to_string(),
            role,
            display_name,
        };
        self.sessions.insert(
            connection_id.to_string(),
            LiveSession {
                session: session.clone(),
                tx,
            },
        );
        Ok(session)
    }

    /// Rimuove la sessione, se presente. Idempotente.
    pub fn unregister(&self, connection_id: &str) {
        self.sessions.remove(connection_id);
    }

    pub fn get(&self, connection_id: &str) -> Option<Session> {
        self.sessions.get(connection_id).map(|e| e.session.clone())
    }

    /// Snapshot consistente delle sessioni live, per il routing.
    pub fn snapshot(&self) -> Vec<LiveSession> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }

    /// Display name distinti dei visitatori attualmente connessi (anche
    /// quelli che non hanno ancora scritto nulla). Un visitatore che si
    /// fa chiamare "admin" non diventa una conversazione elencabile,
    /// come nella proiezione client.
    pub fn live_visitor_names(&self) -> BTreeSet<String> {
        self.sessions
            .iter()
            .filter(|e| e.value().session.role == Role::Visitor)
            .map(|e| e.value().session.display_name.clone())
            .filter(|name| name != ADMIN_NAME)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
