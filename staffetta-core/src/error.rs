use serde::{Deserialize, Serialize};

/// Errore condiviso sul wire per HTTP e WS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Error {
    /// Codice stabile (vedi `RelayError::code`).
    pub code: String,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Tassonomia degli errori del relay.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// Display name vuoto dopo il trim: la registrazione viene rifiutata
    /// e il client deve richiedere un nome valido.
    #[error("display name must not be empty")]
    InvalidIdentity,

    /// Messaggio inviato prima che l'identità fosse registrata: bug del
    /// chiamante, l'invio è rifiutato senza alcun effetto collaterale.
    #[error("connection has no registered session")]
    NotRegistered,

    /// Testo vuoto dopo il trim: scartato prima della persistenza.
    #[error("message text is empty")]
    EmptyMessage,

    /// L'append sul log non è riuscito: il messaggio NON deve risultare
    /// inviato e nessun push va tentato. Il mittente può ritentare.
    #[error("message store unavailable: {0}")]
    StorageUnavailable(String),
}

impl RelayError {
    /// Codice stabile esposto sul wire.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::InvalidIdentity => "invalid_identity",
            RelayError::NotRegistered => "not_registered",
            RelayError::EmptyMessage => "empty_message",
            RelayError::StorageUnavailable(_) => "storage_unavailable",
        }
    }

    /// Vero se il mittente può semplicemente ripetere l'operazione.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RelayError::StorageUnavailable(_))
    }
}

impl From<&RelayError> for Error {
    fn from(e: &RelayError) -> Self {
        Error {
            code: e.code().to_string(),
            message: e.to_string(),
            details: None,
        }
    }
}
