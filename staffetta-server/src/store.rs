//! Message Store: log append-only dei messaggi su SQLite.
//! Nessuna update, nessuna delete: solo `append` e letture ordinate.

use sqlx::{Row, SqlitePool};
use time::OffsetDateTime;
use tokio::sync::Mutex;

use staffetta_core::{format_timestamp, new_message_id, Message, RelayError, Role};

/// Messaggio in costruzione, prima che lo store assegni id e timestamp.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub text: String,
    pub sender: Role,
    pub sender_id: String,
    pub recipient_id: Option<String>,
}

pub struct MessageStore {
    pool: SqlitePool,
    /// Serializza gli append e custodisce l'ultimo timestamp assegnato:
    /// il timestamp è monotono non decrescente per istanza di store anche
    /// se l'orologio di sistema torna indietro; i pari merito restano
    /// ordinati dal `seq` di inserimento.
    append_lock: Mutex<OffsetDateTime>,
}

impl MessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        MessageStore {
            pool,
            append_lock: Mutex::new(OffsetDateTime::UNIX_EPOCH),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Accoda un messaggio al log assegnando `message_id` e `timestamp`,
    /// e restituisce il record persistito. Se l'INSERT fallisce il
    /// messaggio NON risulta inviato (`StorageUnavailable`).
    pub async fn append(&self, draft: MessageDraft) -> Result<Message, RelayError> {
        let mut last = self.append_lock.lock().await;
        let mut now = OffsetDateTime::now_utc();
        if now < *last {
            now = *last;
        }
        *last = now;

        let message = Message {
            message_id: new_message_id(),
            text: draft.text,
            sender: draft.sender,
            sender_id: draft.sender_id,
            recipient_id: draft.recipient_id,
            timestamp: format_timestamp(now),
        };

        sqlx::query(
            "INSERT INTO messages (message_id, text, sender, sender_id, recipient_id, timestamp) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.message_id)
        .bind(&message.text)
        .bind(message.sender.as_str())
        .bind(&message.sender_id)
        .bind(&message.recipient_id)
        .bind(&message.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| RelayError::StorageUnavailable(e.to_string()))?;

        Ok(message)
    }

    /// History completa in ordine di inserimento (usata per l'idratazione
    /// iniziale e per il replay dopo una riconnessione).
    pub async fn query_all(&self) -> Result<Vec<Message>, RelayError> {
        let rows = sqlx::query(
            "SELECT message_id, text, sender, sender_id, recipient_id, timestamp \
             FROM messages ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RelayError::StorageUnavailable(e.to_string()))?;

        rows.iter().map(row_to_message).collect()
    }

    /// Display name distinti dei visitatori presenti nella history
    /// (lato mittente o lato destinatario delle risposte admin). Il nome
    /// riservato "admin" non compare mai, come nella proiezione client.
    pub async fn conversation_names(&self) -> Result<Vec<String>, RelayError> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT sender_id FROM messages \
             WHERE sender = 'visitor' AND sender_id <> 'admin' \
             UNION \
             SELECT DISTINCT recipient_id FROM messages \
             WHERE sender = 'admin' AND recipient_id IS NOT NULL AND recipient_id <> 'admin'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RelayError::StorageUnavailable(e.to_string()))?;
        Ok(names)
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, RelayError> {
    let sender_raw: String = row
        .try_get("sender")
        .map_err(|e| RelayError::StorageUnavailable(e.to_string()))?;
    let sender = Role::parse(&sender_raw)
        .ok_or_else(|| RelayError::StorageUnavailable(format!("unknown role: {}", sender_raw)))?;
    Ok(Message {
        message_id: row
            .try_get("message_id")
            .map_err(|e| RelayError::StorageUnavailable(e.to_string()))?,
        text: row
            .try_get("text")
            .map_err(|e| RelayError::StorageUnavailable(e.to_string()))?,
        sender,
        sender_id: row
            .try_get("sender_id")
            .map_err(|e| RelayError::StorageUnavailable(e.to_string()))?,
        recipient_id: row
            .try_get("recipient_id")
            .map_err(|e| RelayError::StorageUnavailable(e.to_string()))?,
        timestamp: row
            .try_get("timestamp")
            .map_err(|e| RelayError::StorageUnavailable(e.to_string()))?,
    })
}
