//! staffetta-core: tipi condivisi tra client e server del relay di supporto
//! (modelli, DTO HTTP, messaggi WS, proiezioni, errori).
//! Niente I/O o dipendenze non compatibili con WASM.

pub mod error;
pub mod models;
pub mod projector;
pub mod protocol;
pub mod utils;

// Re-export utili per ridurre i percorsi nei crate client/server
pub use error::{Error, RelayError};
pub use models::{Message, Role, Session, ADMIN_NAME};
pub use projector::{append_live, derive_conversations, derive_thread, WidgetState};
pub use protocol::http::{ListConversationsResponse, ListMessagesResponse};
pub use protocol::ws::{Ack, AckStatus, Hello, SendMessage, Typing, WsMessage};
pub use utils::{format_timestamp, new_client_msg_id, new_connection_id, new_message_id};
