use uuid::Uuid;

/// Genera un connectionId opaco (UUIDv4) per una nuova connessione.
pub fn new_connection_id() -> String {
    Uuid::new_v4().to_string()
}

/// Genera un nuovo clientMsgId unico (UUIDv4) come stringa.
pub fn new_client_msg_id() -> String {
    Uuid::new_v4().to_string()
}

/// Genera un messageId (UUIDv4) assegnato dallo store all'append.
pub fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}
