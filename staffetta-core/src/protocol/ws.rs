/* This file defines how data "travel" through the web socket.
    WsMessage is the envelope enum, with all the ws event types:
    Hello -> client identity handshake (first frame of every connection)
    HelloOk -> server confirms the registered session
    SendMessage -> message intent from client
    NewMessage -> message pushed by the server to computed recipients
    Typing -> presence event, routed like a message but never persisted
    Ack -> server response to a client intent (e.g. a SendMessage)
    Error -> for errors not related to a command
*/
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    models::{Message, Role, Session},
};

/// Messaggio WS con envelope { type, payload }.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum WsMessage {
    /// Client → Server: handshake di identità, primo frame obbligatorio.
    #[serde(rename = "hello")]
    Hello(Hello),
    /// Server → Client: sessione registrata.
    #[serde(rename = "helloOk")]
    HelloOk(Session),
    /// Client → Server: richiesta di inviare un messaggio.
    #[serde(rename = "sendMessage")]
    SendMessage(SendMessage),
    /// Server → Client: nuovo messaggio per questa connessione.
    #[serde(rename = "newMessage")]
    NewMessage(Message),
    /// Bidirezionale: segnalazione "sta scrivendo" per una conversazione.
    #[serde(rename = "typing")]
    Typing(Typing),
    /// Server → Client: riscontro ad un intento (idempotente).
    #[serde(rename = "ack")]
    Ack(Ack),
    /// Server → Client: errore fuori banda.
    #[serde(rename = "error")]
    Error(Error),
}

/// Payload dell'handshake (C→S). `display_name` è obbligatorio per i
/// visitatori, ignorato per gli admin (che ricevono il nome fisso "admin").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Payload per l'intento di invio messaggio (C→S).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub text: String,
    /// Solo per mittente admin: display name della conversazione a cui
    /// risponde. Per i visitatori viene sempre scartato dal server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    /// Correlazione con l'ack; opzionale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_msg_id: Option<String>,
}

/// Evento di presenza: `by` è il display name di chi scrive,
/// `conversation` quello del visitatore della conversazione interessata.
/// Il server riscrive `by` dalla sessione registrata, mai fidandosi del
/// valore dichiarato dal client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Typing {
    pub by: String,
    pub conversation: String,
}

/// Stato dell'acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "error")]
    Error,
}

/// Risposta del server ad un intento (S→C), idempotente.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    /// clientMsgId del comando a cui rispondiamo, se fornito.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    pub status: AckStatus,
    /// Presente se status = ok: il record persistito, con timestamp
    /// assegnato dal server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    /// Presente se status = error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
}

impl Ack {
    pub fn ok(in_reply_to: Option<String>, message: Message) -> Self {
        Ack {
            in_reply_to,
            status: AckStatus::Ok,
            message: Some(message),
            error: None,
        }
    }

    pub fn error(in_reply_to: Option<String>, error: Error) -> Self {
        Ack {
            in_reply_to,
            status: AckStatus::Error,
            message: None,
            error: Some(error),
        }
    }
}
