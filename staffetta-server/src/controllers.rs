use axum::extract::ws::{Message as WsFrame, WebSocket};
use axum::{
    extract::{Extension, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use futures_util::{SinkExt, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;

use staffetta_core::{
    new_connection_id, Ack, Error, Hello, ListConversationsResponse, ListMessagesResponse,
    Message, RelayError, Role, SendMessage, Typing, WsMessage,
};

use crate::store::MessageDraft;
use crate::{routing, AppState};

/// Serializza un envelope WS. La serializzazione di WsMessage non può
/// fallire (niente mappe con chiavi non stringa, niente float non finiti).
fn envelope(msg: &WsMessage) -> String {
    serde_json::to_string(msg).unwrap()
}

/// Handler per GET /api/messages: history completa in ordine di store,
/// usata dal client per l'idratazione prima di attaccare lo stream live.
pub async fn list_messages(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<ListMessagesResponse>, (StatusCode, String)> {
    let messages = state
        .store
        .query_all()
        .await
        .map_err(|e| (StatusCode::SERVICE_UNAVAILABLE, format!("store error: {}", e)))?;
    Ok(Json(ListMessagesResponse { messages }))
}

/// Handler per GET /api/conversations: display name dei visitatori noti,
/// unione tra history persistita e sessioni live (così l'admin vede una
/// conversazione anche prima del primo messaggio del visitatore).
pub async fn list_conversations(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<ListConversationsResponse>, (StatusCode, String)> {
    let mut names: BTreeSet<String> = state
        .store
        .conversation_names()
        .await
        .map_err(|e| (StatusCode::SERVICE_UNAVAILABLE, format!("store error: {}", e)))?
        .into_iter()
        .collect();
    names.extend(state.registry.live_visitor_names());
    Ok(Json(ListConversationsResponse {
        conversations: names.into_iter().collect(),
    }))
}

/// Esito di un frame testuale arrivato prima della registrazione.
#[derive(Debug)]
pub enum PreHello {
    /// Handshake da processare.
    Hello(Hello),
    /// Frame rifiutato: l'envelope di risposta da spedire al client.
    Rejected(WsMessage),
}

/// Classifica un frame ricevuto prima dell'hello: solo l'handshake
/// procede. Un sendMessage riceve un ack not_registered (che eco il suo
/// clientMsgId), ogni altro frame, anche non parsabile, l'errore
/// identity_required.
pub fn classify_pre_hello(txt: &str) -> PreHello {
    match serde_json::from_str::<WsMessage>(txt) {
        Ok(WsMessage::Hello(hello)) => PreHello::Hello(hello),
        Ok(WsMessage::SendMessage(sm)) => {
            let e = RelayError::NotRegistered;
            PreHello::Rejected(WsMessage::Ack(Ack::error(sm.client_msg_id, Error::from(&e))))
        }
        Ok(_) | Err(_) => PreHello::Rejected(WsMessage::Error(Error {
            code: "identity_required".to_string(),
            message: "expected hello as first frame".to_string(),
            details: None,
        })),
    }
}

/// Handler per /ws
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    // connectionId opaco, assegnato qui dal trasporto: unico per connessione
    let connection_id = new_connection_id();
    // `tx` è la mailbox della connessione: chiunque nel server ne clona il
    // sender per spingere envelope (già serializzati) a questo client.
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    // Handshake: finché non arriva un `hello` valido la connessione è un
    // no-op, ogni intento di invio viene rifiutato con not_registered.
    let session = loop {
        let frame = match socket.next().await {
            Some(Ok(f)) => f,
            // connessione chiusa o errore di trasporto: niente da smontare
            _ => return,
        };
        match frame {
            WsFrame::Text(txt) => match classify_pre_hello(&txt) {
                PreHello::Hello(hello) => {
                    match state.registry.register(
                        &connection_id,
                        hello.role,
                        hello.display_name.as_deref(),
                        tx.clone(),
                    ) {
                        Ok(s) => break s,
                        Err(e) => {
                            // nome vuoto: il client può ripresentarsi con
                            // un nome valido sulla stessa connessione
                            let err = WsMessage::Error(Error::from(&e));
                            if socket.send(WsFrame::Text(envelope(&err))).await.is_err() {
                                return;
                            }
                        }
                    }
                }
                PreHello::Rejected(reply) => {
                    if socket.send(WsFrame::Text(envelope(&reply))).await.is_err() {
                        return;
                    }
                }
            },
            WsFrame::Close(_) => return,
            _ => {}
        }
    };

    tracing::info!(
        connection_id = %session.connection_id,
        role = session.role.as_str(),
        display_name = %session.display_name,
        "session registered"
    );

    // Conferma la sessione registrata al client
    if socket
        .send(WsFrame::Text(envelope(&WsMessage::HelloOk(session.clone()))))
        .await
        .is_err()
    {
        state.registry.unregister(&connection_id);
        return;
    }

    // Split socket into sink/stream
    let (mut sender, mut receiver) = socket.split();

    // Task: forward messages from rx -> websocket. Un send fallito chiude
    // il task: il destinatario recupererà i messaggi persi via replay
    // della history alla prossima riconnessione, mai via ritrasmissione.
    let forward_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(WsFrame::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // Loop eventi inbound: ogni evento è processato in modo sincrono da
    // cima a fondo (persistenza, poi push), così l'ordine per
    // conversazione resta quello dello store.
    while let Some(Ok(frame)) = receiver.next().await {
        match frame {
            WsFrame::Text(txt) => {
                if let Ok(parsed) = serde_json::from_str::<WsMessage>(&txt) {
                    match parsed {
                        WsMessage::SendMessage(sm) => {
                            let in_reply_to = sm.client_msg_id.clone();
                            let ack = match handle_send(&state, &connection_id, sm).await {
                                Ok(stored) => Ack::ok(in_reply_to, stored),
                                Err(e) => {
                                    tracing::warn!(
                                        connection_id = %connection_id,
                                        code = e.code(),
                                        "send rejected"
                                    );
                                    Ack::error(in_reply_to, Error::from(&e))
                                }
                            };
                            // l'ack passa dalla stessa mailbox dei push:
                            // un solo canale ordinato verso il client
                            let _ = tx.send(envelope(&WsMessage::Ack(ack)));
                        }
                        WsMessage::Typing(t) => {
                            let _ = handle_typing(&state, &connection_id, t);
                        }
                        // hello ripetuto dopo la registrazione: ignorato,
                        // l'identità è fissa per la vita della connessione
                        _ => {}
                    }
                }
            }
            WsFrame::Close(_) => break,
            _ => {}
        }
    }

    // Teardown immediato e incondizionato: gli invii già persistiti non
    // vengono toccati.
    state.registry.unregister(&connection_id);
    tracing::info!(connection_id = %connection_id, "session closed");
    // chiude la mailbox così il forward task termina
    drop(tx);
    let _ = forward_task.await;
}

/// Cuore del gateway: valida l'intento, lo persiste (timestamp assegnato
/// dallo store), calcola i destinatari e spinge `newMessage` ad ognuno.
///
/// L'append riuscito non viene mai annullato da un push fallito: un
/// destinatario irraggiungibile perde solo il push live e recupera via
/// replay della history.
pub async fn handle_send(
    state: &AppState,
    connection_id: &str,
    sm: SendMessage,
) -> Result<Message, RelayError> {
    let session = state
        .registry
        .get(connection_id)
        .ok_or(RelayError::NotRegistered)?;

    let text = sm.text.trim();
    if text.is_empty() {
        return Err(RelayError::EmptyMessage);
    }

    // invariante: i messaggi dei visitatori non portano mai recipientId,
    // il bersaglio è sempre la inbox admin condivisa
    let recipient_id = match session.role {
        Role::Visitor => None,
        Role::Admin => sm.recipient_id.and_then(|r| {
            let r = r.trim();
            if r.is_empty() {
                None
            } else {
                Some(r.to_string())
            }
        }),
    };

    // Da qui in poi un invio alla volta: senza questo lock un invio
    // concorrente potrebbe persistere dopo di noi ma spingere prima,
    // invertendo l'ordine visto da una mailbox condivisa.
    let _ordering = state.send_lock.lock().await;

    let stored = state
        .store
        .append(MessageDraft {
            text: text.to_string(),
            sender: session.role,
            sender_id: session.display_name.clone(),
            recipient_id,
        })
        .await?;

    // Push solo dopo la persistenza. Un sender già chiuso viene ignorato:
    // il fallimento verso un destinatario non tocca gli altri.
    let live = state.registry.snapshot();
    let targets = routing::recipients(&live, &stored);
    tracing::info!(
        sender = %stored.sender_id,
        recipients = targets.len(),
        "relaying message"
    );
    let payload = envelope(&WsMessage::NewMessage(stored.clone()));
    for target in &targets {
        let _ = target.tx.send(payload.clone());
    }

    Ok(stored)
}

/// Evento di presenza: instradato con la stessa policy dei messaggi, mai
/// persistito. `by` viene riscritto dalla sessione registrata e un
/// visitatore può segnalare solo nella propria conversazione.
pub fn handle_typing(
    state: &AppState,
    connection_id: &str,
    typing: Typing,
) -> Result<(), RelayError> {
    let session = state
        .registry
        .get(connection_id)
        .ok_or(RelayError::NotRegistered)?;

    let conversation = match session.role {
        Role::Visitor => session.display_name.clone(),
        Role::Admin => typing.conversation,
    };
    let event = WsMessage::Typing(Typing {
        by: session.display_name,
        conversation: conversation.clone(),
    });

    let payload = envelope(&event);
    for target in routing::typing_recipients(&state.registry.snapshot(), &conversation) {
        let _ = target.tx.send(payload.clone());
    }
    Ok(())
}
