/*
    Test del cuore del relay: registrazione identità, routing con fan-out,
    eco al mittente, collisione di display name, replay della history dopo
    una riconnessione. Le connessioni sono simulate da canali unbounded:
    la mailbox di ogni sessione è esattamente quella usata dal gateway.
*/
use anyhow::Result;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use staffetta_core::{
    derive_thread, new_client_msg_id, AckStatus, Hello, Message, RelayError, Role, SendMessage,
    Typing, WsMessage,
};
use staffetta_server::controllers::{
    classify_pre_hello, handle_send, handle_typing, list_conversations, PreHello,
};
use staffetta_server::{connect_pool, run_migrations, sqlite_url_for_path, AppState};

async fn fresh_state(td: &TempDir) -> Result<Arc<AppState>> {
    let db_path = td.path().join("staffetta.db");
    fs::File::create(&db_path)?;
    let url = sqlite_url_for_path(db_path.as_path())?;
    let pool = connect_pool(&url).await?;
    run_migrations(&pool).await?;
    Ok(Arc::new(AppState::new(pool)))
}

/// Connessione simulata: registra una sessione e restituisce il lato
/// ricevente della sua mailbox.
fn connect(
    state: &AppState,
    connection_id: &str,
    role: Role,
    name: Option<&str>,
) -> (UnboundedSender<String>, UnboundedReceiver<String>) {
    let (tx, rx) = unbounded_channel::<String>();
    state
        .registry
        .register(connection_id, role, name, tx.clone())
        .expect("register");
    (tx, rx)
}

fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<WsMessage> {
    let mut out = Vec::new();
    while let Ok(s) = rx.try_recv() {
        out.push(serde_json::from_str(&s).expect("valid envelope"));
    }
    out
}

fn pushed_messages(rx: &mut UnboundedReceiver<String>) -> Vec<Message> {
    drain(rx)
        .into_iter()
        .filter_map(|w| match w {
            WsMessage::NewMessage(m) => Some(m),
            _ => None,
        })
        .collect()
}

fn send(text: &str, recipient: Option<&str>) -> SendMessage {
    SendMessage {
        text: text.to_string(),
        recipient_id: recipient.map(str::to_string),
        client_msg_id: None,
    }
}

/*
    Scenario A: la visitatrice "Ana" manda "Hello" → ogni sessione admin
    riceve il newMessage, e lo riceve anche la sessione di Ana stessa
    (regola dell'eco: non esiste eco locale lato client).
*/
#[tokio::test]
async fn scenario_a_visitor_message_reaches_admin_and_echoes() -> Result<()> {
    let td = TempDir::new()?;
    let state = fresh_state(&td).await?;
    let (_ana_tx, mut ana_rx) = connect(&state, "c-ana", Role::Visitor, Some("Ana"));
    let (_adm_tx, mut adm_rx) = connect(&state, "c-admin", Role::Admin, None);

    let stored = handle_send(&state, "c-ana", send("Hello", None)).await?;
    assert_eq!(stored.sender, Role::Visitor);
    assert_eq!(stored.sender_id, "Ana");
    assert_eq!(stored.recipient_id, None);

    let to_admin = pushed_messages(&mut adm_rx);
    assert_eq!(to_admin, vec![stored.clone()]);
    let echo = pushed_messages(&mut ana_rx);
    assert_eq!(echo, vec![stored]);
    Ok(())
}

/*
    Scenario B: l'admin risponde a "Ana" → la ricevono tutte le sessioni
    con displayName "Ana" e tutte le sessioni admin; il visitatore "Ben"
    non riceve nulla.
*/
#[tokio::test]
async fn scenario_b_admin_reply_targets_one_conversation() -> Result<()> {
    let td = TempDir::new()?;
    let state = fresh_state(&td).await?;
    let (_a1, mut ana_rx) = connect(&state, "c-ana", Role::Visitor, Some("Ana"));
    let (_b1, mut ben_rx) = connect(&state, "c-ben", Role::Visitor, Some("Ben"));
    let (_m1, mut adm1_rx) = connect(&state, "c-admin-1", Role::Admin, None);
    let (_m2, mut adm2_rx) = connect(&state, "c-admin-2", Role::Admin, None);

    let stored = handle_send(&state, "c-admin-1", send("Hi Ana", Some("Ana"))).await?;
    assert_eq!(stored.sender_id, "admin");
    assert_eq!(stored.recipient_id.as_deref(), Some("Ana"));

    assert_eq!(pushed_messages(&mut ana_rx), vec![stored.clone()]);
    // tutte le viste admin restano sincronizzate, mittente compreso
    assert_eq!(pushed_messages(&mut adm1_rx), vec![stored.clone()]);
    assert_eq!(pushed_messages(&mut adm2_rx), vec![stored]);
    assert!(pushed_messages(&mut ben_rx).is_empty(), "Ben must receive nothing");
    Ok(())
}

/*
    Scenario C: messaggio di soli spazi → EmptyMessage, nessun append,
    nessun push.
*/
#[tokio::test]
async fn scenario_c_whitespace_message_is_rejected_without_side_effects() -> Result<()> {
    let td = TempDir::new()?;
    let state = fresh_state(&td).await?;
    let (_a, mut ana_rx) = connect(&state, "c-ana", Role::Visitor, Some("Ana"));
    let (_m, mut adm_rx) = connect(&state, "c-admin", Role::Admin, None);

    let err = handle_send(&state, "c-ana", send("   \t  ", None)).await;
    assert_eq!(err, Err(RelayError::EmptyMessage));

    assert!(state.store.query_all().await?.is_empty(), "nothing persisted");
    assert!(drain(&mut ana_rx).is_empty());
    assert!(drain(&mut adm_rx).is_empty());
    Ok(())
}

/*
    Scenario D: Ana si disconnette, l'admin le manda 3 messaggi, Ana si
    riconnette con lo stesso nome → la history rilegata con deriveThread
    li mostra tutti e 3 in ordine, e nessun push live viene rispedito.
*/
#[tokio::test]
async fn scenario_d_reconnect_catches_up_via_history_replay() -> Result<()> {
    let td = TempDir::new()?;
    let state = fresh_state(&td).await?;
    let (_m, mut adm_rx) = connect(&state, "c-admin", Role::Admin, None);

    // prima visita, poi disconnessione
    let (ana_tx, ana_rx) = connect(&state, "c-ana-1", Role::Visitor, Some("Ana"));
    handle_send(&state, "c-ana-1", send("Hello", None)).await?;
    state.registry.unregister("c-ana-1");
    drop(ana_tx);
    drop(ana_rx);

    for text in ["Are you there?", "We got your request", "Ping us anytime"] {
        handle_send(&state, "c-admin", send(text, Some("Ana"))).await?;
    }

    // riconnessione sotto lo stesso nome, nuova connectionId
    let (_ana2_tx, mut ana2_rx) = connect(&state, "c-ana-2", Role::Visitor, Some("Ana"));
    assert!(drain(&mut ana2_rx).is_empty(), "no live push is redelivered");

    let history = state.store.query_all().await?;
    let thread = derive_thread(&history, "Ana");
    let texts: Vec<&str> = thread.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(
        texts,
        vec!["Hello", "Are you there?", "We got your request", "Ping us anytime"]
    );

    // l'admin invece aveva visto tutto live (1 eco visitor + 3 proprie)
    assert_eq!(pushed_messages(&mut adm_rx).len(), 4);
    Ok(())
}

/*
    Collisione di identità documentata: due sessioni visitatore registrate
    con lo stesso nome ricevono entrambe ogni messaggio admin indirizzato
    a quel nome (e l'una l'eco dell'altra).
*/
#[tokio::test]
async fn colliding_display_names_share_the_conversation() -> Result<()> {
    let td = TempDir::new()?;
    let state = fresh_state(&td).await?;
    let (_t1, mut ana_a_rx) = connect(&state, "c-ana-a", Role::Visitor, Some("Ana"));
    let (_t2, mut ana_b_rx) = connect(&state, "c-ana-b", Role::Visitor, Some("Ana"));
    let (_m, mut adm_rx) = connect(&state, "c-admin", Role::Admin, None);

    let reply = handle_send(&state, "c-admin", send("Hi Ana", Some("Ana"))).await?;
    assert_eq!(pushed_messages(&mut ana_a_rx), vec![reply.clone()]);
    assert_eq!(pushed_messages(&mut ana_b_rx), vec![reply.clone()]);

    // anche l'eco di un invio della prima Ana raggiunge la seconda
    let hello = handle_send(&state, "c-ana-a", send("Hello", None)).await?;
    assert_eq!(pushed_messages(&mut ana_a_rx), vec![hello.clone()]);
    assert_eq!(pushed_messages(&mut ana_b_rx), vec![hello.clone()]);
    assert_eq!(pushed_messages(&mut adm_rx), vec![reply, hello]);
    Ok(())
}

/*
    Identità: nome vuoto dopo il trim → InvalidIdentity; invio senza
    sessione registrata → NotRegistered, senza alcun effetto collaterale.
*/
#[tokio::test]
async fn register_and_send_guards() -> Result<()> {
    let td = TempDir::new()?;
    let state = fresh_state(&td).await?;

    let (tx, _rx) = unbounded_channel::<String>();
    let err = state.registry.register("c-x", Role::Visitor, Some("   "), tx);
    assert_eq!(err.unwrap_err(), RelayError::InvalidIdentity);

    let err = handle_send(&state, "c-ghost", send("Hello", None)).await;
    assert_eq!(err, Err(RelayError::NotRegistered));
    assert!(state.store.query_all().await?.is_empty());
    Ok(())
}

/*
    unregister è idempotente: la seconda chiamata sullo stesso
    connectionId non ha effetti ulteriori.
*/
#[tokio::test]
async fn unregister_is_idempotent() -> Result<()> {
    let td = TempDir::new()?;
    let state = fresh_state(&td).await?;
    let (_t, _r) = connect(&state, "c-ana", Role::Visitor, Some("Ana"));
    assert_eq!(state.registry.len(), 1);

    state.registry.unregister("c-ana");
    assert!(state.registry.is_empty());
    state.registry.unregister("c-ana");
    assert!(state.registry.is_empty());
    Ok(())
}

/*
    Un destinatario con la mailbox già chiusa non compromette il push agli
    altri né la persistenza (at-least-once verso i raggiungibili).
*/
#[tokio::test]
async fn closed_recipient_mailbox_does_not_affect_others() -> Result<()> {
    let td = TempDir::new()?;
    let state = fresh_state(&td).await?;
    let (_a, mut ana_rx) = connect(&state, "c-ana", Role::Visitor, Some("Ana"));
    // admin con mailbox chiusa: riceverà solo via replay
    let (adm_tx, adm_rx) = connect(&state, "c-admin", Role::Admin, None);
    drop(adm_rx);
    drop(adm_tx);

    let stored = handle_send(&state, "c-ana", send("Hello", None)).await?;
    assert_eq!(pushed_messages(&mut ana_rx), vec![stored]);
    assert_eq!(state.store.query_all().await?.len(), 1);
    Ok(())
}

/*
    StorageUnavailable: con lo store irraggiungibile l'invio fallisce,
    nessun push viene tentato e l'errore è ritentabile.
*/
#[tokio::test]
async fn storage_failure_means_no_push_and_retryable_error() -> Result<()> {
    let td = TempDir::new()?;
    let state = fresh_state(&td).await?;
    let (_a, mut ana_rx) = connect(&state, "c-ana", Role::Visitor, Some("Ana"));
    let (_m, mut adm_rx) = connect(&state, "c-admin", Role::Admin, None);

    state.store.pool().close().await;

    let err = handle_send(&state, "c-ana", send("Hello", None))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::StorageUnavailable(_)));
    assert!(err.is_retryable());
    assert!(drain(&mut ana_rx).is_empty());
    assert!(drain(&mut adm_rx).is_empty());
    Ok(())
}

/*
    Invii concorrenti da mittenti diversi: ogni mailbox deve osservare i
    messaggi nell'ordine dello store. Senza la serializzazione di
    persistenza e push nel gateway, un invio può essere persistito dopo
    un altro ma spinto prima, invertendo l'ordine in una mailbox
    condivisa.
*/
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sends_reach_mailboxes_in_store_order() -> Result<()> {
    let td = TempDir::new()?;
    let state = fresh_state(&td).await?;
    let (_m, mut adm_rx) = connect(&state, "c-admin", Role::Admin, None);
    let (_a, mut ana_rx) = connect(&state, "c-ana", Role::Visitor, Some("Ana"));
    let (_b, mut ben_rx) = connect(&state, "c-ben", Role::Visitor, Some("Ben"));

    let mut tasks = Vec::new();
    for (conn, name) in [("c-ana", "Ana"), ("c-ben", "Ben")] {
        for i in 0..25 {
            let state = state.clone();
            let conn = conn.to_string();
            let text = format!("{} {}", name, i);
            tasks.push(tokio::spawn(async move {
                handle_send(&state, &conn, send(&text, None)).await
            }));
        }
    }
    for t in tasks {
        t.await??;
    }

    let history = state.store.query_all().await?;
    assert_eq!(history.len(), 50);
    // l'admin riceve tutto: la sua mailbox replica l'ordine dello store
    assert_eq!(pushed_messages(&mut adm_rx), history);
    // e ogni visitatore vede il proprio thread, sempre in ordine di store
    assert_eq!(pushed_messages(&mut ana_rx), derive_thread(&history, "Ana"));
    assert_eq!(pushed_messages(&mut ben_rx), derive_thread(&history, "Ben"));
    Ok(())
}

/*
    Prima dell'hello: un sendMessage riceve un ack not_registered che eco
    il suo clientMsgId; ogni altro frame, typing o testo non parsabile che
    sia, riceve l'errore identity_required. Solo l'hello procede.
*/
#[test]
fn pre_hello_frames_are_rejected_with_wire_errors() {
    let cmid = new_client_msg_id();
    let frame = serde_json::to_string(&WsMessage::SendMessage(SendMessage {
        text: "Hello".to_string(),
        recipient_id: None,
        client_msg_id: Some(cmid.clone()),
    }))
    .expect("serialize");
    match classify_pre_hello(&frame) {
        PreHello::Rejected(WsMessage::Ack(ack)) => {
            assert_eq!(ack.status, AckStatus::Error);
            assert_eq!(ack.in_reply_to, Some(cmid));
            assert_eq!(ack.error.expect("error body").code, "not_registered");
        }
        other => panic!("expected a not_registered ack, got {:?}", other),
    }

    let frame = serde_json::to_string(&WsMessage::Typing(Typing {
        by: "Ana".to_string(),
        conversation: "Ana".to_string(),
    }))
    .expect("serialize");
    match classify_pre_hello(&frame) {
        PreHello::Rejected(WsMessage::Error(e)) => assert_eq!(e.code, "identity_required"),
        other => panic!("expected identity_required, got {:?}", other),
    }

    match classify_pre_hello("not even json") {
        PreHello::Rejected(WsMessage::Error(e)) => assert_eq!(e.code, "identity_required"),
        other => panic!("expected identity_required, got {:?}", other),
    }

    let frame = serde_json::to_string(&WsMessage::Hello(Hello {
        role: Role::Visitor,
        display_name: Some("Ana".to_string()),
    }))
    .expect("serialize");
    match classify_pre_hello(&frame) {
        PreHello::Hello(h) => assert_eq!(h.display_name.as_deref(), Some("Ana")),
        other => panic!("expected the handshake to pass through, got {:?}", other),
    }
}

/*
    Il nome riservato "admin" non è mai elencato come conversazione,
    nemmeno se un visitatore lo sceglie come proprio display name: né dal
    registro live, né dalla history, né dall'endpoint che li unisce
    (coerente con deriveConversations lato client).
*/
#[tokio::test]
async fn conversations_listing_excludes_the_reserved_admin_name() -> Result<()> {
    let td = TempDir::new()?;
    let state = fresh_state(&td).await?;
    // collisione nota: visitatore che si fa chiamare come la inbox
    let (_f, _f_rx) = connect(&state, "c-fake", Role::Visitor, Some("admin"));
    let (_a, _a_rx) = connect(&state, "c-ana", Role::Visitor, Some("Ana"));
    let (_m, _m_rx) = connect(&state, "c-admin", Role::Admin, None);

    handle_send(&state, "c-fake", send("let me in", None)).await?;
    handle_send(&state, "c-ana", send("Hello", None)).await?;
    handle_send(&state, "c-admin", send("Hi Ana", Some("Ana"))).await?;

    assert!(!state.registry.live_visitor_names().contains("admin"));
    let names = state.store.conversation_names().await?;
    assert!(!names.contains(&"admin".to_string()));

    let axum::Json(resp) = list_conversations(axum::Extension(state.clone()))
        .await
        .expect("conversations");
    assert_eq!(resp.conversations, vec!["Ana".to_string()]);
    Ok(())
}

/*
    typing: stessa policy di routing dei messaggi, nessuna persistenza;
    `by` viene riscritto dalla sessione, mai dal payload del client.
*/
#[tokio::test]
async fn typing_is_routed_like_a_message_but_never_persisted() -> Result<()> {
    let td = TempDir::new()?;
    let state = fresh_state(&td).await?;
    let (_a, mut ana_rx) = connect(&state, "c-ana", Role::Visitor, Some("Ana"));
    let (_b, mut ben_rx) = connect(&state, "c-ben", Role::Visitor, Some("Ben"));
    let (_m, mut adm_rx) = connect(&state, "c-admin", Role::Admin, None);

    // il visitatore dichiara una conversazione altrui: viene ignorata
    handle_typing(
        &state,
        "c-ana",
        Typing {
            by: "spoofed".to_string(),
            conversation: "Ben".to_string(),
        },
    )?;

    let to_admin = drain(&mut adm_rx);
    match to_admin.as_slice() {
        [WsMessage::Typing(t)] => {
            assert_eq!(t.by, "Ana");
            assert_eq!(t.conversation, "Ana");
        }
        other => panic!("expected one typing event, got {:?}", other),
    }
    assert_eq!(drain(&mut ana_rx).len(), 1, "own conversation sees the event");
    assert!(drain(&mut ben_rx).is_empty(), "Ben must not see Ana typing");
    assert!(state.store.query_all().await?.is_empty(), "typing is never persisted");
    Ok(())
}
