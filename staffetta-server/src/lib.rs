use anyhow::Context;
use axum::http::StatusCode;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};

pub mod controllers;
pub mod registry;
pub mod routes;
pub mod routing;
pub mod store;

use registry::Registry;
use store::MessageStore;

/// Stato condiviso del processo relay: lo store append-only dei messaggi
/// e il registro in-memory delle connessioni live. Il registro viene
/// ricostruito da zero ad ogni riavvio, la history no.
pub struct AppState {
    pub store: MessageStore,
    pub registry: Registry,
    /// Un solo invio alla volta attraversa append e push: ogni mailbox
    /// osserva i messaggi di una conversazione nell'ordine dello store.
    pub(crate) send_lock: tokio::sync::Mutex<()>,
}

impl AppState {
    pub fn new(pool: SqlitePool) -> Self {
        AppState {
            store: MessageStore::new(pool),
            registry: Registry::new(),
            send_lock: tokio::sync::Mutex::new(()),
        }
    }
}

// Dato un percorso di file, restituisce un URL SQLite valido. Crea le directory genitrici se non esistono.
pub fn sqlite_url_for_path(p: &Path) -> anyhow::Result<String> {
    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };
    if let Some(parent) = abs.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create parent dirs for {:?}", parent))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(&abs)
        .with_context(|| format!("create/open sqlite file {:?}", abs))?;
    let s = abs.to_string_lossy().replace('\\', "/");
    Ok(format!("sqlite:///{}", s))
}

/// Crea un DB URL SQLite leggendo la variabile d'ambiente DATABASE_URL.
/// Se non è impostata, usa "staffetta.db" nella directory corrente.
pub fn build_sqlite_url() -> anyhow::Result<String> {
    let raw = std::env::var("DATABASE_URL").unwrap_or_else(|_| "staffetta.db".to_string());
    if raw == "sqlite::memory:" {
        return Ok(raw);
    }
    // Rimuovi il prefisso "sqlite://" se presente, per ottenere il percorso del file.
    let path_part = if raw.starts_with("sqlite://") {
        raw.trim_start_matches("sqlite:///")
            .trim_start_matches("sqlite://")
            .to_string()
    } else {
        raw
    };
    sqlite_url_for_path(&PathBuf::from(path_part))
}

// Connect to the database and return a connection pool.
pub async fn connect_pool(db_url: &str) -> anyhow::Result<SqlitePool> {
    let pool = SqlitePool::connect(db_url)
        .await
        .with_context(|| format!("connect to sqlite via {}", db_url))?;
    Ok(pool)
}

// Esegue le migrazioni del database. Crea le tabelle se non esistono.
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let stmts = [
        // `seq` è l'ordine di inserimento: lo store lo usa per restituire
        // la history esattamente nell'ordine degli append.
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            seq          INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id   TEXT NOT NULL UNIQUE,
            text         TEXT NOT NULL,
            sender       TEXT NOT NULL CHECK (sender IN ('visitor', 'admin')),
            sender_id    TEXT NOT NULL,
            recipient_id TEXT,
            timestamp    TEXT NOT NULL
        );"#,
    ];
    // applica ogni statement di migrazione
    for s in &stmts {
        sqlx::query(s)
            .execute(pool)
            .await
            .with_context(|| format!("apply migration: {}", &s[..s.len().min(40)].replace('\n', " ")))?;
    }
    Ok(())
}

/// Controlla lo stato di salute del database tentando di acquisire una connessione dal pool.
pub async fn health_with_pool(pool: &SqlitePool) -> StatusCode {
    match pool.acquire().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
