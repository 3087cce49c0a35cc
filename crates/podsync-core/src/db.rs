use std::path::Path;

use tokio::sync::{mpsc, oneshot};

use crate::error::CoreError;
use crate::storage::Storage;

/// Async handle to the key/value store.
///
/// SQLite work runs on a dedicated thread; callers send commands and await
/// the reply, so a write has landed before its `await` returns.
#[derive(Clone)]
pub struct KvHandle {
    tx: mpsc::UnboundedSender<KvCommand>,
}

enum KvCommand {
    Get {
        key: String,
        reply: oneshot::Sender<Result<Option<String>, CoreError>>,
    },
    Set {
        key: String,
        value: String,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    SetMany {
        entries: Vec<(String, String)>,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    Remove {
        key: String,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
}

impl KvHandle {
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        Self::spawn(Storage::open(path)?)
    }

    pub fn open_memory() -> Result<Self, CoreError> {
        Self::spawn(Storage::open_memory()?)
    }

    fn spawn(storage: Storage) -> Result<Self, CoreError> {
        let (tx, rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("kv-actor".into())
            .spawn(move || actor_loop(storage, rx))?;

        Ok(Self { tx })
    }

    pub async fn get_item(&self, key: impl Into<String>) -> Result<Option<String>, CoreError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(KvCommand::Get {
            key: key.into(),
            reply,
        });
        rx.await.unwrap_or(Err(CoreError::ActorClosed))
    }

    pub async fn set_item(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), CoreError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(KvCommand::Set {
            key: key.into(),
            value: value.into(),
            reply,
        });
        rx.await.unwrap_or(Err(CoreError::ActorClosed))
    }

    /// Write several keys atomically.
    pub async fn set_items(&self, entries: Vec<(String, String)>) -> Result<(), CoreError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(KvCommand::SetMany { entries, reply });
        rx.await.unwrap_or(Err(CoreError::ActorClosed))
    }

    pub async fn remove_item(&self, key: impl Into<String>) -> Result<(), CoreError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(KvCommand::Remove {
            key: key.into(),
            reply,
        });
        rx.await.unwrap_or(Err(CoreError::ActorClosed))
    }
}

fn actor_loop(storage: Storage, mut rx: mpsc::UnboundedReceiver<KvCommand>) {
    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            KvCommand::Get { key, reply } => {
                let _ = reply.send(storage.get_item(&key));
            }
            KvCommand::Set { key, value, reply } => {
                let _ = reply.send(storage.set_item(&key, &value));
            }
            KvCommand::SetMany { entries, reply } => {
                let _ = reply.send(storage.set_items(&entries));
            }
            KvCommand::Remove { key, reply } => {
                let _ = reply.send(storage.remove_item(&key));
            }
        }
    }
    tracing::debug!("kv actor stopped");
}
