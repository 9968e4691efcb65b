//! src/store.rs
//! Trwały magazyn klucz→wartość dla liczników dożywotnich i checkpointów
//! skanu. Implementacja plikowa trzyma całość jako jeden dokument JSON i
//! serializuje zapisy przez kolejkę z pojedynczym konsumentem — współbieżne
//! inkrementy/checkpointy nie mogą się przeplatać w pliku. Każdy `set` czeka
//! na potwierdzenie SWOJEGO zapisu (testy dostają awaitowalny punkt synchronizacji).

use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serenity::async_trait;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("store write queue closed")]
    QueueClosed,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
}

/* =========================================
   FileStore: JSON na dysku + kolejka zapisu
   ========================================= */

struct WriteJob {
    snapshot: HashMap<String, String>,
    done: oneshot::Sender<Result<(), StoreError>>,
}

pub struct FileStore {
    cache: Mutex<HashMap<String, String>>,
    queue: mpsc::UnboundedSender<WriteJob>,
}

impl FileStore {
    /// Otwiera magazyn. Uszkodzony/nieistniejący plik == pusty stan
    /// (data errors degradują do defaultów, nie wywracają procesu).
    pub fn open(path: impl Into<PathBuf>) -> Arc<Self> {
        let path = path.into();
        let initial = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "store file malformed, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<WriteJob>();
        // Pojedynczy konsument: zapisy lecą ściśle po kolei.
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let result = persist(&path, &job.snapshot);
                if let Err(e) = &result {
                    warn!(path = %path.display(), error = %e, "store write failed");
                }
                let _ = job.done.send(result);
            }
        });

        Arc::new(Self { cache: Mutex::new(initial), queue: tx })
    }
}

/// Zapis atomowy: plik tymczasowy w tym samym katalogu + rename.
fn persist(path: &Path, snapshot: &HashMap<String, String>) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(serde_json::to_string_pretty(snapshot)?.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

#[async_trait]
impl Store for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.cache.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let snapshot = {
            let mut cache = self.cache.lock().await;
            cache.insert(key.to_string(), value);
            cache.clone()
        };
        let (done_tx, done_rx) = oneshot::channel();
        self.queue
            .send(WriteJob { snapshot, done: done_tx })
            .map_err(|_| StoreError::QueueClosed)?;
        done_rx.await.map_err(|_| StoreError::QueueClosed)?
    }
}

/* =========================================
   MemoryStore (testy, tryb dev bez dysku)
   ========================================= */

#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.map.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.map.lock().await.insert(key.to_string(), value);
        Ok(())
    }
}
