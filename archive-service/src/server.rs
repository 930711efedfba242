//! Unix socket server for the conversation archive.
//!
//! One JSON request per line, one JSON response per line. All state sits
//! behind a single mutex, so request handling is serialized: every write
//! updates the store and the search cache in the same critical section,
//! and a query can never observe the cache behind the store.

use crate::domains::DomainRegistry;
use crate::export::{render, ExportFilters};
use crate::protocol::{Request, Response};
use crate::record::ConversationRecord;
use crate::search::SearchEngine;
use crate::store::{CapacityPolicy, RecordStore, StoreError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Archive server configuration.
pub struct ServerConfig {
    /// Path to the Unix socket.
    pub socket_path: PathBuf,
    /// Path to the SQLite database.
    pub db_path: PathBuf,
    /// Path to the tracked-domain list.
    pub domains_path: PathBuf,
    /// Capacity policy for the store.
    pub capacity: CapacityPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("conversation-archive");

        Self {
            socket_path: PathBuf::from("/tmp/conversation-archive.sock"),
            db_path: data_dir.join("conversations.db"),
            domains_path: data_dir.join("domains.toml"),
            capacity: CapacityPolicy::default(),
        }
    }
}

/// Shared state behind the request mutex.
pub struct ServiceState {
    store: RecordStore,
    search: SearchEngine,
    domains: DomainRegistry,
}

impl ServiceState {
    pub fn new(store: RecordStore, domains: DomainRegistry) -> Result<Self, StoreError> {
        let mut search = SearchEngine::new();
        // The cache is process-lifetime only; rebuild it from ground truth.
        search.rebuild(&store.get_all()?);
        Ok(Self {
            store,
            search,
            domains,
        })
    }
}

/// Archive server listening on a Unix socket.
pub struct ArchiveServer {
    config: ServerConfig,
    state: Arc<Mutex<ServiceState>>,
}

impl ArchiveServer {
    pub fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let store = RecordStore::open(&config.db_path, config.capacity.clone())?;
        let domains = DomainRegistry::load(config.domains_path.clone());
        let state = Arc::new(Mutex::new(ServiceState::new(store, domains)?));

        Ok(Self { config, state })
    }

    pub fn with_defaults() -> Result<Self, Box<dyn std::error::Error>> {
        Self::new(ServerConfig::default())
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Start the server and listen for connections.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.config.socket_path.exists() {
            std::fs::remove_file(&self.config.socket_path)?;
        }

        let listener = UnixListener::bind(&self.config.socket_path)?;
        info!("Archive server listening on {:?}", self.config.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, state).await {
                            error!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }

    /// Process a single request directly (for integration without a socket).
    pub async fn process(&self, request: Request) -> Response {
        let mut state = self.state.lock().await;
        handle_request(&mut state, request)
    }
}

async fn handle_connection(
    stream: UnixStream,
    state: Arc<Mutex<ServiceState>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                debug!("request: {}", request_name(&request));
                let mut state = state.lock().await;
                handle_request(&mut state, request)
            }
            Err(e) => {
                warn!("Failed to parse request: {}", e);
                Response::error(format!("Parse error: {}", e))
            }
        };

        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        line.clear();
    }

    Ok(())
}

fn request_name(request: &Request) -> &'static str {
    match request {
        Request::SubmitRecord { .. } => "submitRecord",
        Request::CheckIds { .. } => "checkIds",
        Request::Search { .. } => "search",
        Request::GetRecord { .. } => "getRecord",
        Request::GetAll => "getAll",
        Request::UpdateRecord { .. } => "updateRecord",
        Request::DeleteRecord { .. } => "deleteRecord",
        Request::IsDomainEnabled { .. } => "isDomainEnabled",
        Request::GetDomains => "getDomains",
        Request::GetPlatforms => "getPlatforms",
        Request::GetTags => "getTags",
        Request::GetStatistics => "getStatistics",
        Request::Export { .. } => "export",
    }
}

/// Dispatch one request against the shared state.
pub fn handle_request(state: &mut ServiceState, request: Request) -> Response {
    match request {
        Request::SubmitRecord { record } => submit_record(state, record),

        Request::CheckIds { ids } => match state.store.existing_ids(&ids) {
            Ok(ids) => Response::ExistingIds { ids },
            Err(e) => Response::error(e.to_string()),
        },

        Request::Search { query, options } => match state.store.get_all() {
            Ok(records) => Response::Results {
                results: state.search.search(&records, &query, &options),
            },
            Err(e) => Response::error(e.to_string()),
        },

        Request::GetRecord { id } => match state.store.get(&id) {
            Ok(record) => Response::Record { record },
            Err(e) => Response::error(e.to_string()),
        },

        Request::GetAll => match state.store.get_all() {
            Ok(records) => Response::Records { records },
            Err(e) => Response::error(e.to_string()),
        },

        Request::UpdateRecord { id, updates } => match state.store.update(&id, updates) {
            Ok(updated) => {
                // Same operation, same critical section: the searchable
                // text follows the write immediately.
                state.search.index_record(&updated);
                Response::Ack
            }
            Err(e) => Response::error(e.to_string()),
        },

        Request::DeleteRecord { id } => match state.store.delete(&id) {
            Ok(()) => {
                state.search.remove(&id);
                Response::Ack
            }
            Err(e) => Response::error(e.to_string()),
        },

        Request::IsDomainEnabled { domain } => Response::DomainEnabled {
            enabled: state.domains.is_enabled(&domain),
        },

        Request::GetDomains => Response::Domains {
            domains: state.domains.domains().to_vec(),
        },

        Request::GetPlatforms => match state.store.platforms() {
            Ok(platforms) => Response::Platforms { platforms },
            Err(e) => Response::error(e.to_string()),
        },

        Request::GetTags => match state.store.tags() {
            Ok(tags) => Response::Tags { tags },
            Err(e) => Response::error(e.to_string()),
        },

        Request::GetStatistics => {
            let statistics = match state.store.statistics() {
                Ok(s) => s,
                Err(e) => return Response::error(e.to_string()),
            };
            match state.store.capacity_report() {
                Ok(capacity) => Response::Statistics {
                    statistics,
                    capacity,
                },
                Err(e) => Response::error(e.to_string()),
            }
        }

        Request::Export { format, ids, filters } => export(state, format, ids, filters),
    }
}

fn submit_record(state: &mut ServiceState, record: ConversationRecord) -> Response {
    match state.store.contains(&record.id) {
        Ok(true) => {
            // Expected and frequent under the content-derived id scheme.
            debug!("duplicate record {}", record.id);
            return Response::Submitted {
                accepted: true,
                is_duplicate: true,
                capacity_warning: None,
            };
        }
        Ok(false) => {}
        Err(e) => return Response::error(e.to_string()),
    }

    // Capacity is checked before the write; a refused save must not touch
    // the stored set.
    let report = match state.store.capacity_report() {
        Ok(r) => r,
        Err(e) => return Response::error(e.to_string()),
    };
    if !report.can_save {
        warn!("storage full, refusing record {}", record.id);
        return Response::Submitted {
            accepted: false,
            is_duplicate: false,
            capacity_warning: report.warning,
        };
    }

    if let Err(e) = state.store.insert(&record) {
        return Response::error(e.to_string());
    }
    state.search.index_record(&record);
    info!("archived {} from {}", record.id, record.platform);

    // Re-check so the caller hears about a newly crossed band.
    let warning = state
        .store
        .capacity_report()
        .ok()
        .and_then(|r| r.warning);
    Response::Submitted {
        accepted: true,
        is_duplicate: false,
        capacity_warning: warning,
    }
}

fn export(
    state: &ServiceState,
    format: crate::export::ExportFormat,
    ids: Option<Vec<String>>,
    filters: Option<ExportFilters>,
) -> Response {
    let records: Result<Vec<ConversationRecord>, StoreError> = match ids {
        Some(ids) if !ids.is_empty() => ids
            .iter()
            .map(|id| state.store.get(id))
            .filter_map(|r| r.transpose())
            .collect(),
        _ => {
            let filters = filters.unwrap_or_default();
            state
                .store
                .get_all()
                .map(|all| all.into_iter().filter(|r| filters.matches(r)).collect())
        }
    };

    let records = match records {
        Ok(records) => records,
        Err(e) => return Response::error(e.to_string()),
    };
    match render(&records, format) {
        Ok(content) => Response::Document { content },
        Err(e) => Response::error(e.to_string()),
    }
}
