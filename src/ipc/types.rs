use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::Deserialize;
use tracing::info;

use crate::actions::ActionBar;
use crate::backend::{ChangeEvent, Persistence, SqliteBackend, SubscriptionHandle};
use crate::config::Config;
use crate::db;
use crate::error::RecordsResult;
use crate::form::{FormController, Program};
use crate::listing::ListSurface;
use crate::record::EntityKind;
use crate::schema::SchemaRegistry;
use crate::storage::FileStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// An open form plus what it needs to render.
pub struct FormSession {
    pub controller: FormController,
    pub programs: Vec<Program>,
    /// List view whose action bar opened this form.
    pub list_id: Option<String>,
}

/// A list surface and the action bar sitting above it.
pub struct ListView {
    pub surface: ListSurface,
    pub actions: ActionBar,
}

/// Most change events a feed holds between polls.
pub const FEED_CAPACITY: usize = 256;

/// Change events waiting for a poll. Past capacity the oldest are dropped and counted;
/// the row count returned with every poll stays exact either way.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<ChangeEvent>,
    dropped: usize,
}

impl EventQueue {
    pub fn push(&mut self, event: ChangeEvent) {
        if self.events.len() >= FEED_CAPACITY {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
    }

    /// Queued events and how many were dropped since the last drain.
    pub fn drain(&mut self) -> (Vec<ChangeEvent>, usize) {
        let events = self.events.drain(..).collect();
        (events, std::mem::take(&mut self.dropped))
    }
}

pub struct Feed {
    pub table: String,
    pub handle: SubscriptionHandle,
    pub queue: Rc<RefCell<EventQueue>>,
}

pub struct AppState {
    pub config: Config,
    pub workspace: Option<PathBuf>,
    pub backend: Option<SqliteBackend>,
    pub files: Option<FileStore>,
    pub registry: SchemaRegistry,
    pub forms: HashMap<String, FormSession>,
    pub lists: HashMap<String, ListView>,
    pub feeds: HashMap<String, Feed>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            workspace: None,
            backend: None,
            files: None,
            registry: SchemaRegistry::new(),
            forms: HashMap::new(),
            lists: HashMap::new(),
            feeds: HashMap::new(),
        }
    }

    /// Opens (or creates) the workspace database and rebuilds the schema registry
    /// from it. Open forms, lists and feeds belong to the previous workspace and
    /// are dropped. Returns the custom columns picked up per entity.
    pub fn open_workspace(&mut self, path: &Path) -> anyhow::Result<BTreeMap<String, Vec<String>>> {
        let conn = db::open_db(path)?;
        let backend = SqliteBackend::new(conn);

        let mut registry = SchemaRegistry::new();
        let mut added = BTreeMap::new();
        for kind in EntityKind::ALL {
            let columns = backend.columns(kind.table())?;
            let names = registry.refresh_from_columns(kind, &columns);
            if !names.is_empty() {
                added.insert(kind.as_str().to_string(), names);
            }
        }

        self.forms.clear();
        self.lists.clear();
        self.feeds.clear();
        self.files = Some(FileStore::new(self.config.storage_root(path)));
        self.registry = registry;
        self.backend = Some(backend);
        self.workspace = Some(path.to_path_buf());
        info!(workspace = %path.to_string_lossy(), "workspace opened");
        Ok(added)
    }

    /// Re-reads the backend's columns for one entity into the registry.
    pub fn refresh_registry(&mut self, kind: EntityKind) -> RecordsResult<Vec<String>> {
        let Some(backend) = self.backend.as_ref() else {
            return Ok(Vec::new());
        };
        let columns = backend.columns(kind.table())?;
        Ok(self.registry.refresh_from_columns(kind, &columns))
    }
}
