//! File-per-entity store of dependency-linked work items.
//!
//! Layout: `<base_dir>/<task_list_id>/<id>.json`. Ids are allocated from a
//! counter recovered at startup by scanning for the highest existing id, so no
//! separate counter file is needed.
//!
//! Edge maintenance touches several files one at a time. There is no
//! cross-file transaction: a crash or a concurrent writer between two writes
//! can leave a one-sided `blocks`/`blockedBy` edge, and the last writer to a
//! given file wins.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use super::active_form::derive_active_form;
use super::types::{NewWorkItem, WorkItem, WorkItemPatch, WorkItemStats, WorkItemStatus};
use super::watch::{DirectoryWatch, WatchCallback};
use crate::config::TrackerConfig;
use crate::error::{WorkItemError, WorkItemResult};
use crate::notification::{NoopSink, NotificationSink, WorkItemAck};

pub(crate) const TASK_FILE_SUFFIX: &str = ".json";

/// Map a task-list identifier to a safe directory name.
pub fn sanitize_list_id(list_id: &str) -> String {
    list_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Parse a task file name (`"12.json"`) into its numeric id.
fn file_id(path: &Path) -> Option<u64> {
    path.file_name()?
        .to_str()?
        .strip_suffix(TASK_FILE_SUFFIX)?
        .parse()
        .ok()
}

/// Ids are positive decimal integers; anything else cannot name a task file.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// Read every parsable task file in `dir`, sorted by numeric id.
///
/// A missing directory yields an empty list. Unreadable or malformed files
/// are skipped.
pub(crate) async fn read_all(dir: &Path) -> WorkItemResult<Vec<WorkItem>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(WorkItemError::io(dir, e)),
    };

    let mut items = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| WorkItemError::io(dir, e))?
    {
        let path = entry.path();
        if file_id(&path).is_none() {
            continue;
        }
        let parsed = match tokio::fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str::<WorkItem>(&text).ok(),
            Err(_) => None,
        };
        match parsed {
            Some(item) => items.push(item),
            None => debug!(path = %path.display(), "Skipping unreadable task file"),
        }
    }

    items.sort_by_key(WorkItem::numeric_id);
    Ok(items)
}

async fn scan_max_id(dir: &Path) -> WorkItemResult<u64> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| WorkItemError::io(dir, e))?;
    let mut max = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| WorkItemError::io(dir, e))?
    {
        if let Some(id) = file_id(&entry.path()) {
            max = max.max(id);
        }
    }
    Ok(max)
}

fn push_unique(list: &mut Vec<String>, id: &str) -> bool {
    if list.iter().any(|existing| existing == id) {
        false
    } else {
        list.push(id.to_string());
        true
    }
}

fn remove_id(list: &mut Vec<String>, id: &str) -> bool {
    let before = list.len();
    list.retain(|existing| existing != id);
    before != list.len()
}

/// Persistent work-item store bound to one task list.
pub struct WorkItemStore {
    list_id: String,
    dir: PathBuf,
    next_id: Mutex<u64>,
    initialized: AtomicBool,
    sink: Arc<dyn NotificationSink>,
    watch: Mutex<Option<DirectoryWatch>>,
}

impl WorkItemStore {
    /// Create a store for `list_id` under `base_dir`. Nothing touches disk
    /// until [`init`](Self::init) or the first operation.
    pub fn new(base_dir: impl AsRef<Path>, list_id: impl Into<String>) -> Self {
        let list_id = list_id.into();
        let dir = base_dir.as_ref().join(sanitize_list_id(&list_id));
        Self {
            list_id,
            dir,
            next_id: Mutex::new(1),
            initialized: AtomicBool::new(false),
            sink: Arc::new(NoopSink),
            watch: Mutex::new(None),
        }
    }

    /// Forward CRUD acknowledgements to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Create and initialize a store.
    pub async fn open(base_dir: impl AsRef<Path>, list_id: impl Into<String>) -> WorkItemResult<Self> {
        let store = Self::new(base_dir, list_id);
        store.init().await?;
        Ok(store)
    }

    /// Open the configured default task list.
    pub async fn open_default(config: &TrackerConfig) -> WorkItemResult<Self> {
        Self::open(&config.task_lists_dir, config.default_task_list.clone()).await
    }

    pub fn list_id(&self) -> &str {
        &self.list_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn counter(&self) -> MutexGuard<'_, u64> {
        self.next_id.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ensure the directory exists and recover the id counter. Idempotent;
    /// the counter never moves backwards.
    pub async fn init(&self) -> WorkItemResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| WorkItemError::io(&self.dir, e))?;
        let max = scan_max_id(&self.dir).await?;

        let next = {
            let mut next = self.counter();
            *next = (*next).max(max + 1);
            *next
        };
        self.initialized.store(true, Ordering::SeqCst);
        debug!(list = %self.list_id, next_id = next, "Task list initialized");
        Ok(())
    }

    async fn ensure_init(&self) -> WorkItemResult<()> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.init().await
    }

    fn task_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}{TASK_FILE_SUFFIX}"))
    }

    async fn read_item(&self, id: &str) -> WorkItemResult<Option<WorkItem>> {
        if !is_valid_id(id) {
            return Ok(None);
        }
        let path = self.task_path(id);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(WorkItemError::io(path, e)),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| WorkItemError::Json { path, source })
    }

    async fn write_item(&self, item: &WorkItem) -> WorkItemResult<()> {
        let path = self.task_path(&item.id);
        let json = serde_json::to_string_pretty(item).map_err(|source| WorkItemError::Json {
            path: path.clone(),
            source,
        })?;

        // Write-then-rename so a reader never sees a torn file.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| WorkItemError::io(&tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(WorkItemError::io(path, e));
        }
        debug!(list = %self.list_id, id = %item.id, "Task written");
        Ok(())
    }

    /// Read, modify and rewrite another task as part of edge maintenance.
    /// A missing task is skipped; nothing is written if `edit` reports no change.
    async fn edit_neighbor(
        &self,
        id: &str,
        edit: impl FnOnce(&mut WorkItem) -> bool,
    ) -> WorkItemResult<()> {
        match self.read_item(id).await? {
            Some(mut item) => {
                if edit(&mut item) {
                    self.write_item(&item).await?;
                }
            }
            None => debug!(list = %self.list_id, id, "Edge target missing, skipped"),
        }
        Ok(())
    }

    fn acknowledge(&self, message: String, item: &WorkItem) {
        self.sink.work_item(WorkItemAck {
            message,
            item: item.clone(),
        });
    }

    /// Create a pending work item with the next id.
    pub async fn create(&self, input: NewWorkItem) -> WorkItemResult<WorkItem> {
        self.ensure_init().await?;

        let id = {
            let mut next = self.counter();
            let id = *next;
            *next += 1;
            id
        };

        let active_form = input
            .active_form
            .unwrap_or_else(|| derive_active_form(&input.subject));
        let item = WorkItem {
            id: id.to_string(),
            subject: input.subject,
            description: input.description,
            active_form,
            status: WorkItemStatus::Pending,
            owner: input.owner,
            blocks: Vec::new(),
            blocked_by: Vec::new(),
            metadata: input.metadata,
        };
        self.write_item(&item).await?;

        info!(list = %self.list_id, id = %item.id, "Task created");
        self.acknowledge(
            format!("Task #{} created successfully: {}", item.id, item.subject),
            &item,
        );
        Ok(item)
    }

    /// Fetch a task; `None` if it does not exist.
    pub async fn get(&self, id: &str) -> WorkItemResult<Option<WorkItem>> {
        self.read_item(id).await
    }

    /// Every parsable task in the list, ascending by id.
    pub async fn list(&self) -> WorkItemResult<Vec<WorkItem>> {
        read_all(&self.dir).await
    }

    /// Apply `patch` to task `id`.
    ///
    /// New edges are mirrored into the referenced tasks' files. Completing a
    /// task removes it from the `blocked_by` list of everything it blocks.
    /// Status values are accepted in any order.
    pub async fn update(&self, id: &str, patch: WorkItemPatch) -> WorkItemResult<WorkItem> {
        let mut item = self
            .read_item(id)
            .await?
            .ok_or_else(|| WorkItemError::NotFound(id.to_string()))?;

        if let Some(subject) = patch.subject {
            item.subject = subject;
        }
        if let Some(description) = patch.description {
            item.description = description;
        }
        if let Some(active_form) = patch.active_form {
            item.active_form = active_form;
        }
        if let Some(owner) = patch.owner {
            item.owner = Some(owner);
        }
        if let Some(status) = patch.status {
            item.status = status;
        }

        let blocks: Vec<String> = patch.add_blocks.into_iter().filter(|b| b != id).collect();
        let blocked_by: Vec<String> = patch
            .add_blocked_by
            .into_iter()
            .filter(|b| b != id)
            .collect();
        for b in &blocks {
            push_unique(&mut item.blocks, b);
        }
        for b in &blocked_by {
            push_unique(&mut item.blocked_by, b);
        }

        if let Some(changes) = patch.metadata {
            let metadata = item.metadata.get_or_insert_with(Default::default);
            for (key, value) in changes {
                if value.is_null() {
                    metadata.remove(&key);
                } else {
                    metadata.insert(key, value);
                }
            }
        }

        self.write_item(&item).await?;

        for target in &blocks {
            self.edit_neighbor(target, |other| push_unique(&mut other.blocked_by, id))
                .await?;
        }
        for blocker in &blocked_by {
            self.edit_neighbor(blocker, |other| push_unique(&mut other.blocks, id))
                .await?;
        }
        if patch.status == Some(WorkItemStatus::Completed) {
            for target in &item.blocks {
                self.edit_neighbor(target, |other| remove_id(&mut other.blocked_by, id))
                    .await?;
            }
        }

        debug!(list = %self.list_id, id, "Task updated");
        self.acknowledge(format!("Task #{id} updated successfully"), &item);
        Ok(item)
    }

    /// Delete task `id`, repairing the edges of its neighbours.
    /// Returns `false` if the task did not exist.
    pub async fn delete(&self, id: &str) -> WorkItemResult<bool> {
        let Some(item) = self.read_item(id).await? else {
            return Ok(false);
        };

        for blocker in &item.blocked_by {
            self.edit_neighbor(blocker, |other| remove_id(&mut other.blocks, id))
                .await?;
        }
        for target in &item.blocks {
            self.edit_neighbor(target, |other| remove_id(&mut other.blocked_by, id))
                .await?;
        }

        let path = self.task_path(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(WorkItemError::io(path, e)),
        }

        info!(list = %self.list_id, id, "Task deleted");
        self.acknowledge(format!("Task #{id} deleted successfully"), &item);
        Ok(true)
    }

    pub async fn get_stats(&self) -> WorkItemResult<WorkItemStats> {
        let items = self.list().await?;
        Ok(WorkItemStats::tally(&items))
    }

    /// Re-list the task list and deliver it to `callback` whenever a task
    /// file in the directory changes, including changes made by other
    /// processes. Replaces any previous subscription.
    pub async fn watch<F>(&self, callback: F) -> WorkItemResult<()>
    where
        F: Fn(Vec<WorkItem>) + Send + Sync + 'static,
    {
        self.ensure_init().await?;
        let callback: WatchCallback = Arc::new(callback);
        let watch = DirectoryWatch::spawn(self.dir.clone(), callback)?;
        *self.watch.lock().unwrap_or_else(PoisonError::into_inner) = Some(watch);
        Ok(())
    }

    pub fn is_watching(&self) -> bool {
        self.watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Tear down the watch subscription, if any.
    pub fn close(&self) {
        let watch = self
            .watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if watch.is_some() {
            debug!(list = %self.list_id, "Task list watch closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_list_ids() {
        assert_eq!(sanitize_list_id("team/alpha beta"), "team-alpha-beta");
        assert_eq!(sanitize_list_id("ok_id-1"), "ok_id-1");
        assert_eq!(sanitize_list_id("../etc"), "---etc");
    }

    #[test]
    fn parses_task_file_names() {
        assert_eq!(file_id(Path::new("/x/12.json")), Some(12));
        assert_eq!(file_id(Path::new("/x/12.json.tmp")), None);
        assert_eq!(file_id(Path::new("/x/notes.json")), None);
    }

    #[test]
    fn rejects_path_like_ids() {
        assert!(is_valid_id("42"));
        assert!(!is_valid_id("../1"));
        assert!(!is_valid_id(""));
    }
}
