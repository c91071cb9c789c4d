// Concurrent board store with snapshot persistence

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::models::{Category, CategoryPatch, Task, TaskPatch};
use crate::record::{Record, index_by_id, lookup, lookup_mut};
use crate::snapshot::{self, Snapshot};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Ordered tasks per column, as returned by [`Store::serialize`]
pub type Board = BTreeMap<String, Vec<Task>>;

/// Everything guarded by the store lock
#[derive(Debug, Default)]
struct BoardState {
    tasks: HashMap<String, Task>,
    categories: HashMap<String, Category>,
    columns: BTreeMap<String, Vec<String>>,
    dirty: bool,
}

/// Thread-safe board store backed by a JSON snapshot file
///
/// A single mutex guards all state, including during snapshot file I/O, so
/// every operation observes a fully applied prior mutation. Share it between
/// request handlers and the [`Persister`](crate::Persister) as `Arc<Store>`.
pub struct Store {
    path: PathBuf,
    state: Mutex<BoardState>,
}

impl Store {
    /// Open the store described by `config`
    ///
    /// Loads the snapshot file when present. Otherwise seeds the default board
    /// and marks it dirty so the first persister tick writes it out.
    pub fn open(config: &Config) -> Self {
        let store = Self::empty(&config.snapshot_path);
        if !store.load_from_file() {
            info!(file = ?store.path, "No usable snapshot, seeding default board");
            let mut state = store.lock();
            seed_default(&mut state);
        }
        store
    }

    /// Create an empty, clean store that persists to `path`
    pub fn empty<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state: Mutex::new(BoardState::default()),
        }
    }

    /// Get the snapshot file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether state has changed since the last successful save or load
    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    // Every mutation leaves the state consistent before anything that could
    // panic, so a poisoned lock still guards valid data.
    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========================================================================
    // Task operations
    // ========================================================================

    /// Append a task to the end of `column_id`, creating the column if needed
    ///
    /// The caller guarantees the task id is unused. Fails if the task refers
    /// to a category that does not exist.
    pub fn add_task(&self, task: Task, column_id: &str) -> Result<()> {
        let mut state = self.lock();
        if let Some(category_id) = &task.category_id {
            lookup(&state.categories, category_id)?;
        }

        debug!(id = %task.id, column = column_id, "add_task");
        state.columns.entry(column_id.to_string()).or_default().push(task.id.clone());
        state.tasks.insert(task.id.clone(), task);
        state.dirty = true;
        Ok(())
    }

    /// Get a task by ID
    pub fn get_task(&self, id: &str) -> Result<Task> {
        let state = self.lock();
        lookup(&state.tasks, id).cloned()
    }

    /// Apply only the fields present in `patch`
    pub fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task> {
        let mut state = self.lock();
        lookup(&state.tasks, id)?;
        if let Some(Some(category_id)) = &patch.category_id {
            lookup(&state.categories, category_id)?;
        }

        let task = lookup_mut(&mut state.tasks, id)?;
        patch.apply(task);
        let updated = task.clone();
        state.dirty = true;

        debug!(id, "update_task");
        Ok(updated)
    }

    /// Remove a task from the task map and from its column
    pub fn delete_task(&self, id: &str) -> Result<Task> {
        let mut state = self.lock();
        let task = state
            .tasks
            .remove(id)
            .ok_or_else(|| StoreError::not_found(Task::kind(), id))?;
        detach_from_column(&mut state, id);
        state.dirty = true;

        debug!(id, "delete_task");
        Ok(task)
    }

    /// Move a task to `target_index` in `target_column`
    ///
    /// The index is clamped into `[0, len]` of the target column after the
    /// task has been removed from its current position, so moving within the
    /// same column behaves like a list reorder.
    pub fn move_task(&self, id: &str, target_column: &str, target_index: i64) -> Result<Task> {
        let mut state = self.lock();
        let task = lookup(&state.tasks, id)?.clone();

        detach_from_column(&mut state, id);
        let column = state.columns.entry(target_column.to_string()).or_default();
        let index = clamp_index(target_index, column.len());
        column.insert(index, id.to_string());
        state.dirty = true;

        debug!(id, column = target_column, index, "move_task");
        Ok(task)
    }

    /// Delete every task in a column and leave the column empty
    ///
    /// Returns the number of tasks removed. A missing column is a no-op.
    pub fn empty_column(&self, column_id: &str) -> usize {
        let mut state = self.lock();
        let Some(ids) = state.columns.get_mut(column_id).map(std::mem::take) else {
            return 0;
        };

        for id in &ids {
            state.tasks.remove(id);
        }
        state.dirty = true;

        debug!(column = column_id, removed = ids.len(), "empty_column");
        ids.len()
    }

    /// Copy of every column with its tasks in order
    pub fn serialize(&self) -> Board {
        let state = self.lock();
        state
            .columns
            .iter()
            .map(|(column_id, ids)| (column_id.clone(), resolve(&state.tasks, ids)))
            .collect()
    }

    /// All tasks, column by column
    pub fn list_tasks(&self) -> Vec<Task> {
        let state = self.lock();
        state.columns.values().flat_map(|ids| resolve(&state.tasks, ids)).collect()
    }

    /// Known column ids in sorted order
    pub fn column_ids(&self) -> Vec<String> {
        self.lock().columns.keys().cloned().collect()
    }

    /// Tasks of a single column in order
    pub fn column(&self, column_id: &str) -> Result<Vec<Task>> {
        let state = self.lock();
        let ids = state
            .columns
            .get(column_id)
            .ok_or_else(|| StoreError::not_found("column", column_id))?;
        Ok(resolve(&state.tasks, ids))
    }

    /// Column and index currently holding a task
    pub fn locate_task(&self, id: &str) -> Result<(String, usize)> {
        let state = self.lock();
        lookup(&state.tasks, id)?;
        state
            .columns
            .iter()
            .find_map(|(column_id, ids)| ids.iter().position(|t| t == id).map(|i| (column_id.clone(), i)))
            .ok_or_else(|| StoreError::not_found("column", id))
    }

    // ========================================================================
    // Category operations
    // ========================================================================

    /// Insert a category, replacing any with the same id
    pub fn add_category(&self, category: Category) {
        let mut state = self.lock();
        debug!(id = %category.id, name = %category.name, "add_category");
        state.categories.insert(category.id.clone(), category);
        state.dirty = true;
    }

    /// Get a category by ID
    pub fn get_category(&self, id: &str) -> Result<Category> {
        let state = self.lock();
        lookup(&state.categories, id).cloned()
    }

    /// Copy of all categories keyed by id
    pub fn get_all_categories(&self) -> BTreeMap<String, Category> {
        let state = self.lock();
        state.categories.iter().map(|(id, c)| (id.clone(), c.clone())).collect()
    }

    /// Apply only the fields present in `patch`
    pub fn update_category(&self, id: &str, patch: CategoryPatch) -> Result<Category> {
        let mut state = self.lock();
        let category = lookup_mut(&mut state.categories, id)?;
        patch.apply(category);
        let updated = category.clone();
        state.dirty = true;

        debug!(id, "update_category");
        Ok(updated)
    }

    /// Remove a category and clear it from every task that used it
    ///
    /// Returns the number of tasks that were detached.
    pub fn delete_category(&self, id: &str) -> Result<usize> {
        let mut state = self.lock();
        state
            .categories
            .remove(id)
            .ok_or_else(|| StoreError::not_found(Category::kind(), id))?;

        let mut detached = 0;
        for task in state.tasks.values_mut() {
            if task.category_id.as_deref() == Some(id) {
                task.category_id = None;
                detached += 1;
            }
        }
        state.dirty = true;

        debug!(id, detached, "delete_category");
        Ok(detached)
    }

    // ========================================================================
    // Snapshot operations
    // ========================================================================

    /// Project the full state into a snapshot (without timestamp)
    pub fn export_snapshot(&self) -> Snapshot {
        export(&self.lock())
    }

    /// Replace all state with the contents of `snapshot`
    pub fn import_snapshot(&self, snapshot: Snapshot) {
        let mut state = self.lock();
        import(&mut state, snapshot);
        state.dirty = true;
    }

    /// Write a snapshot if anything changed since the last save
    ///
    /// Returns `true` only when a file was written. Failures are logged and
    /// leave the dirty flag set so a later call retries.
    pub fn save_to_file(&self) -> bool {
        let mut state = self.lock();
        if !state.dirty {
            return false;
        }

        let snapshot = export(&state).stamped();
        match snapshot::write_snapshot(&self.path, &snapshot) {
            Ok(()) => {
                state.dirty = false;
                info!(
                    file = ?self.path,
                    tasks = snapshot.tasks.len(),
                    categories = snapshot.categories.len(),
                    "Saved snapshot"
                );
                true
            }
            Err(e) => {
                error!(file = ?self.path, error = %e, "Failed to save snapshot");
                false
            }
        }
    }

    /// Replace state from the snapshot file
    ///
    /// Returns `false` when the file is missing or unreadable, in which case
    /// the current state is untouched.
    pub fn load_from_file(&self) -> bool {
        let mut state = self.lock();
        let snapshot = match snapshot::read_snapshot(&self.path) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!(file = ?self.path, "No snapshot file");
                return false;
            }
            Err(e) => {
                warn!(file = ?self.path, error = %e, "Failed to load snapshot");
                return false;
            }
        };

        let stamp = snapshot.backup_timestamp.clone();
        import(&mut state, snapshot);
        state.dirty = false;

        info!(
            file = ?self.path,
            tasks = state.tasks.len(),
            columns = state.columns.len(),
            categories = state.categories.len(),
            backup_timestamp = stamp.as_deref().unwrap_or("unknown"),
            "Loaded snapshot"
        );
        true
    }
}

// ============================================================================
// Helpers operating on already-locked state
// ============================================================================

fn clamp_index(index: i64, len: usize) -> usize {
    usize::try_from(index).map_or(0, |i| i.min(len))
}

fn resolve(tasks: &HashMap<String, Task>, ids: &[String]) -> Vec<Task> {
    ids.iter().filter_map(|id| tasks.get(id).cloned()).collect()
}

fn detach_from_column(state: &mut BoardState, id: &str) {
    for ids in state.columns.values_mut() {
        if let Some(pos) = ids.iter().position(|t| t == id) {
            ids.remove(pos);
            return;
        }
    }
}

fn export(state: &BoardState) -> Snapshot {
    Snapshot {
        tasks: state.tasks.iter().map(|(id, t)| (id.clone(), t.clone())).collect(),
        columns: state.columns.clone(),
        categories: state.categories.iter().map(|(id, c)| (id.clone(), c.clone())).collect(),
        backup_timestamp: None,
    }
}

fn import(state: &mut BoardState, snapshot: Snapshot) {
    let categories = index_by_id(snapshot.categories.into_values());
    let mut records = index_by_id(snapshot.tasks.into_values());

    let mut tasks = HashMap::with_capacity(records.len());
    let mut columns = BTreeMap::new();
    let mut placed = HashSet::new();

    for (column_id, ids) in snapshot.columns {
        let mut sequence = Vec::with_capacity(ids.len());
        for id in ids {
            if !placed.insert(id.clone()) {
                warn!(id, column = %column_id, "Task listed in more than one column, keeping first placement");
                continue;
            }
            let Some(mut task) = records.remove(&id) else {
                warn!(id, column = %column_id, "Column references unknown task, skipping");
                continue;
            };
            if task.category_id.as_ref().is_some_and(|c| !categories.contains_key(c)) {
                warn!(id, category = ?task.category_id, "Task references unknown category, clearing");
                task.category_id = None;
            }
            sequence.push(id.clone());
            tasks.insert(id, task);
        }
        columns.insert(column_id, sequence);
    }

    for id in records.keys() {
        warn!(id, "Task not placed in any column, dropping");
    }

    state.tasks = tasks;
    state.columns = columns;
    state.categories = categories;
}

fn seed_default(state: &mut BoardState) {
    let seed = [
        ("ideas", Task::new("Plan project").with_description("Outline phases and resources")),
        ("selected", Task::new("Develop API").with_description("Implement task endpoints")),
        ("selected", Task::new("Develop API2").with_description("Implement task endpoints")),
    ];

    for (column_id, task) in seed {
        state.columns.entry(column_id.to_string()).or_default().push(task.id.clone());
        state.tasks.insert(task.id.clone(), task);
    }
    state.dirty = true;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn fresh(temp: &TempDir) -> Store {
        Store::empty(temp.path().join("board.json"))
    }

    fn titles(board: &Board, column: &str) -> Vec<String> {
        board[column].iter().map(|t| t.title.clone()).collect()
    }

    // Every task sits in exactly one column, and every column entry is a task
    fn assert_consistent(store: &Store) {
        let state = store.lock();
        let mut seen = HashSet::new();
        for ids in state.columns.values() {
            for id in ids {
                assert!(state.tasks.contains_key(id), "column lists unknown task {id}");
                assert!(seen.insert(id.clone()), "task {id} placed twice");
            }
        }
        assert_eq!(seen.len(), state.tasks.len(), "orphan task in task map");
        for task in state.tasks.values() {
            if let Some(category_id) = &task.category_id {
                assert!(state.categories.contains_key(category_id));
            }
        }
    }

    #[test]
    fn test_open_seeds_default_board() {
        let temp = TempDir::new().unwrap();
        let store = Store::open(&Config::with_snapshot_path(temp.path().join("board.json")));

        let board = store.serialize();
        assert_eq!(titles(&board, "ideas"), vec!["Plan project"]);
        assert_eq!(titles(&board, "selected"), vec!["Develop API", "Develop API2"]);
        assert!(store.is_dirty());
        assert_consistent(&store);
    }

    #[test]
    fn test_open_prefers_snapshot_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("board.json");
        {
            let store = Store::empty(&path);
            store.add_task(Task::new("Persisted"), "done").unwrap();
            assert!(store.save_to_file());
        }

        let store = Store::open(&Config::with_snapshot_path(&path));
        let board = store.serialize();
        assert_eq!(board.len(), 1);
        assert_eq!(titles(&board, "done"), vec!["Persisted"]);
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_open_with_corrupt_file_seeds_default() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("board.json");
        fs::write(&path, "[1, 2").unwrap();

        let store = Store::open(&Config::with_snapshot_path(&path));
        assert!(store.serialize().contains_key("ideas"));
        assert!(store.is_dirty());
    }

    #[test]
    fn test_add_and_get_task() {
        let temp = TempDir::new().unwrap();
        let store = fresh(&temp);
        let task = Task::new("Test Task").with_description("Test description");

        store.add_task(task.clone(), "test_column").unwrap();

        assert_eq!(store.get_task(&task.id).unwrap(), task);
        assert_eq!(store.serialize()["test_column"].len(), 1);
        assert!(store.is_dirty());
        assert_consistent(&store);
    }

    #[test]
    fn test_add_task_with_unknown_category_rejected() {
        let temp = TempDir::new().unwrap();
        let store = fresh(&temp);

        let err = store.add_task(Task::new("A").with_category("nope"), "todo").unwrap_err();
        assert!(err.is_not_found());
        assert!(store.serialize().is_empty());
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_board_scenario() {
        let temp = TempDir::new().unwrap();
        let store = fresh(&temp);
        let a = Task::new("A");
        let b = Task::new("B");

        store.add_task(a.clone(), "todo").unwrap();
        assert_eq!(store.serialize()["todo"].len(), 1);

        store.add_task(b.clone(), "todo").unwrap();
        assert_eq!(titles(&store.serialize(), "todo"), vec!["A", "B"]);

        store.move_task(&a.id, "todo", 1).unwrap();
        assert_eq!(titles(&store.serialize(), "todo"), vec!["B", "A"]);
        assert_consistent(&store);

        store.delete_task(&b.id).unwrap();
        assert_eq!(titles(&store.serialize(), "todo"), vec!["A"]);

        assert_eq!(store.empty_column("todo"), 1);
        assert!(store.serialize()["todo"].is_empty());
        assert!(store.get_task(&a.id).unwrap_err().is_not_found());
        assert_consistent(&store);
    }

    #[test]
    fn test_move_between_columns() {
        let temp = TempDir::new().unwrap();
        let store = fresh(&temp);
        let task = Task::new("Mover");
        store.add_task(task.clone(), "source").unwrap();

        store.move_task(&task.id, "target", 0).unwrap();

        let board = store.serialize();
        assert!(board["source"].is_empty());
        assert_eq!(board["target"], vec![task.clone()]);
        assert_eq!(store.locate_task(&task.id).unwrap(), ("target".to_string(), 0));
        assert_consistent(&store);
    }

    #[test]
    fn test_move_clamps_index() {
        let temp = TempDir::new().unwrap();
        let store = fresh(&temp);
        let tasks: Vec<Task> = ["A", "B", "C"].into_iter().map(Task::new).collect();
        for task in &tasks {
            store.add_task(task.clone(), "todo").unwrap();
        }

        store.move_task(&tasks[0].id, "todo", 99).unwrap();
        assert_eq!(titles(&store.serialize(), "todo"), vec!["B", "C", "A"]);

        store.move_task(&tasks[0].id, "todo", -5).unwrap();
        assert_eq!(titles(&store.serialize(), "todo"), vec!["A", "B", "C"]);

        store.move_task(&tasks[2].id, "done", 7).unwrap();
        assert_eq!(titles(&store.serialize(), "done"), vec!["C"]);
        assert_consistent(&store);
    }

    #[test]
    fn test_update_task_is_partial() {
        let temp = TempDir::new().unwrap();
        let store = fresh(&temp);
        let task = Task::new("Original").with_description("keep me");
        store.add_task(task.clone(), "todo").unwrap();

        let updated = store
            .update_task(
                &task.id,
                TaskPatch {
                    title: Some("Renamed".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.description.as_deref(), Some("keep me"));
        assert_eq!(store.get_task(&task.id).unwrap(), updated);
    }

    #[test]
    fn test_update_task_unknown_category_applies_nothing() {
        let temp = TempDir::new().unwrap();
        let store = fresh(&temp);
        let task = Task::new("Original");
        store.add_task(task.clone(), "todo").unwrap();

        let patch = TaskPatch {
            title: Some("Renamed".to_string()),
            category_id: Some(Some("ghost".to_string())),
            ..Default::default()
        };
        let err = store.update_task(&task.id, patch).unwrap_err();

        assert!(matches!(err, StoreError::NotFound { kind: "category", .. }));
        assert_eq!(store.get_task(&task.id).unwrap().title, "Original");
    }

    #[test]
    fn test_missing_task_operations_fail_without_mutation() {
        let temp = TempDir::new().unwrap();
        let store = fresh(&temp);

        assert!(store.get_task("missing").unwrap_err().is_not_found());
        assert!(store.update_task("missing", TaskPatch::default()).unwrap_err().is_not_found());
        assert!(store.delete_task("missing").unwrap_err().is_not_found());
        assert!(store.move_task("missing", "todo", 0).unwrap_err().is_not_found());
        assert!(store.locate_task("missing").unwrap_err().is_not_found());

        assert!(!store.is_dirty());
        assert!(store.serialize().is_empty());
    }

    #[test]
    fn test_empty_missing_column_is_noop() {
        let temp = TempDir::new().unwrap();
        let store = fresh(&temp);

        assert_eq!(store.empty_column("nowhere"), 0);
        assert!(!store.is_dirty());
        assert!(store.column("nowhere").unwrap_err().is_not_found());
    }

    #[test]
    fn test_empty_column_leaves_other_columns() {
        let temp = TempDir::new().unwrap();
        let store = fresh(&temp);
        let keep = Task::new("Keep");
        store.add_task(Task::new("Drop 1"), "done").unwrap();
        store.add_task(Task::new("Drop 2"), "done").unwrap();
        store.add_task(keep.clone(), "todo").unwrap();

        assert_eq!(store.empty_column("done"), 2);

        assert_eq!(store.list_tasks(), vec![keep]);
        assert_eq!(store.column_ids(), vec!["done", "todo"]);
        assert!(store.column("done").unwrap().is_empty());
        assert_consistent(&store);
    }

    #[test]
    fn test_serialize_returns_independent_copy() {
        let temp = TempDir::new().unwrap();
        let store = fresh(&temp);
        let task = Task::new("Original");
        store.add_task(task.clone(), "todo").unwrap();

        let mut board = store.serialize();
        board.get_mut("todo").unwrap()[0].title = "Tampered".to_string();
        board.insert("extra".to_string(), Vec::new());

        let fresh_board = store.serialize();
        assert_eq!(fresh_board["todo"][0].title, "Original");
        assert!(!fresh_board.contains_key("extra"));
    }

    #[test]
    fn test_category_crud() {
        let temp = TempDir::new().unwrap();
        let store = fresh(&temp);
        let category = Category::new("Bug", "red");
        store.add_category(category.clone());

        assert_eq!(store.get_category(&category.id).unwrap(), category);

        let updated = store
            .update_category(
                &category.id,
                CategoryPatch {
                    name: Some("Defect".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Defect");
        assert_eq!(updated.color, "red");

        let mut all = store.get_all_categories();
        all.clear();
        assert_eq!(store.get_all_categories().len(), 1);

        assert!(store.get_category("missing").unwrap_err().is_not_found());
        assert!(
            store
                .update_category("missing", CategoryPatch::default())
                .unwrap_err()
                .is_not_found()
        );
        assert!(store.delete_category("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_category_detaches_tasks() {
        let temp = TempDir::new().unwrap();
        let store = fresh(&temp);
        let bug = Category::new("Bug", "red");
        let feature = Category::new("Feature", "green");
        store.add_category(bug.clone());
        store.add_category(feature.clone());

        let tagged: Vec<Task> = (0..3).map(|i| Task::new(format!("Bug {i}")).with_category(&bug.id)).collect();
        for task in &tagged {
            store.add_task(task.clone(), "todo").unwrap();
        }
        let other = Task::new("Shiny").with_category(&feature.id);
        store.add_task(other.clone(), "todo").unwrap();

        assert_eq!(store.delete_category(&bug.id).unwrap(), 3);

        for task in &tagged {
            assert_eq!(store.get_task(&task.id).unwrap().category_id, None);
        }
        assert_eq!(store.get_task(&other.id).unwrap().category_id, Some(feature.id.clone()));
        assert!(!store.get_all_categories().contains_key(&bug.id));
        assert_consistent(&store);
    }

    #[test]
    fn test_export_import_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = fresh(&temp);
        let category = Category::new("Ops", "grey");
        store.add_category(category.clone());
        store.add_task(Task::new("One").with_category(&category.id), "todo").unwrap();
        store.add_task(Task::new("Two"), "todo").unwrap();
        store.add_task(Task::new("Three"), "done").unwrap();
        let exported = store.export_snapshot();

        let other = Store::empty(temp.path().join("other.json"));
        other.import_snapshot(exported.clone());

        assert_eq!(other.export_snapshot(), exported);
        assert_eq!(other.serialize(), store.serialize());
        assert_eq!(other.get_all_categories(), store.get_all_categories());
    }

    #[test]
    fn test_import_enforces_invariants() {
        let temp = TempDir::new().unwrap();
        let store = fresh(&temp);
        let raw = r#"{
            "tasks": {
                "t1": {"id": "t1", "title": "Placed", "category_id": "gone"},
                "t2": {"id": "t2", "title": "Orphan"}
            },
            "columns": {"a": ["t1", "ghost"], "b": ["t1"]}
        }"#;
        store.import_snapshot(serde_json::from_str(raw).unwrap());

        let board = store.serialize();
        assert_eq!(titles(&board, "a"), vec!["Placed"]);
        assert!(board["b"].is_empty());
        assert_eq!(store.get_task("t1").unwrap().category_id, None);
        assert!(store.get_task("t2").unwrap_err().is_not_found());
        assert_consistent(&store);
    }

    #[test]
    fn test_save_once_per_batch() {
        let temp = TempDir::new().unwrap();
        let store = fresh(&temp);

        assert!(!store.save_to_file());
        store.add_task(Task::new("A"), "todo").unwrap();
        store.add_task(Task::new("B"), "todo").unwrap();

        assert!(store.save_to_file());
        assert!(!store.save_to_file());
        assert!(store.path().exists());

        store.empty_column("todo");
        assert!(store.save_to_file());
        assert!(!store.save_to_file());
    }

    #[test]
    fn test_save_failure_keeps_dirty() {
        let temp = TempDir::new().unwrap();
        // Parent is a regular file, so the write cannot succeed
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let store = Store::empty(blocker.join("board.json"));
        store.add_task(Task::new("A"), "todo").unwrap();

        assert!(!store.save_to_file());
        assert!(store.is_dirty());
        assert_eq!(store.serialize()["todo"].len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let store = fresh(&temp);
        store.add_task(Task::new("Stay"), "todo").unwrap();

        assert!(!store.load_from_file());
        assert_eq!(store.list_tasks().len(), 1);
        assert!(store.is_dirty());
    }

    #[test]
    fn test_load_malformed_file_leaves_state() {
        let temp = TempDir::new().unwrap();
        let store = fresh(&temp);
        store.add_task(Task::new("Stay"), "todo").unwrap();
        fs::write(store.path(), r#"{"tasks": {"t1": {"id": 1}}, "columns": {}}"#).unwrap();

        assert!(!store.load_from_file());
        assert_eq!(titles(&store.serialize(), "todo"), vec!["Stay"]);
    }

    #[test]
    fn test_load_legacy_snapshot() {
        let temp = TempDir::new().unwrap();
        let store = fresh(&temp);
        fs::write(
            store.path(),
            r#"{
                "tasks": {"t1": {"id": "t1", "title": "Old", "description": "v1"}},
                "columns": {"ideas": ["t1"]},
                "backup_timestamp": "2024-01-01T00:00:00"
            }"#,
        )
        .unwrap();

        assert!(store.load_from_file());
        assert!(!store.is_dirty());
        assert_eq!(store.get_task("t1").unwrap().category_id, None);
        assert!(store.get_all_categories().is_empty());
    }

    #[test]
    fn test_concurrent_mutations_stay_consistent() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(fresh(&temp));
        let num_threads: usize = 8;
        let per_thread: usize = 25;

        let handles: Vec<_> = (0..num_threads)
            .map(|n| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..per_thread {
                        let task = Task::new(format!("t{n}-{i}"));
                        store.add_task(task.clone(), "todo").unwrap();
                        if i % 2 == 0 {
                            store.move_task(&task.id, "doing", 0).unwrap();
                        }
                        if i % 5 == 0 {
                            store.delete_task(&task.id).unwrap();
                        }
                        if i % 7 == 0 {
                            store.save_to_file();
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let expected = num_threads * (per_thread - per_thread.div_ceil(5));
        assert_eq!(store.list_tasks().len(), expected);
        assert_consistent(&store);
    }

    #[test]
    fn test_clamp_index() {
        assert_eq!(clamp_index(-1, 3), 0);
        assert_eq!(clamp_index(0, 0), 0);
        assert_eq!(clamp_index(2, 3), 2);
        assert_eq!(clamp_index(3, 3), 3);
        assert_eq!(clamp_index(i64::MAX, 3), 3);
    }
}
