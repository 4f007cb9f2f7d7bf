use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::models::{
    self, AddTaskSpec, BatchOperation, BatchResult, CreateLayerSpec, CreateTaskSpec,
    ExecutionPointer, LayerTaskEntry, Map, NextTask, RemoveTaskSpec, ReplaceTaskSpec, Task,
    TaskLayer, TaskStatus, UpdateHooksSpec,
};
use crate::{Result, SpiralError};

struct TaskStackInner {
    tasks: HashMap<String, Task>,
    layers: Vec<TaskLayer>,
    pointer: Option<ExecutionPointer>,
    task_counter: u64,
    layer_counter: u64,
}

impl TaskStackInner {
    fn is_layer_executed(&self, layer_index: usize) -> bool {
        match self.pointer {
            Some(p) => layer_index < p.layer_index,
            None => false,
        }
    }

    fn is_task_executed(&self, layer_index: usize, task_index: usize) -> bool {
        match self.pointer {
            Some(p) => p.is_executed(layer_index, task_index),
            None => false,
        }
    }

    fn renumber_layers(&mut self) {
        for (idx, layer) in self.layers.iter_mut().enumerate() {
            layer.layer_index = idx;
        }
    }

    fn create_task_internal(&mut self, description: Map) -> Task {
        self.task_counter += 1;
        let id = models::ids::next("task", self.task_counter);
        let task = Task::new(id.clone(), description);
        self.tasks.insert(id, task.clone());
        task
    }

    fn create_layer_internal(
        &mut self,
        index: Option<usize>,
        pre_hook: Option<String>,
        post_hook: Option<String>,
    ) -> TaskLayer {
        let insert_at = index.unwrap_or(self.layers.len()).min(self.layers.len());
        self.layer_counter += 1;
        let layer = TaskLayer::new(insert_at, pre_hook, post_hook);
        self.layers.insert(insert_at, layer.clone());
        self.renumber_layers();
        self.layers[insert_at].clone()
    }

    fn add_task_to_layer_internal(
        &mut self,
        layer_index: usize,
        task_id: &str,
        insert_index: Option<usize>,
    ) -> std::result::Result<(), String> {
        if !self.tasks.contains_key(task_id) {
            return Err(format!("task {task_id} not found"));
        }
        if layer_index >= self.layers.len() {
            return Err(format!("layer {layer_index} not found"));
        }
        if self.is_layer_executed(layer_index) {
            return Err(format!("layer {layer_index} is already executed"));
        }

        let layer = &self.layers[layer_index];
        if layer.tasks.iter().any(|t| t.task_id == task_id) {
            return Err(format!("task {task_id} already present in layer {layer_index}"));
        }

        let insert_at = insert_index.unwrap_or(layer.tasks.len()).min(layer.tasks.len());
        if let Some(pointer) = self.pointer {
            if layer_index == pointer.layer_index && insert_at <= pointer.task_index {
                return Err("cannot insert at or before the execution frontier".to_string());
            }
        }

        self.layers[layer_index].tasks.insert(
            insert_at,
            LayerTaskEntry {
                task_id: task_id.to_string(),
                created_at: chrono::Utc::now(),
            },
        );
        Ok(())
    }

    fn remove_task_from_layer_internal(
        &mut self,
        layer_index: usize,
        task_id: &str,
    ) -> std::result::Result<(), String> {
        if layer_index >= self.layers.len() {
            return Err(format!("layer {layer_index} not found"));
        }
        let Some(task_index) = self.layers[layer_index]
            .tasks
            .iter()
            .position(|t| t.task_id == task_id)
        else {
            return Err(format!("task {task_id} not found in layer {layer_index}"));
        };
        if self.is_task_executed(layer_index, task_index) {
            return Err("cannot remove an already-executed task".to_string());
        }
        self.layers[layer_index].tasks.remove(task_index);
        Ok(())
    }

    fn replace_task_in_layer_internal(
        &mut self,
        layer_index: usize,
        old_id: &str,
        new_id: &str,
    ) -> std::result::Result<(), String> {
        if layer_index >= self.layers.len() {
            return Err(format!("layer {layer_index} not found"));
        }
        if !self.tasks.contains_key(new_id) {
            return Err(format!("task {new_id} not found"));
        }
        let Some(task_index) = self.layers[layer_index]
            .tasks
            .iter()
            .position(|t| t.task_id == old_id)
        else {
            return Err(format!("task {old_id} not found in layer {layer_index}"));
        };
        if self.is_task_executed(layer_index, task_index) {
            return Err("cannot replace an already-executed task".to_string());
        }
        if self.layers[layer_index].tasks.iter().any(|t| t.task_id == new_id) {
            return Err(format!("task {new_id} already present in layer {layer_index}"));
        }

        if let Some(old_task) = self.tasks.get_mut(old_id) {
            old_task.status = TaskStatus::Cancelled;
            old_task.updated_at = chrono::Utc::now();
        }
        self.layers[layer_index].tasks[task_index] = LayerTaskEntry {
            task_id: new_id.to_string(),
            created_at: chrono::Utc::now(),
        };
        Ok(())
    }

    fn update_layer_hooks_internal(
        &mut self,
        layer_index: usize,
        pre_hook: Option<String>,
        post_hook: Option<String>,
    ) -> std::result::Result<(), String> {
        if layer_index >= self.layers.len() {
            return Err(format!("layer {layer_index} not found"));
        }
        if self.is_layer_executed(layer_index) {
            return Err(format!("layer {layer_index} is already executed"));
        }
        if let Some(pre_hook) = pre_hook {
            self.layers[layer_index].pre_hook = Some(pre_hook);
        }
        if let Some(post_hook) = post_hook {
            self.layers[layer_index].post_hook = Some(post_hook);
        }
        Ok(())
    }
}

/// Layered, pointer-driven execution plan with atomic batch mutations.
///
/// Grounded on `dynamic-task-stack/src/task_stack/storage.py`. A single
/// mutex guards all state; no `.await` is held across the critical section
/// since every operation here is synchronous map/vec manipulation.
pub struct TaskStackStore {
    inner: Mutex<TaskStackInner>,
}

impl Default for TaskStackStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStackStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TaskStackInner {
                tasks: HashMap::new(),
                layers: Vec::new(),
                pointer: None,
                task_counter: 0,
                layer_counter: 0,
            }),
        }
    }

    pub async fn create_task(&self, description: Map) -> Task {
        let mut inner = self.inner.lock().await;
        inner.create_task_internal(description)
    }

    pub async fn get_task(&self, id: &str) -> Option<Task> {
        self.inner.lock().await.tasks.get(id).cloned()
    }

    pub async fn get_all_tasks(&self) -> Vec<Task> {
        self.inner.lock().await.tasks.values().cloned().collect()
    }

    pub async fn update_task(
        &self,
        id: &str,
        description: Option<Map>,
        status: Option<TaskStatus>,
        progress: Option<Map>,
        results: Option<Map>,
    ) -> Result<Task> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| SpiralError::NotFound(format!("task {id} not found")))?;
        if let Some(description) = description {
            task.description = description;
        }
        if let Some(status) = status {
            task.status = status;
        }
        if let Some(progress) = progress {
            task.progress = progress;
        }
        if let Some(results) = results {
            task.results = Some(results);
        }
        task.updated_at = chrono::Utc::now();
        Ok(task.clone())
    }

    pub async fn delete_task(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let existed = inner.tasks.remove(id).is_some();
        if existed {
            for layer in inner.layers.iter_mut() {
                layer.tasks.retain(|t| t.task_id != id);
            }
        }
        existed
    }

    pub async fn create_layer(
        &self,
        index: Option<usize>,
        pre_hook: Option<String>,
        post_hook: Option<String>,
    ) -> TaskLayer {
        let mut inner = self.inner.lock().await;
        inner.create_layer_internal(index, pre_hook, post_hook)
    }

    pub async fn get_layer(&self, index: usize) -> Option<TaskLayer> {
        self.inner.lock().await.layers.get(index).cloned()
    }

    pub async fn get_all_layers(&self) -> Vec<TaskLayer> {
        self.inner.lock().await.layers.clone()
    }

    pub async fn add_task_to_layer(
        &self,
        layer_index: usize,
        task_id: &str,
        insert_index: Option<usize>,
    ) -> bool {
        let mut inner = self.inner.lock().await;
        inner
            .add_task_to_layer_internal(layer_index, task_id, insert_index)
            .is_ok()
    }

    pub async fn remove_task_from_layer(&self, layer_index: usize, task_id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        inner
            .remove_task_from_layer_internal(layer_index, task_id)
            .is_ok()
    }

    pub async fn replace_task_in_layer(
        &self,
        layer_index: usize,
        old_id: &str,
        new_id: &str,
    ) -> bool {
        let mut inner = self.inner.lock().await;
        inner
            .replace_task_in_layer_internal(layer_index, old_id, new_id)
            .is_ok()
    }

    pub async fn update_layer_hooks(
        &self,
        layer_index: usize,
        pre_hook: Option<String>,
        post_hook: Option<String>,
    ) -> bool {
        let mut inner = self.inner.lock().await;
        inner
            .update_layer_hooks_internal(layer_index, pre_hook, post_hook)
            .is_ok()
    }

    pub async fn insert_layer_with_tasks(
        &self,
        insert_index: usize,
        task_ids: Vec<String>,
        pre_hook: Option<String>,
        post_hook: Option<String>,
    ) -> Option<TaskLayer> {
        let mut inner = self.inner.lock().await;

        if let Some(pointer) = inner.pointer {
            if insert_index < pointer.layer_index {
                return None;
            }
        }
        for task_id in &task_ids {
            if !inner.tasks.contains_key(task_id) {
                return None;
            }
        }

        let layer = inner.create_layer_internal(Some(insert_index), pre_hook, post_hook);
        let layer_index = layer.layer_index;
        for task_id in task_ids {
            inner.layers[layer_index].tasks.push(LayerTaskEntry {
                task_id,
                created_at: chrono::Utc::now(),
            });
        }
        Some(inner.layers[layer_index].clone())
    }

    pub async fn get_execution_pointer(&self) -> Option<ExecutionPointer> {
        self.inner.lock().await.pointer
    }

    pub async fn set_execution_pointer(
        &self,
        layer_index: usize,
        task_index: usize,
        in_pre_hook: bool,
        in_post_hook: bool,
    ) -> bool {
        let mut inner = self.inner.lock().await;
        if layer_index >= inner.layers.len() {
            return false;
        }
        if task_index > inner.layers[layer_index].tasks.len() {
            return false;
        }
        inner.pointer = Some(ExecutionPointer {
            layer_index,
            task_index,
            in_pre_hook,
            in_post_hook,
        });
        true
    }

    pub async fn advance_execution_pointer(&self) -> bool {
        let mut inner = self.inner.lock().await;
        let mut pointer = inner.pointer.unwrap_or_default();
        pointer.in_pre_hook = false;
        pointer.in_post_hook = false;

        loop {
            if pointer.layer_index >= inner.layers.len() {
                inner.pointer = Some(pointer);
                return false;
            }
            let layer_len = inner.layers[pointer.layer_index].tasks.len();
            if pointer.task_index + 1 < layer_len {
                pointer.task_index += 1;
                inner.pointer = Some(pointer);
                return true;
            }
            pointer.layer_index += 1;
            pointer.task_index = 0;
            if pointer.layer_index >= inner.layers.len() {
                inner.pointer = Some(pointer);
                return false;
            }
            if !inner.layers[pointer.layer_index].tasks.is_empty() {
                inner.pointer = Some(pointer);
                return true;
            }
        }
    }

    pub async fn get_next_task(&self) -> Option<NextTask> {
        let inner = self.inner.lock().await;
        let pointer = inner.pointer.unwrap_or_default();
        if pointer.layer_index >= inner.layers.len() {
            return None;
        }
        let layer = inner.layers[pointer.layer_index].clone();
        if pointer.task_index >= layer.tasks.len() {
            return None;
        }
        let task_id = layer.tasks[pointer.task_index].task_id.clone();
        Some(NextTask {
            layer_index: pointer.layer_index,
            task_index: pointer.task_index,
            task_id,
            layer,
            is_pre_hook: pointer.in_pre_hook,
        })
    }

    /// Executes a sequence of top-level operations under a single critical
    /// section. Each operation is its own atomic reporting unit: the first
    /// failing item inside an operation's list stops that operation (its
    /// remaining items are skipped) and contributes exactly one entry to
    /// `errors`; items already applied before the failure are not rolled
    /// back. Operations after a failed one still run. See DESIGN.md.
    pub async fn modify_task_stack(&self, operations: Vec<BatchOperation>) -> BatchResult {
        let mut inner = self.inner.lock().await;
        let mut result = BatchResult::default();

        for op in operations {
            match op {
                BatchOperation::CreateTasks { tasks } => {
                    let mut created_ids = Vec::new();
                    for CreateTaskSpec { description } in tasks {
                        let task = inner.create_task_internal(description);
                        created_ids.push(task.id.clone());
                        result.created_task_ids.push(task.id);
                    }
                    result
                        .results
                        .push(serde_json::json!({"created_task_ids": created_ids}));
                }
                BatchOperation::CreateLayers { layers } => {
                    let mut created_indices = Vec::new();
                    for CreateLayerSpec {
                        layer_index,
                        pre_hook,
                        post_hook,
                    } in layers
                    {
                        let layer = inner.create_layer_internal(layer_index, pre_hook, post_hook);
                        created_indices.push(layer.layer_index);
                        result.created_layer_indices.push(layer.layer_index);
                    }
                    result
                        .results
                        .push(serde_json::json!({"created_layer_indices": created_indices}));
                }
                BatchOperation::AddTasksToLayers { additions } => {
                    let mut applied = Vec::new();
                    let mut failed = None;
                    for AddTaskSpec {
                        layer_index,
                        task_id,
                        insert_index,
                    } in additions
                    {
                        match inner.add_task_to_layer_internal(layer_index, &task_id, insert_index)
                        {
                            Ok(()) => applied
                                .push(serde_json::json!({"layer_index": layer_index, "task_id": task_id})),
                            Err(e) => {
                                failed = Some(e);
                                break;
                            }
                        }
                    }
                    match failed {
                        Some(e) => result.errors.push(e),
                        None => result.results.push(serde_json::json!({"applied": applied})),
                    }
                }
                BatchOperation::RemoveTasksFromLayers { removals } => {
                    let mut applied = Vec::new();
                    let mut failed = None;
                    for RemoveTaskSpec {
                        layer_index,
                        task_id,
                    } in removals
                    {
                        match inner.remove_task_from_layer_internal(layer_index, &task_id) {
                            Ok(()) => applied
                                .push(serde_json::json!({"layer_index": layer_index, "task_id": task_id})),
                            Err(e) => {
                                failed = Some(e);
                                break;
                            }
                        }
                    }
                    match failed {
                        Some(e) => result.errors.push(e),
                        None => result.results.push(serde_json::json!({"applied": applied})),
                    }
                }
                BatchOperation::ReplaceTasksInLayers { replacements } => {
                    let mut applied = Vec::new();
                    let mut failed = None;
                    for ReplaceTaskSpec {
                        layer_index,
                        old_id,
                        new_id,
                    } in replacements
                    {
                        match inner.replace_task_in_layer_internal(layer_index, &old_id, &new_id) {
                            Ok(()) => applied.push(
                                serde_json::json!({"layer_index": layer_index, "old_id": old_id, "new_id": new_id}),
                            ),
                            Err(e) => {
                                failed = Some(e);
                                break;
                            }
                        }
                    }
                    match failed {
                        Some(e) => result.errors.push(e),
                        None => result.results.push(serde_json::json!({"applied": applied})),
                    }
                }
                BatchOperation::UpdateLayerHooks { updates } => {
                    let mut applied = Vec::new();
                    let mut failed = None;
                    for UpdateHooksSpec {
                        layer_index,
                        pre_hook,
                        post_hook,
                    } in updates
                    {
                        match inner.update_layer_hooks_internal(layer_index, pre_hook, post_hook) {
                            Ok(()) => applied.push(serde_json::json!({"layer_index": layer_index})),
                            Err(e) => {
                                failed = Some(e);
                                break;
                            }
                        }
                    }
                    match failed {
                        Some(e) => result.errors.push(e),
                        None => result.results.push(serde_json::json!({"applied": applied})),
                    }
                }
            }
        }

        result.success = result.errors.is_empty();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BatchOperation;

    #[tokio::test]
    async fn pointer_safety_scenario() {
        let store = TaskStackStore::new();
        let t1 = store.create_task(Map::new()).await;
        let t2 = store.create_task(Map::new()).await;
        let t3 = store.create_task(Map::new()).await;
        store.create_layer(None, None, None).await;
        store.add_task_to_layer(0, &t1.id, None).await;
        store.add_task_to_layer(0, &t2.id, None).await;
        store.add_task_to_layer(0, &t3.id, None).await;
        store.set_execution_pointer(0, 1, false, false).await;

        assert!(!store.remove_task_from_layer(0, &t1.id).await);
        assert!(store.remove_task_from_layer(0, &t3.id).await);

        let new_task = store.create_task(Map::new()).await;
        assert!(
            store
                .replace_task_in_layer(0, &t2.id, &new_task.id)
                .await
        );
        let cancelled = store.get_task(&t2.id).await.unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn batch_partial_failure_does_not_roll_back() {
        let store = TaskStackStore::new();
        let ops = vec![
            BatchOperation::CreateTasks {
                tasks: vec![CreateTaskSpec {
                    description: Map::new(),
                }],
            },
            BatchOperation::RemoveTasksFromLayers {
                removals: vec![RemoveTaskSpec {
                    layer_index: 0,
                    task_id: "nope".to_string(),
                }],
            },
        ];
        let result = store.modify_task_stack(ops).await;
        assert!(!result.success);
        assert_eq!(result.created_task_ids.len(), 1);
        assert_eq!(result.errors.len(), 1);
    }

    /// A single top-level operation carrying several items is one atomic
    /// reporting unit: the first failing item stops the rest of that
    /// operation's list (its siblings already applied are not undone), and
    /// exactly one `errors` entry is recorded for the whole operation, not
    /// one per item.
    #[tokio::test]
    async fn multi_item_operation_stops_on_first_failure_and_reports_once() {
        let store = TaskStackStore::new();
        let t1 = store.create_task(Map::new()).await;
        let t2 = store.create_task(Map::new()).await;
        let t3 = store.create_task(Map::new()).await;
        store.create_layer(None, None, None).await;

        let ops = vec![BatchOperation::AddTasksToLayers {
            additions: vec![
                AddTaskSpec {
                    layer_index: 0,
                    task_id: t1.id.clone(),
                    insert_index: None,
                },
                AddTaskSpec {
                    layer_index: 99,
                    task_id: t2.id.clone(),
                    insert_index: None,
                },
                AddTaskSpec {
                    layer_index: 0,
                    task_id: t3.id.clone(),
                    insert_index: None,
                },
            ],
        }];

        let result = store.modify_task_stack(ops).await;
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1, "one operation, one error entry");
        assert!(result.results.is_empty());

        let layer = store.get_layer(0).await.unwrap();
        assert_eq!(layer.tasks.len(), 1, "t1 stays applied, t3 is never attempted");
        assert_eq!(layer.tasks[0].task_id, t1.id);
    }

    #[tokio::test]
    async fn insert_layer_with_tasks_is_atomic() {
        let store = TaskStackStore::new();
        store.create_layer(None, None, None).await;
        store.create_layer(None, None, None).await;
        let t1 = store.create_task(Map::new()).await;
        let t2 = store.create_task(Map::new()).await;

        let new_layer = store
            .insert_layer_with_tasks(1, vec![t1.id.clone(), t2.id.clone()], None, None)
            .await
            .unwrap();

        assert_eq!(new_layer.layer_index, 1);
        assert_eq!(new_layer.tasks.len(), 2);
        assert_eq!(new_layer.tasks[0].task_id, t1.id);
        let layers = store.get_all_layers().await;
        assert_eq!(layers.len(), 3);
        assert_eq!(layers[2].layer_index, 2);
    }

    #[tokio::test]
    async fn advance_execution_pointer_is_idempotent_at_tail() {
        let store = TaskStackStore::new();
        let t1 = store.create_task(Map::new()).await;
        store.create_layer(None, None, None).await;
        store.add_task_to_layer(0, &t1.id, None).await;

        assert!(!store.advance_execution_pointer().await);
        let p1 = store.get_execution_pointer().await;
        assert!(!store.advance_execution_pointer().await);
        let p2 = store.get_execution_pointer().await;
        assert_eq!(p1, p2);
    }

    #[tokio::test]
    async fn layer_indices_stay_contiguous_after_insert() {
        let store = TaskStackStore::new();
        store.create_layer(None, None, None).await;
        store.create_layer(Some(0), None, None).await;
        let layers = store.get_all_layers().await;
        for (i, layer) in layers.iter().enumerate() {
            assert_eq!(layer.layer_index, i);
        }
    }

    #[tokio::test]
    async fn delete_task_scrubs_all_layer_references() {
        let store = TaskStackStore::new();
        let t1 = store.create_task(Map::new()).await;
        store.create_layer(None, None, None).await;
        store.create_layer(None, None, None).await;
        store.add_task_to_layer(0, &t1.id, None).await;
        store.add_task_to_layer(1, &t1.id, None).await;

        assert!(store.delete_task(&t1.id).await);
        for layer in store.get_all_layers().await {
            assert!(layer.tasks.iter().all(|t| t.task_id != t1.id));
        }
    }
}
