//! In-memory task registry.

use crate::CronTask;

/// Registered tasks, kept in registration order.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Vec<CronTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task, or replace the one with the same id in place.
    pub fn register(&mut self, task: CronTask) {
        match self.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(slot) => *slot = task,
            None => self.tasks.push(task),
        }
    }

    /// Remove a task. Returns whether it was present.
    pub fn unregister(&mut self, id: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        self.tasks.len() != before
    }

    /// Iterate the registered tasks in registration order.
    ///
    /// Calling `list` again yields a fresh iterator over the current contents.
    pub fn list(&self) -> std::slice::Iter<'_, CronTask> {
        self.tasks.iter()
    }

    pub fn get(&self, id: &str) -> Option<&CronTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut CronTask> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, name: &str, interval: u32) -> CronTask {
        CronTask::new(id, name, interval, || async { Ok(()) })
    }

    #[test]
    fn test_register_and_list_in_order() {
        let mut registry = TaskRegistry::new();
        registry.register(task("a", "A", 1));
        registry.register(task("b", "B", 5));
        registry.register(task("c", "C", 15));

        let ids: Vec<&str> = registry.list().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        // The sequence is restartable.
        assert_eq!(registry.list().count(), 3);
    }

    #[test]
    fn test_last_registration_wins() {
        let mut registry = TaskRegistry::new();
        registry.register(task("a", "A", 1));
        registry.register(task("b", "B", 5));
        registry.register(task("a", "A2", 30));

        assert_eq!(registry.len(), 2);
        let a = registry.get("a").unwrap();
        assert_eq!(a.name, "A2");
        assert_eq!(a.interval_minutes(), 30);
        assert_eq!(registry.list().next().unwrap().id, "a");
    }

    #[test]
    fn test_unregister_is_noop_when_missing() {
        let mut registry = TaskRegistry::new();
        registry.register(task("a", "A", 1));
        assert!(!registry.unregister("zzz"));
        assert!(registry.unregister("a"));
        assert!(registry.is_empty());
    }
}
