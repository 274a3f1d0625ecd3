//! Per-frame task intake for the orchestration context.
//!
//! The GPU-submission side never touches pipeline state directly; it posts a
//! closure here and the application drains the queue once per frame from the
//! thread that owns per-frame logic.

use std::sync::mpsc::{channel, Receiver, Sender};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Cloneable producer half, safe to hand to other threads.
#[derive(Clone)]
pub struct TaskSender {
    tx: Sender<Task>,
}

impl TaskSender {
    pub fn post(&self, task: impl FnOnce() + Send + 'static) {
        if self.tx.send(Box::new(task)).is_err() {
            log::debug!("task queue closed; dropping task");
        }
    }
}

/// Consumer half, owned by the orchestration context.
pub struct TaskQueue {
    tx: Sender<Task>,
    rx: Receiver<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Self { tx, rx }
    }

    pub fn sender(&self) -> TaskSender {
        TaskSender {
            tx: self.tx.clone(),
        }
    }

    /// Run every task posted so far, in posting order. Returns the number of
    /// tasks executed. Never blocks.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_tasks_run_in_posting_order() {
        let queue = TaskQueue::new();
        let sender = queue.sender();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let seen = seen.clone();
            sender.post(move || seen.lock().unwrap().push(i));
        }
        assert_eq!(queue.run_pending(), 3);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_run_pending_empty() {
        let queue = TaskQueue::new();
        assert_eq!(queue.run_pending(), 0);
    }

    #[test]
    fn test_post_after_queue_dropped_is_silent() {
        let queue = TaskQueue::new();
        let sender = queue.sender();
        drop(queue);
        sender.post(|| unreachable!());
    }
}
