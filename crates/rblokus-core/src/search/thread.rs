//! 探索ワーカースレッド
//!
//! 探索ごとにスレッドを作らず、生成済みのスレッドを Condvar の
//! ハンドシェイクで起こして使い回す（短時間探索のスレッド生成コスト
//! 回避）。タスクはクロージャとして渡し、完了すると idle に戻る。
//! Drop で exit を立てて join する。

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

type Task = Box<dyn FnOnce() + Send>;

struct WorkerState {
    searching: bool,
    exit: bool,
    task: Option<Task>,
}

struct WorkerInner {
    state: Mutex<WorkerState>,
    condvar: Condvar,
}

/// 待機と起床を繰り返す長寿命ワーカー
pub(crate) struct Worker {
    inner: Arc<WorkerInner>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn new(thread_id: usize) -> Worker {
        let inner = Arc::new(WorkerInner {
            state: Mutex::new(WorkerState {
                searching: true,
                exit: false,
                task: None,
            }),
            condvar: Condvar::new(),
        });
        let inner_clone = Arc::clone(&inner);
        let handle = std::thread::Builder::new()
            .name(format!("search-{thread_id}"))
            .spawn(move || idle_loop(inner_clone))
            .expect("failed to spawn search worker thread");
        let worker = Worker {
            inner,
            handle: Some(handle),
        };
        worker.wait_search_finished();
        worker
    }

    /// タスクを割り当てて起こす
    pub fn start_search(&self, task: Task) {
        let mut state = self.inner.state.lock().unwrap();
        while state.searching {
            state = self.inner.condvar.wait(state).unwrap();
        }
        state.task = Some(task);
        state.searching = true;
        self.inner.condvar.notify_one();
    }

    /// タスクの完了を待つ
    pub fn wait_search_finished(&self) {
        let mut state = self.inner.state.lock().unwrap();
        while state.searching {
            state = self.inner.condvar.wait(state).unwrap();
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.exit = true;
            state.searching = true;
            self.inner.condvar.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn idle_loop(inner: Arc<WorkerInner>) {
    loop {
        let task = {
            let mut state = inner.state.lock().unwrap();
            state.searching = false;
            inner.condvar.notify_all();
            while !state.searching && !state.exit {
                state = inner.condvar.wait(state).unwrap();
            }
            if state.exit {
                return;
            }
            state.task.take()
        };
        if let Some(task) = task {
            task();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_worker_runs_tasks_sequentially() {
        let worker = Worker::new(1);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let c = Arc::clone(&counter);
            worker.start_search(Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }));
            worker.wait_search_finished();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_worker_drop_joins() {
        let worker = Worker::new(2);
        let flag = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&flag);
        worker.start_search(Box::new(move || {
            f.store(7, Ordering::SeqCst);
        }));
        drop(worker);
        assert_eq!(flag.load(Ordering::SeqCst), 7);
    }
}
