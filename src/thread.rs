//! Thread pool submission
//!
//! [`ThreadPool`] spawns named workers on demand, up to a maximum, and feeds
//! them through a `flume` channel. A panicking job only fails its own
//! [`TaskHandle`]. The `submit_thread*` functions use a process-wide pool.

use log::debug;
use once_cell::sync::Lazy;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::common::{Result, UtilError};

/// Workers of the global pool
pub const GLOBAL_POOL_WORKERS: usize = 64;

/// Thread name prefix of the global pool
pub const GLOBAL_POOL_PREFIX: &str = "utilkit-pool";

type Job = Box<dyn FnOnce() + Send + 'static>;

type Outcome<T> = std::result::Result<T, String>;

/// Pending result of a submitted job
#[derive(Debug)]
pub struct TaskHandle<T> {
    receiver: flume::Receiver<Outcome<T>>,
}

impl<T> TaskHandle<T> {
    /// Block until the job finishes
    pub fn join(self) -> Result<T> {
        match self.receiver.recv() {
            Ok(outcome) => outcome.map_err(UtilError::TaskPanicked),
            Err(_) => Err(UtilError::TaskPanicked("task was dropped".to_string())),
        }
    }

    /// Block for at most `timeout`
    pub fn join_timeout(&self, timeout: Duration) -> Result<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => outcome.map_err(UtilError::TaskPanicked),
            Err(flume::RecvTimeoutError::Timeout) => Err(UtilError::Timeout(format!(
                "task did not finish within {:?}",
                timeout
            ))),
            Err(flume::RecvTimeoutError::Disconnected) => {
                Err(UtilError::TaskPanicked("task was dropped".to_string()))
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        !self.receiver.is_empty()
    }
}

/// Pool of lazily spawned worker threads
pub struct ThreadPool {
    name_prefix: String,
    max_workers: usize,
    sender: Mutex<Option<flume::Sender<Job>>>,
    receiver: flume::Receiver<Job>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    idle: Arc<AtomicUsize>,
}

impl ThreadPool {
    pub fn new(max_workers: usize, name_prefix: &str) -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            name_prefix: name_prefix.to_string(),
            max_workers: max_workers.max(1),
            sender: Mutex::new(Some(sender)),
            receiver,
            workers: Mutex::new(Vec::new()),
            idle: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Workers spawned so far
    pub fn worker_count(&self) -> usize {
        lock(&self.workers).len()
    }

    /// Queue `f`, spawning a worker when none is idle
    pub fn submit<F, T>(&self, f: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = flume::bounded(1);
        let job: Job = Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(f)).map_err(panic_message);
            let _ = tx.send(outcome);
        });

        {
            let sender = lock(&self.sender);
            let sender = sender
                .as_ref()
                .ok_or_else(|| UtilError::Other("thread pool is shut down".to_string()))?;
            sender
                .send(job)
                .map_err(|_| UtilError::Other("thread pool is shut down".to_string()))?;
        }

        self.adjust_workers()?;
        Ok(TaskHandle { receiver: rx })
    }

    /// Claim an idle worker for the job just queued, or spawn one
    fn adjust_workers(&self) -> Result<()> {
        let claimed = self
            .idle
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if claimed {
            return Ok(());
        }

        let mut workers = lock(&self.workers);
        if workers.len() >= self.max_workers {
            return Ok(());
        }

        let name = format!("{}_{}", self.name_prefix, workers.len());
        let receiver = self.receiver.clone();
        let idle = Arc::clone(&self.idle);
        debug!("Spawning worker {}", name);
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || worker_loop(receiver, idle))?;
        workers.push(handle);
        Ok(())
    }

    /// Stop accepting jobs, finish the queued ones and join every worker
    pub fn shutdown(&self) {
        lock(&self.sender).take();

        let workers: Vec<JoinHandle<()>> = lock(&self.workers).drain(..).collect();
        let current = thread::current().id();
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            let _ = worker.join();
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Workers exit on their own once the queue drains
        lock(&self.sender).take();
    }
}

/// Each finished job releases one idle token; submitters claim them
fn worker_loop(receiver: flume::Receiver<Job>, idle: Arc<AtomicUsize>) {
    while let Ok(job) = receiver.recv() {
        job();
        idle.fetch_add(1, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

static GLOBAL_POOL: Lazy<Mutex<Arc<ThreadPool>>> = Lazy::new(|| Mutex::new(new_global_pool()));

fn new_global_pool() -> Arc<ThreadPool> {
    Arc::new(ThreadPool::new(GLOBAL_POOL_WORKERS, GLOBAL_POOL_PREFIX))
}

/// The process-wide pool
pub fn global_pool() -> Arc<ThreadPool> {
    Arc::clone(&lock(&GLOBAL_POOL))
}

/// Run `f` on the global pool
pub fn submit_thread<F, T>(f: F) -> Result<TaskHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    global_pool().submit(f)
}

pub fn submit_thread_and_wait<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    submit_thread(f)?.join()
}

pub fn submit_thread_and_wait_with_timeout<F, T>(f: F, timeout: Duration) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    submit_thread(f)?.join_timeout(timeout)
}

/// Run `f` on the global pool and hand its outcome to `callback` on the same worker
pub fn submit_thread_with_callback<C, F, T, R>(callback: C, f: F) -> Result<TaskHandle<R>>
where
    C: FnOnce(Result<T>) -> R + Send + 'static,
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
    R: Send + 'static,
{
    submit_thread(move || {
        let outcome = catch_unwind(AssertUnwindSafe(f))
            .map_err(|payload| UtilError::TaskPanicked(panic_message(payload)));
        callback(outcome)
    })
}

/// Wait for every job on the global pool, then start a fresh pool
pub fn wait_forever() {
    let previous = std::mem::replace(&mut *lock(&GLOBAL_POOL), new_global_pool());
    previous.shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_submit_and_join() {
        let pool = ThreadPool::new(2, "test-pool");
        let handles: Vec<_> = (0..8).map(|i| pool.submit(move || i * 2).unwrap()).collect();
        let results: Vec<i32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results, vec![0, 2, 4, 6, 8, 10, 12, 14]);
        assert!(pool.worker_count() <= 2);
    }

    #[test]
    fn test_worker_names() {
        let pool = ThreadPool::new(1, "named");
        let name = pool
            .submit(|| thread::current().name().map(str::to_string))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(name.as_deref(), Some("named_0"));
    }

    #[test]
    fn test_dependent_jobs_get_separate_workers() {
        let pool = ThreadPool::new(8, "dependent");
        pool.submit(|| ()).unwrap().join().unwrap();

        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let waiter = pool
            .submit(move || rx.recv_timeout(Duration::from_secs(2)).is_ok())
            .unwrap();
        let sender = pool.submit(move || tx.send(()).is_ok()).unwrap();

        assert!(sender.join().unwrap());
        assert!(waiter.join().unwrap(), "waiting job never got the signal");
        assert_eq!(pool.worker_count(), 2);
    }

    #[test]
    fn test_panic_is_isolated() {
        let pool = ThreadPool::new(1, "panicky");
        let err = pool.submit(|| -> i32 { panic!("boom") }).unwrap().join();
        assert!(matches!(err, Err(UtilError::TaskPanicked(msg)) if msg == "boom"));
        assert_eq!(pool.submit(|| 1).unwrap().join().unwrap(), 1);
    }

    #[test]
    fn test_join_timeout() {
        let pool = ThreadPool::new(1, "slow");
        let handle = pool
            .submit(|| thread::sleep(Duration::from_millis(300)))
            .unwrap();
        assert!(matches!(
            handle.join_timeout(Duration::from_millis(10)),
            Err(UtilError::Timeout(_))
        ));
        assert!(handle.join_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let pool = ThreadPool::new(1, "drain");
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        pool.submit(move || {
            thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

        pool.shutdown();
        assert!(done.load(Ordering::SeqCst));
        assert!(pool.submit(|| ()).is_err());
    }

    #[test]
    #[serial]
    fn test_global_pool() {
        assert_eq!(submit_thread_and_wait(|| 40 + 2).unwrap(), 42);
        assert!(submit_thread_and_wait_with_timeout(
            || thread::sleep(Duration::from_millis(200)),
            Duration::from_millis(10)
        )
        .is_err());

        let handle = submit_thread_with_callback(|r: Result<i32>| r.unwrap() + 1, || 1).unwrap();
        assert_eq!(handle.join().unwrap(), 2);

        let failed = submit_thread_with_callback(|r: Result<()>| r.is_err(), || panic!("nope")).unwrap();
        assert!(failed.join().unwrap());

        wait_forever();
        assert_eq!(global_pool().worker_count(), 0);
    }
}
