//! Caching, retry and synchronization helpers

use log::{error, warn};
use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Function wrapper that caches results by argument
///
/// ```
/// # use utilkit::func::Memoized;
/// let square = Memoized::new(|x: &u64| x * x);
/// assert_eq!(square.call(4), 16);
/// assert_eq!(square.len(), 1);
/// ```
pub struct Memoized<A, R> {
    func: Box<dyn Fn(&A) -> R + Send + Sync>,
    cache: Mutex<HashMap<A, R>>,
}

impl<A, R> Memoized<A, R>
where
    A: Eq + Hash + Clone,
    R: Clone,
{
    pub fn new(func: impl Fn(&A) -> R + Send + Sync + 'static) -> Self {
        Self {
            func: Box::new(func),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Cached result for `arg`, computing it on first use
    ///
    /// The lock is not held while computing, so concurrent first calls may
    /// both run the function.
    pub fn call(&self, arg: A) -> R {
        if let Some(hit) = lock(&self.cache).get(&arg) {
            return hit.clone();
        }
        let value = (self.func)(&arg);
        lock(&self.cache).entry(arg).or_insert(value).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.cache).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.cache).clear();
    }
}

/// Run `f` up to `attempts` times, sleeping `delay` between failures
///
/// Returns the first success or the last error.
pub fn retry<T, E, F>(attempts: usize, delay: Duration, mut f: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Result<T, E>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                warn!("Attempt {}/{} failed: {}", attempt, attempts, e);
                attempt += 1;
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
            }
            Err(e) => {
                warn!("Attempt {}/{} failed: {}", attempt, attempts, e);
                return Err(e);
            }
        }
    }
}

/// Async [`retry`]
pub async fn retry_async<T, E, F, Fut>(attempts: usize, delay: Duration, mut f: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                warn!("Attempt {}/{} failed: {}", attempt, attempts, e);
                attempt += 1;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => {
                warn!("Attempt {}/{} failed: {}", attempt, attempts, e);
                return Err(e);
            }
        }
    }
}

/// Value accessed under mutual exclusion
///
/// A panic inside [`Synchronized::with`] does not poison later calls.
#[derive(Debug, Default)]
pub struct Synchronized<T> {
    inner: Mutex<T>,
}

impl<T> Synchronized<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut lock(&self.inner))
    }

    pub fn into_inner(self) -> T {
        self.inner
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Run `f`, logging its error instead of propagating it
pub fn sneaky<T, E, F>(f: F) -> Option<T>
where
    E: Debug,
    F: FnOnce() -> Result<T, E>,
{
    match f() {
        Ok(value) => Some(value),
        Err(e) => {
            error!("{:?}", e);
            None
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
