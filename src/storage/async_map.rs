//! Reader-writer guarded map whose operations run as tokio tasks.
//!
//! Every call returns a [`JoinHandle`] immediately. Plain reads share the lock,
//! mutations take it exclusively, and read-modify-write operations run start to
//! finish under one exclusive guard.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// # Examples
///
/// ```
/// use regiontag::AsyncKeyedMap;
///
/// # tokio_test::block_on(async {
/// let map: AsyncKeyedMap<i32, &str> = AsyncKeyedMap::new();
/// map.put(1, "spawn").await.unwrap();
/// let hits = map.compute(1, |_, v| v.map(|_| "lobby")).await.unwrap();
/// assert_eq!(hits, Some("lobby"));
/// # });
/// ```
pub struct AsyncKeyedMap<K, V> {
    map: Arc<RwLock<HashMap<K, V>>>,
    runtime: Option<Handle>,
}

impl<K, V> Clone for AsyncKeyedMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            map: Arc::clone(&self.map),
            runtime: self.runtime.clone(),
        }
    }
}

impl<K, V> Default for AsyncKeyedMap<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> AsyncKeyedMap<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Tasks are spawned on the runtime current at each call.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: Arc::new(RwLock::new(HashMap::with_capacity(capacity))),
            runtime: None,
        }
    }

    /// Tasks are spawned on `runtime`, so calls may come from outside any runtime.
    pub fn with_runtime(runtime: Handle) -> Self {
        Self {
            map: Arc::new(RwLock::new(HashMap::new())),
            runtime: Some(runtime),
        }
    }

    fn spawn<T, F, Fut>(&self, job: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<RwLock<HashMap<K, V>>>) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let task = job(Arc::clone(&self.map));
        match &self.runtime {
            Some(handle) => handle.spawn(task),
            None => tokio::spawn(task),
        }
    }

    pub fn put(&self, key: K, value: V) -> JoinHandle<Option<V>> {
        self.spawn(|map| async move { map.write().await.insert(key, value) })
    }

    /// Replace the value only if the key is present.
    pub fn replace(&self, key: K, value: V) -> JoinHandle<Option<V>> {
        self.spawn(|map| async move {
            let mut map = map.write().await;
            match map.get_mut(&key) {
                Some(current) => Some(std::mem::replace(current, value)),
                None => None,
            }
        })
    }

    pub fn remove(&self, key: K) -> JoinHandle<Option<V>> {
        self.spawn(|map| async move { map.write().await.remove(&key) })
    }

    pub fn contains_key(&self, key: K) -> JoinHandle<bool> {
        self.spawn(|map| async move { map.read().await.contains_key(&key) })
    }

    pub fn size(&self) -> JoinHandle<usize> {
        self.spawn(|map| async move { map.read().await.len() })
    }

    pub fn clear(&self) -> JoinHandle<()> {
        self.spawn(|map| async move { map.write().await.clear() })
    }

    /// Remap the entry. Returning `None` removes it.
    ///
    /// `f` sees a copy; the stored value changes only once `f` returns, so a
    /// panicking `f` leaves the entry as it was.
    pub fn compute<F>(&self, key: K, f: F) -> JoinHandle<Option<V>>
    where
        V: Clone,
        F: FnOnce(&K, Option<V>) -> Option<V> + Send + 'static,
    {
        self.spawn(|map| async move {
            let mut map = map.write().await;
            let current = map.get(&key).cloned();
            let next = f(&key, current);
            store(&mut map, key, &next);
            next
        })
    }

    /// The present value, or the one `f` produces and inserts.
    pub fn compute_if_absent<F>(&self, key: K, f: F) -> JoinHandle<V>
    where
        V: Clone,
        F: FnOnce(&K) -> V + Send + 'static,
    {
        self.spawn(|map| async move {
            let mut map = map.write().await;
            if let Some(value) = map.get(&key) {
                return value.clone();
            }
            let value = f(&key);
            map.insert(key, value.clone());
            value
        })
    }

    /// Remap an existing entry; absent keys are left alone. Returning `None` removes it.
    pub fn compute_if_present<F>(&self, key: K, f: F) -> JoinHandle<Option<V>>
    where
        V: Clone,
        F: FnOnce(&K, V) -> Option<V> + Send + 'static,
    {
        self.spawn(|map| async move {
            let mut map = map.write().await;
            let current = map.get(&key).cloned()?;
            let next = f(&key, current);
            store(&mut map, key, &next);
            next
        })
    }

    /// Insert one value per key, all under a single exclusive guard.
    pub fn fill_with<I, F>(&self, keys: I, mut f: F) -> JoinHandle<()>
    where
        I: IntoIterator<Item = K> + Send + 'static,
        I::IntoIter: Send,
        F: FnMut(&K) -> V + Send + 'static,
    {
        self.spawn(|map| async move {
            let mut map = map.write().await;
            for key in keys {
                let value = f(&key);
                map.insert(key, value);
            }
        })
    }
}

fn store<K: Eq + Hash, V: Clone>(map: &mut HashMap<K, V>, key: K, next: &Option<V>) {
    match next {
        Some(value) => {
            map.insert(key, value.clone());
        }
        None => {
            map.remove(&key);
        }
    }
}

impl<K, V> AsyncKeyedMap<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn get(&self, key: K) -> JoinHandle<Option<V>> {
        self.spawn(|map| async move { map.read().await.get(&key).cloned() })
    }

    pub fn fill<I>(&self, keys: I, value: V) -> JoinHandle<()>
    where
        I: IntoIterator<Item = K> + Send + 'static,
        I::IntoIter: Send,
    {
        self.fill_with(keys, move |_| value.clone())
    }

    /// Copy of every entry.
    pub fn entries(&self) -> JoinHandle<Vec<(K, V)>>
    where
        K: Clone,
    {
        self.spawn(|map| async move {
            map.read()
                .await
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
    }
}

impl<K, V> AsyncKeyedMap<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: PartialEq + Send + Sync + 'static,
{
    pub fn contains_value(&self, value: V) -> JoinHandle<bool> {
        self.spawn(|map| async move { map.read().await.values().any(|v| *v == value) })
    }

    /// Remove the entry only while it still maps to `value`.
    pub fn remove_if_equal(&self, key: K, value: V) -> JoinHandle<bool> {
        self.spawn(|map| async move {
            let mut map = map.write().await;
            if map.get(&key) == Some(&value) {
                map.remove(&key);
                true
            } else {
                false
            }
        })
    }
}

impl<V> AsyncKeyedMap<i32, V>
where
    V: Send + Sync + 'static,
{
    /// Fill keys `position..position + length` from `f`.
    pub fn fill_range<F>(&self, position: i32, length: i32, f: F) -> JoinHandle<()>
    where
        F: FnMut(&i32) -> V + Send + 'static,
    {
        let end = position.saturating_add(length.max(0));
        self.fill_with(position..end, f)
    }
}
