//! Byte- and count-bounded LRU cache

use crate::config::CacheConfiguration;
use crate::metrics::CacheStats;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Estimated in-memory size of a cached value
///
/// The estimate is a heuristic: strings count two bytes per UTF-16 code
/// unit and structured values count their JSON text the same way. Cache
/// bounds built on it are approximate.
pub trait EstimateSize {
    fn estimate_size(&self) -> usize;
}

impl EstimateSize for str {
    fn estimate_size(&self) -> usize {
        self.encode_utf16().count() * 2
    }
}

impl EstimateSize for String {
    fn estimate_size(&self) -> usize {
        self.as_str().estimate_size()
    }
}

impl EstimateSize for [u8] {
    fn estimate_size(&self) -> usize {
        self.len()
    }
}

impl EstimateSize for Vec<u8> {
    fn estimate_size(&self) -> usize {
        self.len()
    }
}

impl<T: EstimateSize + ?Sized> EstimateSize for Arc<T> {
    fn estimate_size(&self) -> usize {
        (**self).estimate_size()
    }
}

impl<T: EstimateSize + ?Sized> EstimateSize for Box<T> {
    fn estimate_size(&self) -> usize {
        (**self).estimate_size()
    }
}

#[cfg(feature = "serde")]
impl EstimateSize for serde_json::Value {
    fn estimate_size(&self) -> usize {
        json_size(self)
    }
}

/// Two bytes per UTF-16 unit of the value's JSON text, or 0 if it does not serialize
#[cfg(feature = "serde")]
pub fn json_size<T: serde::Serialize + ?Sized>(value: &T) -> usize {
    serde_json::to_string(value)
        .map(|text| text.estimate_size())
        .unwrap_or(0)
}

/// A cached value with its bookkeeping
#[derive(Debug, Clone)]
pub struct CacheItem<V> {
    pub data: V,
    pub label: String,

    /// Value of the cache's access counter at the last read or write
    pub last_access_order: u64,

    pub byte_size: usize,
}

#[derive(Debug)]
struct Node<V> {
    key: String,
    item: CacheItem<V>,
    prev: Option<usize>,
    next: Option<usize>,
}

type Estimator<V> = Box<dyn Fn(&V) -> usize + Send + Sync>;

/// LRU cache keyed by strings and bounded by estimated bytes and entry count
///
/// Entries live in a slot arena threaded into a doubly linked list, most
/// recently used at the head. Inserts never fail: the tail is evicted until
/// both bounds hold. A single entry larger than `max_size` is kept on its
/// own.
///
/// # Examples
///
/// ```
/// use lifecore::{CacheConfiguration, LruCache};
///
/// let mut cache: LruCache<String> = LruCache::new(CacheConfiguration::new().with_max_count(2));
/// cache.cache("a", "x".to_string(), "first");
/// cache.cache("b", "y".to_string(), "second");
/// cache.cache("a", "z".to_string(), "first");
/// cache.cache("c", "w".to_string(), "third");
///
/// assert!(cache.has("a"));
/// assert!(!cache.has("b"));
/// assert_eq!(cache.keys().collect::<Vec<_>>(), vec!["c", "a"]);
/// ```
pub struct LruCache<V> {
    name: String,
    max_size: usize,
    max_count: usize,
    map: HashMap<String, usize>,
    nodes: Vec<Option<Node<V>>>,
    free_slots: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    current_size: usize,
    access_counter: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    estimator: Estimator<V>,
}

/// A cache shared between its owner and the resource tracker
pub type SharedCache<V> = Arc<Mutex<LruCache<V>>>;

impl<V: EstimateSize + 'static> LruCache<V> {
    pub fn new(config: CacheConfiguration) -> Self {
        Self::with_estimator(config, |value: &V| value.estimate_size())
    }
}

impl<V> LruCache<V> {
    /// Create a cache that sizes entries with `estimator`
    pub fn with_estimator<E>(config: CacheConfiguration, estimator: E) -> Self
    where
        E: Fn(&V) -> usize + Send + Sync + 'static,
    {
        if let Err(err) = config.validate() {
            warn!(component = "LruCache", cache = %config.name, %err, "clamping cache bounds to 1");
        }

        Self {
            name: config.name,
            max_size: config.max_size.max(1),
            max_count: config.max_count.max(1),
            map: HashMap::new(),
            nodes: Vec::new(),
            free_slots: Vec::new(),
            head: None,
            tail: None,
            current_size: 0,
            access_counter: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            estimator: Box::new(estimator),
        }
    }

    /// Look up `key`, marking it most recently used on a hit
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let Some(&idx) = self.map.get(key) else {
            self.misses += 1;
            return None;
        };
        self.hits += 1;
        self.touch(idx);
        self.node(idx).map(|node| &node.item.data)
    }

    /// Look up `key` without changing its recency
    pub fn peek(&self, key: &str) -> Option<&V> {
        self.get_item(key).map(|item| &item.data)
    }

    pub fn get_item(&self, key: &str) -> Option<&CacheItem<V>> {
        let idx = *self.map.get(key)?;
        self.node(idx).map(|node| &node.item)
    }

    /// Insert or overwrite `key`, then evict from the tail until both bounds hold.
    ///
    /// Returns `false` only when the entry alone exceeds `max_size`; it is
    /// kept anyway and everything else is evicted.
    pub fn cache(&mut self, key: impl Into<String>, value: V, label: impl Into<String>) -> bool {
        let key = key.into();
        let byte_size = (self.estimator)(&value);

        if let Some(&idx) = self.map.get(&key) {
            let mut old_size = 0;
            if let Some(node) = self.node_mut(idx) {
                old_size = node.item.byte_size;
                node.item.data = value;
                node.item.label = label.into();
                node.item.byte_size = byte_size;
            }
            self.current_size = self.current_size - old_size + byte_size;
            self.touch(idx);
        } else {
            self.access_counter += 1;
            let node = Node {
                key: key.clone(),
                item: CacheItem {
                    data: value,
                    label: label.into(),
                    last_access_order: self.access_counter,
                    byte_size,
                },
                prev: None,
                next: None,
            };
            let idx = self.allocate(node);
            self.push_front(idx);
            self.map.insert(key.clone(), idx);
            self.current_size += byte_size;
        }

        let within_bounds = self.enforce_bounds();
        if !within_bounds {
            warn!(
                component = "LruCache",
                cache = %self.name,
                key = %key,
                byte_size,
                max_size = self.max_size,
                "entry exceeds the cache byte bound on its own"
            );
        }
        within_bounds
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.take(key).is_some()
    }

    /// Remove `key` and hand back its value
    pub fn take(&mut self, key: &str) -> Option<V> {
        let idx = self.map.remove(key)?;
        self.unlink(idx);
        let node = self.release_slot(idx)?;
        self.current_size -= node.item.byte_size;
        Some(node.item.data)
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.nodes.clear();
        self.free_slots.clear();
        self.head = None;
        self.tail = None;
        self.current_size = 0;
    }

    pub fn has(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Number of entries
    pub fn size(&self) -> usize {
        self.map.len()
    }

    /// Sum of estimated entry sizes
    pub fn byte_size(&self) -> usize {
        self.current_size
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.iter().map(|(key, _)| key)
    }

    /// Entries from most to least recently used
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            nodes: &self.nodes,
            cursor: self.head,
        }
    }

    /// Entries from most to least recently used, collected
    pub fn list(&self) -> Vec<(&str, &CacheItem<V>)> {
        self.iter().collect()
    }

    pub fn get_stats(&self) -> CacheStats {
        CacheStats {
            name: self.name.clone(),
            count: self.map.len(),
            max_count: self.max_count,
            byte_size: self.current_size,
            max_size: self.max_size,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }

    pub fn set_max_size(&mut self, bytes: usize) {
        if bytes < 1 {
            warn!(component = "LruCache", cache = %self.name, "max_size of 0 clamped to 1");
        }
        self.max_size = bytes.max(1);
        self.enforce_bounds();
    }

    pub fn set_max_count(&mut self, count: usize) {
        if count < 1 {
            warn!(component = "LruCache", cache = %self.name, "max_count of 0 clamped to 1");
        }
        self.max_count = count.max(1);
        self.enforce_bounds();
    }

    /// Evict from the tail until at most `bytes` remain, returning entries and bytes released
    pub fn trim_to(&mut self, bytes: usize) -> (usize, usize) {
        let before_size = self.current_size;
        let mut evicted = 0;
        while self.current_size > bytes && self.evict_tail() {
            evicted += 1;
        }
        (evicted, before_size - self.current_size)
    }

    fn enforce_bounds(&mut self) -> bool {
        while (self.current_size > self.max_size || self.map.len() > self.max_count)
            && self.map.len() > 1
        {
            if !self.evict_tail() {
                break;
            }
        }
        self.current_size <= self.max_size && self.map.len() <= self.max_count
    }

    fn evict_tail(&mut self) -> bool {
        let Some(idx) = self.tail else {
            return false;
        };
        self.unlink(idx);
        let Some(node) = self.release_slot(idx) else {
            return false;
        };
        self.map.remove(&node.key);
        self.current_size -= node.item.byte_size;
        self.evictions += 1;
        debug!(
            component = "LruCache",
            cache = %self.name,
            key = %node.key,
            byte_size = node.item.byte_size,
            "evicted least recently used entry"
        );
        true
    }

    fn touch(&mut self, idx: usize) {
        self.access_counter += 1;
        let order = self.access_counter;
        if let Some(node) = self.node_mut(idx) {
            node.item.last_access_order = order;
        }
        if self.head != Some(idx) {
            self.unlink(idx);
            self.push_front(idx);
        }
    }

    fn node(&self, idx: usize) -> Option<&Node<V>> {
        self.nodes.get(idx).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, idx: usize) -> Option<&mut Node<V>> {
        self.nodes.get_mut(idx).and_then(Option::as_mut)
    }

    fn allocate(&mut self, node: Node<V>) -> usize {
        match self.free_slots.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                idx
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    fn release_slot(&mut self, idx: usize) -> Option<Node<V>> {
        let node = self.nodes.get_mut(idx)?.take()?;
        self.free_slots.push(idx);
        Some(node)
    }

    fn unlink(&mut self, idx: usize) {
        let Some((prev, next)) = self.node(idx).map(|node| (node.prev, node.next)) else {
            return;
        };

        match prev.and_then(|p| self.node_mut(p)) {
            Some(prev_node) => prev_node.next = next,
            None => self.head = next,
        }
        match next.and_then(|n| self.node_mut(n)) {
            Some(next_node) => next_node.prev = prev,
            None => self.tail = prev,
        }
        if let Some(node) = self.node_mut(idx) {
            node.prev = None;
            node.next = None;
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(node) = self.node_mut(idx) {
            node.prev = None;
            node.next = old_head;
        }
        match old_head.and_then(|h| self.node_mut(h)) {
            Some(head_node) => head_node.prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }
}

/// Iterator over cache entries from most to least recently used
pub struct Iter<'a, V> {
    nodes: &'a [Option<Node<V>>],
    cursor: Option<usize>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a str, &'a CacheItem<V>);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let node = self.nodes.get(idx)?.as_ref()?;
        self.cursor = node.next;
        Some((node.key.as_str(), &node.item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max_size: usize, max_count: usize) -> LruCache<String> {
        LruCache::new(
            CacheConfiguration::new()
                .with_name("test")
                .with_max_size(max_size)
                .with_max_count(max_count),
        )
    }

    fn keys(cache: &LruCache<String>) -> Vec<String> {
        cache.keys().map(str::to_string).collect()
    }

    #[test]
    fn test_get_refreshes_recency_before_eviction() {
        let mut cache = cache(1024, 3);
        cache.cache("A", "a".to_string(), "");
        cache.cache("B", "b".to_string(), "");
        cache.cache("C", "c".to_string(), "");

        assert_eq!(cache.get("A").map(String::as_str), Some("a"));
        cache.cache("D", "d".to_string(), "");

        assert!(cache.has("A"));
        assert!(!cache.has("B"));
        assert!(cache.has("C"));
        assert_eq!(keys(&cache), vec!["D", "A", "C"]);
    }

    #[test]
    fn test_overwrite_moves_to_head() {
        let mut cache = cache(1024, 2);
        cache.cache("a", "x".to_string(), "");
        cache.cache("b", "y".to_string(), "");
        cache.cache("a", "z".to_string(), "");
        cache.cache("c", "w".to_string(), "");

        assert_eq!(keys(&cache), vec!["c", "a"]);
        assert_eq!(cache.peek("a").map(String::as_str), Some("z"));
    }

    #[test]
    fn test_bounds_hold_after_every_insert() {
        let mut cache = cache(40, 5);
        for i in 0..50 {
            let value = "v".repeat(i % 7 + 1);
            cache.cache(format!("k{}", i % 11), value, "");
            assert!(cache.byte_size() <= 40);
            assert!(cache.size() <= 5);

            let summed: usize = cache.list().iter().map(|(_, item)| item.byte_size).sum();
            assert_eq!(summed, cache.byte_size());
        }
    }

    #[test]
    fn test_overwrite_adjusts_byte_size() {
        let mut cache = cache(1024, 10);
        cache.cache("file", "abcd".to_string(), "v1");
        assert_eq!(cache.byte_size(), 8);

        cache.cache("file", "ab".to_string(), "v2");
        assert_eq!(cache.byte_size(), 4);
        assert_eq!(cache.get_item("file").map(|item| item.label.as_str()), Some("v2"));
    }

    #[test]
    fn test_oversized_entry_is_kept_alone() {
        let mut cache = cache(10, 10);
        assert!(cache.cache("small", "ab".to_string(), ""));
        assert!(!cache.cache("huge", "x".repeat(20), ""));

        assert_eq!(keys(&cache), vec!["huge"]);
        assert_eq!(cache.byte_size(), 40);
    }

    #[test]
    fn test_remove_and_miss() {
        let mut cache = cache(1024, 10);
        cache.cache("a", "1".to_string(), "");

        assert!(cache.remove("a"));
        assert!(!cache.remove("a"));
        assert!(cache.get("a").is_none());
        assert_eq!(cache.byte_size(), 0);
        assert!(cache.is_empty());

        let stats = cache.get_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_slots_are_reused_after_removal() {
        let mut cache = cache(1024, 10);
        cache.cache("a", "1".to_string(), "");
        cache.cache("b", "2".to_string(), "");
        cache.remove("a");
        cache.cache("c", "3".to_string(), "");

        assert_eq!(cache.nodes.len(), 2);
        assert_eq!(keys(&cache), vec!["c", "b"]);
    }

    #[test]
    fn test_set_max_count_evicts_tail() {
        let mut cache = cache(1024, 10);
        for key in ["a", "b", "c", "d"] {
            cache.cache(key, key.to_string(), "");
        }

        cache.set_max_count(2);
        assert_eq!(keys(&cache), vec!["d", "c"]);
        assert_eq!(cache.get_stats().evictions, 2);
    }

    #[test]
    fn test_trim_to_releases_bytes() {
        let mut cache = cache(1024, 10);
        for key in ["a", "b", "c", "d"] {
            cache.cache(key, "xxxx".to_string(), "");
        }

        let (evicted, freed) = cache.trim_to(16);
        assert_eq!(evicted, 2);
        assert_eq!(freed, 16);
        assert_eq!(keys(&cache), vec!["d", "c"]);
    }

    #[test]
    fn test_last_access_order_increases() {
        let mut cache = cache(1024, 10);
        cache.cache("a", "1".to_string(), "");
        cache.cache("b", "2".to_string(), "");
        let before = cache.get_item("a").map(|item| item.last_access_order);

        cache.get("a");
        let after = cache.get_item("a").map(|item| item.last_access_order);
        assert!(after > before);
    }

    #[test]
    fn test_custom_estimator() {
        let mut cache: LruCache<Vec<u32>> = LruCache::with_estimator(
            CacheConfiguration::new().with_max_size(16),
            |v: &Vec<u32>| v.len() * 4,
        );
        cache.cache("a", vec![1, 2], "");
        cache.cache("b", vec![3, 4], "");
        cache.cache("c", vec![5], "");

        assert_eq!(cache.byte_size(), 12);
        assert!(!cache.has("a"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_json_estimate() {
        let value = serde_json::json!({ "id": 1 });
        assert_eq!(value.estimate_size(), r#"{"id":1}"#.len() * 2);
        assert_eq!(json_size(&vec![1, 2]), "[1,2]".len() * 2);
    }
}
