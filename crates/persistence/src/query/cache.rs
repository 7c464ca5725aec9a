//! Prepared statement cache keyed by normalized SQL.
//!
//! Two statements that differ only in their bound values share a key, since
//! only the SQL text affects plan reuse. Each connection owns its own cache and
//! clears it when the connection is dropped.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use sha2::{Digest, Sha256};

/// Default number of statements kept per connection.
pub const DEFAULT_STATEMENT_CACHE_CAPACITY: usize = 256;

/// Stable identifier of a statement shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementKey(String);

impl StatementKey {
    /// Derives the key of `sql`: SHA-256 of the whitespace-normalized text.
    pub fn for_sql(sql: &str) -> Self {
        let digest = Sha256::digest(normalize_sql(sql).as_bytes());
        StatementKey(hex::encode(digest))
    }

    /// Hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for StatementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collapses whitespace runs outside string literals and quoted identifiers
/// to a single space and trims both ends.
pub fn normalize_sql(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut pending_space = false;

    for c in sql.chars() {
        match quote {
            Some(q) => {
                out.push(c);
                if c == q {
                    quote = None;
                }
            }
            None if c.is_whitespace() => pending_space = true,
            None => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                if c == '\'' || c == '"' {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }

    out
}

/// Hit and miss counters of a [`StatementCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found a prepared statement.
    pub hits: u64,
    /// Lookups that had to prepare.
    pub misses: u64,
    /// Statements currently cached.
    pub entries: usize,
}

/// Bounded least-recently-used cache of prepared statements.
pub struct StatementCache<T> {
    capacity: usize,
    entries: HashMap<StatementKey, T>,
    order: VecDeque<StatementKey>,
    hits: u64,
    misses: u64,
}

impl<T> fmt::Debug for StatementCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementCache")
            .field("capacity", &self.capacity)
            .field("entries", &self.entries.len())
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}

impl<T> Default for StatementCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_STATEMENT_CACHE_CAPACITY)
    }
}

impl<T> StatementCache<T> {
    /// Creates a cache holding at most `capacity` statements. A capacity of
    /// zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Looks up a statement, recording a hit or a miss.
    pub fn get(&mut self, key: &StatementKey) -> Option<&T> {
        if self.entries.contains_key(key) {
            self.hits += 1;
            self.touch(key);
            self.entries.get(key)
        } else {
            self.misses += 1;
            None
        }
    }

    /// Stores a statement, evicting the least recently used one when full.
    pub fn insert(&mut self, key: StatementKey, value: T) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.contains_key(&key) {
            self.touch(&key);
        } else {
            while self.entries.len() >= self.capacity {
                match self.order.pop_front() {
                    Some(oldest) => {
                        self.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
            self.order.push_back(key.clone());
        }
        self.entries.insert(key, value);
    }

    /// Drops every cached statement. Counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Number of cached statements.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }

    fn touch(&mut self, key: &StatementKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}
