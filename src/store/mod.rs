//! Record store: in-memory collections behind an injectable repository trait.
//!
//! Handlers only see `Arc<dyn Repository<_>>`, so a persistent backend can be
//! dropped in without touching them. The in-memory backend keeps insertion
//! order and loses everything on restart.

mod records;

pub use records::{CharacterProfile, Conversation, Record, TestResult};

use crate::conversation::Turn;
use crate::error::{Error, Result};
use crate::evaluation::{TestCategory, Verdict};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Storage seam for one record collection.
pub trait Repository<T: Record>: Send + Sync {
    /// Store a new record. Fails if the id is already taken.
    fn insert(&self, record: T) -> Result<T>;

    fn get(&self, id: &str) -> Result<T>;

    /// All records in insertion order.
    fn list(&self) -> Vec<T>;

    fn filter(&self, predicate: &dyn Fn(&T) -> bool) -> Vec<T>;

    /// Swap the record stored under `id`, keeping its position.
    fn replace(&self, id: &str, record: T) -> Result<T>;

    /// Mutate the record stored under `id` in place and return the result.
    fn modify(&self, id: &str, change: &mut dyn FnMut(&mut T)) -> Result<T>;

    fn remove(&self, id: &str) -> Result<T>;

    fn len(&self) -> usize {
        self.list().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── In-memory backend ────────────────────────────────────────────────────────

pub struct MemoryRepository<T> {
    records: RwLock<Vec<T>>,
}

impl<T> MemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }
}

impl<T> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> MemoryRepository<T> {
    fn position(records: &[T], id: &str) -> Result<usize> {
        records
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| Error::not_found(T::KIND, id))
    }
}

impl<T: Record> Repository<T> for MemoryRepository<T> {
    fn insert(&self, record: T) -> Result<T> {
        let mut records = self.records.write();
        if records.iter().any(|r| r.id() == record.id()) {
            return Err(Error::InvalidInput(format!(
                "{} id already exists: {}",
                T::KIND,
                record.id()
            )));
        }
        records.push(record.clone());
        Ok(record)
    }

    fn get(&self, id: &str) -> Result<T> {
        let records = self.records.read();
        let at = Self::position(&records, id)?;
        Ok(records[at].clone())
    }

    fn list(&self) -> Vec<T> {
        self.records.read().clone()
    }

    fn filter(&self, predicate: &dyn Fn(&T) -> bool) -> Vec<T> {
        self.records
            .read()
            .iter()
            .filter(|r| predicate(r))
            .cloned()
            .collect()
    }

    fn replace(&self, id: &str, record: T) -> Result<T> {
        let mut records = self.records.write();
        let at = Self::position(&records, id)?;
        records[at] = record.clone();
        Ok(record)
    }

    fn modify(&self, id: &str, change: &mut dyn FnMut(&mut T)) -> Result<T> {
        let mut records = self.records.write();
        let at = Self::position(&records, id)?;
        change(&mut records[at]);
        Ok(records[at].clone())
    }

    fn remove(&self, id: &str) -> Result<T> {
        let mut records = self.records.write();
        let at = Self::position(&records, id)?;
        Ok(records.remove(at))
    }

    fn len(&self) -> usize {
        self.records.read().len()
    }
}

// ── Aggregates ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStats {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Indeterminate verdicts.
    pub pending: usize,
    pub by_category: BTreeMap<String, usize>,
}

impl TestStats {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a TestResult>) -> Self {
        let mut stats = Self::default();
        for result in results {
            stats.total += 1;
            match result.verdict {
                Verdict::Pass => stats.passed += 1,
                Verdict::Fail => stats.failed += 1,
                Verdict::Indeterminate => stats.pending += 1,
            }
            *stats.by_category.entry(result.test_type.clone()).or_default() += 1;
        }
        stats
    }
}

// ── Store facade ─────────────────────────────────────────────────────────────

/// The three collections the service works with.
#[derive(Clone)]
pub struct RecordStore {
    pub characters: Arc<dyn Repository<CharacterProfile>>,
    pub conversations: Arc<dyn Repository<Conversation>>,
    pub tests: Arc<dyn Repository<TestResult>>,
}

impl RecordStore {
    pub fn new(
        characters: Arc<dyn Repository<CharacterProfile>>,
        conversations: Arc<dyn Repository<Conversation>>,
        tests: Arc<dyn Repository<TestResult>>,
    ) -> Self {
        Self {
            characters,
            conversations,
            tests,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryRepository::<CharacterProfile>::new()),
            Arc::new(MemoryRepository::<Conversation>::new()),
            Arc::new(MemoryRepository::<TestResult>::new()),
        )
    }

    pub fn conversations_for_character(&self, character_id: &str) -> Vec<Conversation> {
        self.conversations
            .filter(&|c: &Conversation| c.character_id == character_id)
    }

    /// Known category names match regardless of case and surrounding
    /// whitespace; unknown names match their trimmed form exactly.
    pub fn tests_by_category(&self, test_type: &str) -> Vec<TestResult> {
        let wanted = TestCategory::canonical(test_type);
        self.tests.filter(&|t: &TestResult| t.test_type == wanted)
    }

    pub fn test_stats(&self) -> TestStats {
        TestStats::from_results(&self.tests.list())
    }

    /// Append turns to a stored conversation.
    pub fn append_turns(&self, conversation_id: &str, turns: &[Turn]) -> Result<Conversation> {
        self.conversations
            .modify(conversation_id, &mut |c: &mut Conversation| {
                c.messages.extend_from_slice(turns)
            })
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
