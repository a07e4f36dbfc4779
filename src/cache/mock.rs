use super::{CacheBackend, CacheError, CacheResult};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Cache operation kinds a [`MockCache`] can expect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOp {
    Get,
    Set,
    SetIfAbsent,
    Delete,
    Exists,
    Expire,
    Ping,
}

#[derive(Debug, Clone)]
enum MockReply {
    Ok,
    Value(Option<String>),
    Bool(bool),
    Error(CacheError),
}

#[derive(Debug, Clone)]
struct Expectation {
    op: MockOp,
    key: Option<String>,
    value: Option<String>,
    ttl: Option<Duration>,
    reply: MockReply,
}

#[derive(Default)]
struct MockState {
    expectations: VecDeque<Expectation>,
    failures: Vec<String>,
}

/// Scriptable cache backend for tests
///
/// Expectations are consumed strictly in registration order. A call that
/// does not match the next expectation fails with [`CacheError::Cache`] and
/// is remembered so [`MockCache::expectations_were_met`] reports it.
#[derive(Clone, Default)]
pub struct MockCache {
    state: Arc<Mutex<MockState>>,
}

/// Builder for a single expectation, registered by one of the `returns_*` calls
#[must_use = "an expectation is only registered once a reply is chosen"]
pub struct ExpectationBuilder<'a> {
    mock: &'a MockCache,
    expectation: Expectation,
}

impl ExpectationBuilder<'_> {
    /// Require the stored value to match exactly
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.expectation.value = Some(value.into());
        self
    }

    /// Require the TTL passed to set or expire to match
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expectation.ttl = Some(ttl);
        self
    }

    pub fn returns_ok(self) {
        self.finish(MockReply::Ok)
    }

    pub fn returns_value(self, value: impl Into<String>) {
        self.finish(MockReply::Value(Some(value.into())))
    }

    pub fn returns_none(self) {
        self.finish(MockReply::Value(None))
    }

    pub fn returns_bool(self, value: bool) {
        self.finish(MockReply::Bool(value))
    }

    pub fn returns_error(self, error: CacheError) {
        self.finish(MockReply::Error(error))
    }

    fn finish(mut self, reply: MockReply) {
        self.expectation.reply = reply;
        self.mock.lock().expectations.push_back(self.expectation);
    }
}

impl MockCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn expect(&self, op: MockOp, key: Option<&str>) -> ExpectationBuilder<'_> {
        ExpectationBuilder {
            mock: self,
            expectation: Expectation {
                op,
                key: key.map(str::to_string),
                value: None,
                ttl: None,
                reply: MockReply::Ok,
            },
        }
    }

    pub fn expect_get(&self, key: &str) -> ExpectationBuilder<'_> {
        self.expect(MockOp::Get, Some(key))
    }

    pub fn expect_set(&self, key: &str) -> ExpectationBuilder<'_> {
        self.expect(MockOp::Set, Some(key))
    }

    pub fn expect_set_if_absent(&self, key: &str) -> ExpectationBuilder<'_> {
        self.expect(MockOp::SetIfAbsent, Some(key))
    }

    pub fn expect_delete(&self, key: &str) -> ExpectationBuilder<'_> {
        self.expect(MockOp::Delete, Some(key))
    }

    pub fn expect_exists(&self, key: &str) -> ExpectationBuilder<'_> {
        self.expect(MockOp::Exists, Some(key))
    }

    pub fn expect_expire(&self, key: &str) -> ExpectationBuilder<'_> {
        self.expect(MockOp::Expire, Some(key))
    }

    pub fn expect_ping(&self) -> ExpectationBuilder<'_> {
        self.expect(MockOp::Ping, None)
    }

    /// `Ok` when every expectation was consumed and no call mismatched
    pub fn expectations_were_met(&self) -> Result<(), String> {
        let state = self.lock();
        if let Some(first) = state.failures.first() {
            return Err(first.clone());
        }
        match state.expectations.front() {
            Some(pending) => Err(format!(
                "{} expectation(s) not consumed, next: {:?} {:?}",
                state.expectations.len(),
                pending.op,
                pending.key
            )),
            None => Ok(()),
        }
    }

    /// Panicking form of [`MockCache::expectations_were_met`] for tests
    #[track_caller]
    pub fn assert_expectations_met(&self) {
        if let Err(message) = self.expectations_were_met() {
            panic!("mock cache: {message}");
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take(
        &self,
        op: MockOp,
        key: Option<&str>,
        value: Option<&str>,
        ttl: Option<Duration>,
    ) -> CacheResult<MockReply> {
        let mut state = self.lock();

        let Some(expected) = state.expectations.pop_front() else {
            let message = format!("unexpected call {:?} {:?}", op, key);
            state.failures.push(message.clone());
            return Err(CacheError::Cache(message));
        };

        let mismatch = if expected.op != op {
            Some(format!("expected {:?}, got {:?}", expected.op, op))
        } else if expected.key.as_deref() != key {
            Some(format!(
                "{:?}: expected key {:?}, got {:?}",
                op, expected.key, key
            ))
        } else if expected.value.is_some() && expected.value.as_deref() != value {
            Some(format!(
                "{:?}: expected value {:?}, got {:?}",
                op, expected.value, value
            ))
        } else if expected.ttl.is_some() && expected.ttl != ttl {
            Some(format!(
                "{:?}: expected ttl {:?}, got {:?}",
                op, expected.ttl, ttl
            ))
        } else {
            None
        };

        if let Some(message) = mismatch {
            state.failures.push(message.clone());
            return Err(CacheError::Cache(message));
        }

        match expected.reply {
            MockReply::Error(error) => Err(error),
            reply => Ok(reply),
        }
    }
}

#[async_trait::async_trait]
impl CacheBackend for MockCache {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match self.take(MockOp::Get, Some(key), None, None)? {
            MockReply::Value(value) => Ok(value),
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        self.take(MockOp::Set, Some(key), Some(&value), ttl)?;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> CacheResult<bool> {
        match self.take(MockOp::SetIfAbsent, Some(key), Some(&value), ttl)? {
            MockReply::Bool(stored) => Ok(stored),
            _ => Ok(true),
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.take(MockOp::Delete, Some(key), None, None)?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        match self.take(MockOp::Exists, Some(key), None, None)? {
            MockReply::Bool(value) => Ok(value),
            MockReply::Value(value) => Ok(value.is_some()),
            _ => Ok(false),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        match self.take(MockOp::Expire, Some(key), None, Some(ttl))? {
            MockReply::Bool(value) => Ok(value),
            _ => Ok(true),
        }
    }

    async fn ping(&self) -> CacheResult<()> {
        self.take(MockOp::Ping, None, None, None)?;
        Ok(())
    }
}
