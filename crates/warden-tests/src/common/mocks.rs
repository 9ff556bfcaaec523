// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! Stores that can be switched into a failing state, for checking that
//! decisions fail closed.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use warden_auth::{MemoryStore, Store, StoreError};

/// An in-memory store whose operations fail while `failing` is set.
///
/// With only `failing_writes` set, reads succeed and mutations fail.
#[derive(Debug)]
pub struct FlakyStore<V> {
    inner: MemoryStore<V>,
    failing: AtomicBool,
    failing_writes: AtomicBool,
}

impl<V> FlakyStore<V> {
    /// Creates a healthy store.
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            failing: AtomicBool::new(false),
            failing_writes: AtomicBool::new(false),
        }
    }

    /// Starts or stops failing.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Starts or stops failing mutations only.
    pub fn set_failing_writes(&self, failing: bool) {
        self.failing_writes.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(offline());
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StoreError> {
        self.check()?;
        if self.failing_writes.load(Ordering::SeqCst) {
            return Err(offline());
        }
        Ok(())
    }
}

fn offline() -> StoreError {
    StoreError::Io(io::Error::new(io::ErrorKind::Other, "storage offline"))
}

impl<V> Default for FlakyStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Store<V> for FlakyStore<V>
where
    V: Clone + Send + Sync,
{
    fn get(&self, key: &str) -> Result<Option<V>, StoreError> {
        self.check()?;
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: V) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner.set(key, value)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check_write()?;
        self.inner.delete(key)
    }

    fn list(&self) -> Result<Vec<(String, V)>, StoreError> {
        self.check()?;
        self.inner.list()
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner.clear()
    }
}
