use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex};

/// Reader/writer admission control for a single stock record.
///
/// Many readers may hold the lock at once; a writer excludes every reader and
/// every other writer. Admission follows the classic counter protocol: the
/// first reader in blocks writers, the last reader out releases them. The
/// guard on the counter itself is a short critical section and is never held
/// while the protected value is being read or written.
///
/// Every record owns its own `RecordLock`, so commands touching different ids
/// never contend with each other.
pub struct RecordLock<T> {
    gate: Mutex<Gate>,
    cond: Condvar,
    value: UnsafeCell<T>,
}

/// admission state: how many readers are inside, and whether a writer is
#[derive(Debug, Default)]
struct Gate {
    active_readers: u32,
    writer: bool,
}

// The UnsafeCell is only ever dereferenced while the gate admits the caller,
// which is the same exclusion a std RwLock provides.
unsafe impl<T: Send> Send for RecordLock<T> {}
unsafe impl<T: Send + Sync> Sync for RecordLock<T> {}

impl<T> RecordLock<T> {
    /// creates a new lock owning `value`, with no readers or writer admitted
    pub fn new(value: T) -> Self {
        RecordLock {
            gate: Mutex::new(Gate::default()),
            cond: Condvar::new(),
            value: UnsafeCell::new(value),
        }
    }

    /// Admits the caller as a reader, blocking while a writer is inside.
    /// Readers do not block other readers.
    pub fn read(&self) -> ReadGuard<'_, T> {
        let mut gate = self.gate.lock().unwrap();
        while gate.writer {
            gate = self.cond.wait(gate).unwrap();
        }
        gate.active_readers += 1;
        ReadGuard { lock: self }
    }

    /// Admits the caller as the sole writer, blocking while any reader or
    /// another writer is inside.
    pub fn write(&self) -> WriteGuard<'_, T> {
        let mut gate = self.gate.lock().unwrap();
        while gate.writer || gate.active_readers > 0 {
            gate = self.cond.wait(gate).unwrap();
        }
        gate.writer = true;
        WriteGuard { lock: self }
    }

    /// direct access when the caller already has exclusive ownership
    pub fn get_mut(&mut self) -> &mut T {
        // exclusive &mut self means no guard can be alive
        unsafe { &mut *self.value.get() }
    }
}

/// RAII admission for a reader; releases on drop, waking writers when the
/// last reader leaves
pub struct ReadGuard<'a, T> {
    lock: &'a RecordLock<T>,
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        let mut gate = self.lock.gate.lock().unwrap();
        gate.active_readers -= 1;
        if gate.active_readers == 0 {
            // last reader out opens the write gate
            self.lock.cond.notify_all();
        }
    }
}

/// RAII admission for the writer; releases on drop
pub struct WriteGuard<'a, T> {
    lock: &'a RecordLock<T>,
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        let mut gate = self.lock.gate.lock().unwrap();
        gate.writer = false;
        self.lock.cond.notify_all();
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for RecordLock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordLock")
            .field("value", &*self.read())
            .finish()
    }
}
