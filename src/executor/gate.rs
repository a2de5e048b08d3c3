//! The generic mutex + condition-variable admission primitive shared by both
//! executor back-ends (design note: "atomic counter with condition
//! signalling ... implement as such and expose only acquire_slot() /
//! release_slot()"). A semaphore is, underneath, exactly this.

use std::sync::{Arc, Condvar, Mutex};

pub(crate) struct ConcurrencyGate {
    in_flight: Mutex<usize>,
    cvar: Condvar,
    max: usize,
}

impl ConcurrencyGate {
    pub(crate) fn new(max: usize) -> Arc<Self> {
        Arc::new(ConcurrencyGate {
            in_flight: Mutex::new(0),
            cvar: Condvar::new(),
            max,
        })
    }

    pub(crate) fn available(&self) -> bool {
        *self.in_flight.lock().expect("gate lock poisoned") < self.max
    }

    pub(crate) fn wait_available(&self) {
        let mut n = self.in_flight.lock().expect("gate lock poisoned");
        while *n >= self.max {
            n = self.cvar.wait(n).expect("gate lock poisoned");
        }
    }

    /// Increments `in_flight` and returns a guard that decrements it (and
    /// notifies waiters) on every exit path, including a panicking worker.
    pub(crate) fn acquire(self: &Arc<Self>) -> SlotGuard {
        let mut n = self.in_flight.lock().expect("gate lock poisoned");
        *n += 1;
        SlotGuard {
            gate: Arc::clone(self),
        }
    }

    pub(crate) fn join_idle(&self) {
        let mut n = self.in_flight.lock().expect("gate lock poisoned");
        while *n > 0 {
            n = self.cvar.wait(n).expect("gate lock poisoned");
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        *self.in_flight.lock().expect("gate lock poisoned") == 0
    }
}

pub(crate) struct SlotGuard {
    gate: Arc<ConcurrencyGate>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut n = self.gate.in_flight.lock().expect("gate lock poisoned");
        *n -= 1;
        self.gate.cvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wait_available_unblocks_on_release() {
        let gate = ConcurrencyGate::new(1);
        let guard = gate.acquire();
        assert!(!gate.available());

        let gate2 = Arc::clone(&gate);
        let handle = thread::spawn(move || {
            gate2.wait_available();
        });

        thread::sleep(Duration::from_millis(50));
        drop(guard);
        handle.join().unwrap();
        assert!(gate.available());
    }

    #[test]
    fn join_idle_waits_for_all_slots() {
        let gate = ConcurrencyGate::new(4);
        let g1 = gate.acquire();
        let g2 = gate.acquire();
        let gate2 = Arc::clone(&gate);
        let handle = thread::spawn(move || gate2.join_idle());
        thread::sleep(Duration::from_millis(30));
        drop(g1);
        drop(g2);
        handle.join().unwrap();
    }
}
