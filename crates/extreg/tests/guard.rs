use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use extreg::guard::GuardRegistry;
use extreg::{DeviceGuardImpl, DeviceIndex, EventId, RegistryError, Slot, StreamId};

const SLOT: Slot = Slot::PrivateUse1;

/// Stub guard: tracks the active device and treats events as immediately
/// complete once recorded.
struct StubGuard {
    current: Mutex<DeviceIndex>,
    next_event: AtomicU64,
    recorded: Mutex<Vec<EventId>>,
}

impl StubGuard {
    fn new() -> Self {
        Self {
            current: Mutex::new(0),
            next_event: AtomicU64::new(1),
            recorded: Mutex::new(Vec::new()),
        }
    }
}

impl DeviceGuardImpl for StubGuard {
    fn device_count(&self) -> DeviceIndex {
        4
    }

    fn current_device(&self) -> DeviceIndex {
        *self.current.lock().unwrap()
    }

    fn exchange_device(&self, device: DeviceIndex) -> DeviceIndex {
        std::mem::replace(&mut *self.current.lock().unwrap(), device)
    }

    fn current_stream(&self, _device: DeviceIndex) -> StreamId {
        StreamId(0)
    }

    fn exchange_stream(&self, _device: DeviceIndex, stream: StreamId) -> StreamId {
        stream
    }

    fn create_event(&self) -> EventId {
        EventId(self.next_event.fetch_add(1, Ordering::Relaxed))
    }

    fn record_event(&self, event: EventId, _stream: StreamId) {
        self.recorded.lock().unwrap().push(event);
    }

    fn query_event(&self, event: EventId) -> bool {
        self.recorded.lock().unwrap().contains(&event)
    }

    fn synchronize_event(&self, _event: EventId) {}

    fn destroy_event(&self, event: EventId) {
        self.recorded.lock().unwrap().retain(|e| *e != event);
    }
}

#[test]
fn guard_is_a_singleton_per_slot() {
    let registry = GuardRegistry::new();
    registry.register(SLOT, Arc::new(StubGuard::new())).unwrap();
    assert!(registry
        .register(SLOT, Arc::new(StubGuard::new()))
        .unwrap_err()
        .is_duplicate());
}

#[test]
fn unbound_slot_has_no_guard() {
    let registry = GuardRegistry::new();
    assert!(matches!(
        registry.guard_for(SLOT),
        Err(RegistryError::UnboundSlot { .. })
    ));
    assert!(registry.scoped_device(SLOT, 1).is_err());
}

#[test]
fn scoped_device_restores_on_drop() {
    let registry = GuardRegistry::new();
    registry.register(SLOT, Arc::new(StubGuard::new())).unwrap();
    let guard_impl = registry.guard_for(SLOT).unwrap();

    assert_eq!(guard_impl.current_device(), 0);
    {
        let scope = registry.scoped_device(SLOT, 3).unwrap();
        assert_eq!(scope.previous_device(), 0);
        assert_eq!(guard_impl.current_device(), 3);

        // Nested scopes restore in reverse order.
        {
            let inner = registry.scoped_device(SLOT, 1).unwrap();
            assert_eq!(inner.previous_device(), 3);
            assert_eq!(guard_impl.current_device(), 1);
        }
        assert_eq!(guard_impl.current_device(), 3);
    }
    assert_eq!(guard_impl.current_device(), 0);
}

#[test]
fn event_lifecycle_round_trip() {
    let registry = GuardRegistry::new();
    registry.register(SLOT, Arc::new(StubGuard::new())).unwrap();
    let guard_impl = registry.guard_for(SLOT).unwrap();

    let event = guard_impl.create_event();
    assert!(!guard_impl.query_event(event));

    let stream = guard_impl.current_stream(0);
    guard_impl.record_event(event, stream);
    guard_impl.synchronize_event(event);
    assert!(guard_impl.query_event(event));

    guard_impl.destroy_event(event);
    assert!(!guard_impl.query_event(event));
}
