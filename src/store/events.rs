use std::sync::{Arc, Mutex};

/// Handle returned by [`Emitter::on`], used to detach the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Listeners<E> {
    next_id: u64,
    entries: Vec<(ListenerId, Callback<E>)>,
}

/// Synchronous event emitter.
///
/// Callbacks run on the emitting thread, in registration order. The listener
/// list is not locked during dispatch, so a callback may attach or detach
/// listeners on the same emitter without deadlocking.
pub struct Emitter<E> {
    listeners: Mutex<Listeners<E>>,
}

impl<E> Emitter<E> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            }),
        }
    }

    pub fn on<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        let id = ListenerId(listeners.next_id);
        listeners.next_id += 1;
        listeners.entries.push((id, Arc::new(callback)));
        id
    }

    /// Detach a listener. Returns false when the id was already removed.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        let before = listeners.entries.len();
        listeners.entries.retain(|(entry_id, _)| *entry_id != id);
        listeners.entries.len() < before
    }

    pub fn emit(&self, event: &E) {
        let callbacks: Vec<Callback<E>> = {
            let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
            listeners.entries.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        for callback in callbacks {
            callback(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }
}

impl<E> Default for Emitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_on_emit_off() {
        let emitter: Emitter<u32> = Emitter::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = Arc::clone(&hits);
        let id = emitter.on(move |n| {
            hits_clone.fetch_add(*n as usize, Ordering::SeqCst);
        });

        emitter.emit(&2);
        emitter.emit(&3);
        assert_eq!(hits.load(Ordering::SeqCst), 5);

        assert!(emitter.off(id));
        assert!(!emitter.off(id));
        emitter.emit(&10);
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_detach_from_inside_callback() {
        let emitter: Arc<Emitter<()>> = Arc::new(Emitter::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let emitter_clone = Arc::clone(&emitter);
        let hits_clone = Arc::clone(&hits);
        let id = Arc::new(Mutex::new(None));
        let id_clone = Arc::clone(&id);
        let registered = emitter.on(move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
            if let Some(own_id) = *id_clone.lock().unwrap() {
                emitter_clone.off(own_id);
            }
        });
        *id.lock().unwrap() = Some(registered);

        emitter.emit(&());
        emitter.emit(&());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
