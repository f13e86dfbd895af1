//! Process-wide ledger of resettable singletons, so test suites can clear
//! state accumulated by global registries between cases without tearing
//! down the whole process (spec §4.10 "Registry Manager").

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

type ResetHook = Arc<dyn Fn() + Send + Sync>;

pub struct RegistryManager {
    hooks: RwLock<Vec<ResetHook>>,
}

impl RegistryManager {
    fn new() -> Self {
        Self {
            hooks: RwLock::new(Vec::new()),
        }
    }

    /// The single process-wide instance. Components that keep process-level
    /// state outside the DI container (caches, counters, connection pools)
    /// register a reset hook here during their own initialization.
    pub fn global() -> &'static RegistryManager {
        static INSTANCE: OnceLock<RegistryManager> = OnceLock::new();
        INSTANCE.get_or_init(RegistryManager::new)
    }

    pub fn register_resettable(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.hooks.write().push(Arc::new(hook));
    }

    pub fn registered_count(&self) -> usize {
        self.hooks.read().len()
    }

    /// Runs every registered reset hook. Intended for test fixtures that
    /// need a clean process-wide slate between cases, not for production
    /// shutdown (that's `Container::shutdown`).
    pub fn reset_all(&self) {
        for hook in self.hooks.read().iter() {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn reset_all_invokes_every_registered_hook() {
        let manager = RegistryManager::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c1 = calls.clone();
        manager.register_resettable(move || {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = calls.clone();
        manager.register_resettable(move || {
            c2.fetch_add(10, Ordering::SeqCst);
        });

        manager.reset_all();
        assert_eq!(calls.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn global_instance_is_shared() {
        let a = RegistryManager::global();
        let before = a.registered_count();
        a.register_resettable(|| {});
        let b = RegistryManager::global();
        assert_eq!(b.registered_count(), before + 1);
    }
}
