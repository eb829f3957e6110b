//! The universal two-phase asset lifecycle (spec §4.4): every resource
//! decodes/produces CPU-side state on a loader worker (`init_async`),
//! finalizes on the main thread (`init`, where GPU uploads happen), and is
//! released idempotently (`destroy`). [`ResourceManager`] owns the loader
//! pool and the single-flight-by-name bookkeeping; it knows nothing about
//! what an `Image` or a beatmap metadata scanner actually is — those are
//! just [`ResourceBody`] implementors living in other crates.

mod errors;
mod manager;
mod resource;
mod state;

pub use errors::ResourceError;
pub use manager::{DestroyMode, ResourceKey, ResourceManager};
pub use resource::{Handle, HandleUntyped, ResourceBody};
pub use state::{CancellationToken, ResourceFlags};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    struct CountingBody {
        init_async_calls: Arc<AtomicUsize>,
        init_calls: Arc<AtomicUsize>,
        destroy_calls: Arc<AtomicUsize>,
        value: u32,
    }

    impl ResourceBody for CountingBody {
        fn init_async(&mut self, _cancel: &CancellationToken) -> bool {
            self.init_async_calls.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn init(&mut self) -> bool {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn destroy(&mut self) {
            self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn wait_until(mut predicate: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        predicate()
    }

    #[test]
    fn request_then_update_drives_resource_to_ready() {
        let manager = ResourceManager::new();
        let init_async_calls = Arc::new(AtomicUsize::new(0));
        let init_calls = Arc::new(AtomicUsize::new(0));
        let destroy_calls = Arc::new(AtomicUsize::new(0));

        let handle = manager.request("thing", || CountingBody {
            init_async_calls: Arc::clone(&init_async_calls),
            init_calls: Arc::clone(&init_calls),
            destroy_calls: Arc::clone(&destroy_calls),
            value: 42,
        });

        assert!(wait_until(
            || handle.async_ready(),
            Duration::from_secs(2)
        ));
        assert!(!handle.ready());

        manager.update();
        assert!(handle.ready());
        assert_eq!(init_async_calls.load(Ordering::SeqCst), 1);
        assert_eq!(init_calls.load(Ordering::SeqCst), 1);

        let seen = manager
            .with_body(&handle, |body: &CountingBody| body.value)
            .unwrap();
        assert_eq!(seen, 42);
    }

    #[test]
    fn second_request_for_same_name_is_single_flight() {
        let manager = ResourceManager::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let first = manager.request("dup", move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            CountingBody {
                init_async_calls: Arc::new(AtomicUsize::new(0)),
                init_calls: Arc::new(AtomicUsize::new(0)),
                destroy_calls: Arc::new(AtomicUsize::new(0)),
                value: 1,
            }
        });
        let second = manager.request("dup", || {
            calls.fetch_add(1, Ordering::SeqCst);
            CountingBody {
                init_async_calls: Arc::new(AtomicUsize::new(0)),
                init_calls: Arc::new(AtomicUsize::new(0)),
                destroy_calls: Arc::new(AtomicUsize::new(0)),
                value: 2,
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.as_untyped().key, second.as_untyped().key);
    }

    #[test]
    fn destroy_runs_destroy_hook_and_clears_flags() {
        let manager = ResourceManager::new();
        let destroy_calls = Arc::new(AtomicUsize::new(0));

        let handle = manager.request("to-destroy", || CountingBody {
            init_async_calls: Arc::new(AtomicUsize::new(0)),
            init_calls: Arc::new(AtomicUsize::new(0)),
            destroy_calls: Arc::clone(&destroy_calls),
            value: 0,
        });

        assert!(wait_until(
            || handle.async_ready(),
            Duration::from_secs(2)
        ));
        manager.update();
        assert!(handle.ready());

        manager.destroy(&handle.as_untyped(), DestroyMode::Normal);
        assert_eq!(destroy_calls.load(Ordering::SeqCst), 1);
        assert!(!handle.ready());
        assert!(!handle.is_interrupted());
        assert!(manager.get_handle_by_name("to-destroy").is_none());
    }

    #[test]
    fn interrupted_load_never_becomes_ready() {
        struct SlowBody {
            started: Arc<std::sync::Barrier>,
        }
        impl ResourceBody for SlowBody {
            fn init_async(&mut self, cancel: &CancellationToken) -> bool {
                self.started.wait();
                while !cancel.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(1));
                }
                false
            }
            fn init(&mut self) -> bool {
                true
            }
            fn destroy(&mut self) {}
        }

        let manager = ResourceManager::new();
        let started = Arc::new(std::sync::Barrier::new(2));
        let handle = manager.request("slow", || SlowBody {
            started: Arc::clone(&started),
        });

        started.wait();
        handle.interrupt_load();

        // give the worker time to observe cancellation and report completion
        std::thread::sleep(Duration::from_millis(50));
        manager.update();
        assert!(!handle.async_ready());
        assert!(!handle.ready());
    }
}
