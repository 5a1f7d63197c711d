use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use log::{error, info};

/// Supplied by the hosting process, for example to stop the program it is colocated with
pub type ShutdownAction = Arc<dyn Fn() + Send + Sync>;

pub struct ShutdownService {
    triggered: AtomicBool,
    action: ShutdownAction,
}

impl ShutdownService {
    pub fn new(action: ShutdownAction) -> Self {
        Self {
            triggered: AtomicBool::new(false),
            action,
        }
    }

    /// Starts the shutdown action on its own thread and returns without waiting for it.
    /// Only the first call has any effect, the return value says whether this was it.
    pub fn trigger(self: &Self) -> bool {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("ShutdownService: Shutdown already triggered");
            return false;
        }

        info!("ShutdownService: Triggering shutdown");
        let action = Arc::clone(&self.action);
        if let Err(err) = thread::Builder::new()
            .name(String::from("shutdown"))
            .spawn(move || action())
        {
            error!("ShutdownService: Failed to start shutdown thread: {err}");
        }
        true
    }

    pub fn is_triggered(self: &Self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            mpsc, Arc, Mutex,
        },
        thread,
        time::Duration,
    };

    use super::ShutdownService;

    #[test]
    fn should_run_action_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let (sender, receiver) = mpsc::channel();
        let sender = Mutex::new(sender);

        let action_runs = Arc::clone(&runs);
        let service = ShutdownService::new(Arc::new(move || {
            action_runs.fetch_add(1, Ordering::SeqCst);
            let _ = sender.lock().unwrap().send(());
        }));

        assert!(!service.is_triggered());
        assert!(service.trigger());
        assert!(!service.trigger());
        assert!(service.is_triggered());

        receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn should_not_wait_for_action() {
        let (sender, receiver) = mpsc::channel::<()>();
        let receiver = Mutex::new(receiver);
        let service = ShutdownService::new(Arc::new(move || {
            let _ = receiver.lock().unwrap().recv_timeout(Duration::from_secs(5));
        }));

        assert!(service.trigger());
        sender.send(()).unwrap();
    }

    #[test]
    fn should_tolerate_concurrent_triggers() {
        let runs = Arc::new(AtomicUsize::new(0));
        let action_runs = Arc::clone(&runs);
        let service = Arc::new(ShutdownService::new(Arc::new(move || {
            action_runs.fetch_add(1, Ordering::SeqCst);
        })));

        let firsts: usize = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                thread::spawn(move || service.trigger())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap() as usize)
            .sum();

        assert_eq!(firsts, 1);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
