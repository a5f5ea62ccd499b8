//! Background execution of shelf operations
//!
//! Operations run on a worker thread so callers (a UI loop, the CLI) are not
//! blocked. Each task reports exactly one terminal result, success or
//! failure, over a channel. Tasks cannot be cancelled; dropping a `Task`
//! only discards its report.

use std::any::Any;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use crate::error::{Result, ShelfError};

/// Handle to an operation running on a worker thread
pub struct Task<T> {
    label: String,
    result_rx: mpsc::Receiver<Result<T>>,
    thread_handle: Option<JoinHandle<()>>,
}

/// Runs `op` on a new worker thread
pub fn execute<T, F>(label: impl Into<String>, op: F) -> Task<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let label = label.into();
    let (result_tx, result_rx) = mpsc::channel();
    let thread_label = label.clone();

    let thread_handle = thread::Builder::new()
        .name(format!("shelf: {}", label))
        .spawn(move || {
            log::debug!("Starting background task: {}", thread_label);
            let result = op();
            if let Err(e) = &result {
                log::warn!("Background task '{}' failed: {}", thread_label, e);
            }
            // The caller may have dropped the task; nobody to report to then
            let _ = result_tx.send(result);
        });

    match thread_handle {
        Ok(handle) => Task {
            label,
            result_rx,
            thread_handle: Some(handle),
        },
        Err(e) => {
            // No thread, so report the spawn failure through the same channel
            let (tx, rx) = mpsc::channel();
            let _ = tx.send(Err(ShelfError::WorkerFailed(format!(
                "could not start '{}': {}",
                label, e
            ))));
            Task {
                label,
                result_rx: rx,
                thread_handle: None,
            }
        }
    }
}

impl<T> Task<T> {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Blocks until the operation finishes
    pub fn wait(mut self) -> Result<T> {
        let result = self.result_rx.recv();
        let panic_message = self.join_worker();
        match result {
            Ok(result) => result,
            Err(_) => Err(ShelfError::WorkerFailed(format!(
                "'{}' stopped without reporting: {}",
                self.label,
                panic_message.unwrap_or_else(|| "no result".to_string())
            ))),
        }
    }

    /// Returns the result if the operation has finished.
    /// Once a result has been returned, later calls return `None`.
    pub fn try_result(&mut self) -> Option<Result<T>> {
        match self.result_rx.try_recv() {
            Ok(result) => {
                self.join_worker();
                Some(result)
            }
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => {
                let panic_message = self.join_worker()?;
                Some(Err(ShelfError::WorkerFailed(format!(
                    "'{}' panicked: {}",
                    self.label, panic_message
                ))))
            }
        }
    }

    /// Invokes exactly one of the callbacks once the operation finishes.
    ///
    /// Returns immediately; the callbacks run on a reporter thread, whose
    /// handle is returned for callers that need to join it.
    pub fn on_complete<S, E>(self, on_success: S, on_error: E) -> JoinHandle<()>
    where
        T: Send + 'static,
        S: FnOnce(T) + Send + 'static,
        E: FnOnce(ShelfError) + Send + 'static,
    {
        thread::spawn(move || match self.wait() {
            Ok(value) => on_success(value),
            Err(e) => on_error(e),
        })
    }

    /// Joins the worker, returning its panic message if it panicked
    fn join_worker(&mut self) -> Option<String> {
        let handle = self.thread_handle.take()?;
        handle.join().err().map(|payload| panic_text(&*payload))
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryBackend;
    use crate::groups::GroupAllocator;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_task_reports_success_once() {
        let allocator = GroupAllocator::new(Arc::new(MemoryBackend::new()));
        let worker = allocator.clone();
        let mut task = execute("add group", move || worker.add_group("Fiction"));

        let result = loop {
            if let Some(result) = task.try_result() {
                break result;
            }
            thread::sleep(Duration::from_millis(5));
        };
        assert_eq!(result.unwrap().id.get(), 1);
        assert!(task.try_result().is_none());
        assert_eq!(allocator.list_groups().unwrap().len(), 1);
    }

    #[test]
    fn test_on_complete_calls_error_callback() {
        let task = execute("fail", || -> Result<()> {
            Err(ShelfError::InvalidGroupName(String::new()))
        });

        let (report_tx, report_rx) = mpsc::channel();
        let error_tx = report_tx.clone();
        task.on_complete(
            move |_| report_tx.send("success".to_string()).unwrap(),
            move |e| error_tx.send(e.user_message()).unwrap(),
        )
        .join()
        .unwrap();

        let reports: Vec<String> = report_rx.try_iter().collect();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].starts_with("Invalid group name"));
    }

    #[test]
    fn test_on_complete_does_not_block_caller() {
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let task = execute("gated", move || -> Result<u32> {
            let _ = gate_rx.recv();
            Ok(7)
        });

        let (report_tx, report_rx) = mpsc::channel();
        let reporter = task.on_complete(
            move |value| report_tx.send(value).unwrap(),
            |e| panic!("unexpected failure: {}", e),
        );

        // The worker is still parked on the gate, so nothing is reported yet
        assert!(report_rx.recv_timeout(Duration::from_millis(50)).is_err());

        gate_tx.send(()).unwrap();
        assert_eq!(report_rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
        reporter.join().unwrap();
    }

    #[test]
    fn test_panicking_worker_is_reported() {
        let task = execute("panics", || -> Result<u32> { panic!("worker exploded") });
        let err = task.wait().unwrap_err();
        assert!(matches!(err, ShelfError::WorkerFailed(ref msg) if msg.contains("worker exploded")));
    }
}
