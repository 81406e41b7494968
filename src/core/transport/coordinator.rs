//! Serial transport coordinator
//!
//! One lock guards the link for both directions. A command's frames are
//! written under a single acquisition, and the telemetry poll holds the lock
//! only for one non-blocking read, so writers never wait behind an idle reader.

use super::SerialLink;
use crate::core::error::{GatewayError, GatewayResult};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, error, info};

type SharedLink = Arc<Mutex<Option<Box<dyn SerialLink>>>>;

/// Link statistics
#[derive(Debug, Clone, Default)]
pub struct LinkStats {
    /// Frames written
    pub frames_written: u64,
    /// Bytes written
    pub bytes_written: u64,
    /// Telemetry lines read
    pub lines_read: u64,
    /// Link failures
    pub errors: u64,
}

/// Arbitrates access to the single controller link
pub struct SerialCoordinator {
    link: SharedLink,
    stats: Arc<RwLock<LinkStats>>,
    description: String,
}

impl SerialCoordinator {
    /// Wrap a link, or run without one
    pub fn new(link: Option<Box<dyn SerialLink>>) -> Self {
        let description = link
            .as_ref()
            .map_or_else(|| "no device".to_string(), |link| link.describe());

        Self {
            link: Arc::new(Mutex::new(link)),
            stats: Arc::new(RwLock::new(LinkStats::default())),
            description,
        }
    }

    /// A coordinator whose every operation reports [`GatewayError::DeviceUnavailable`]
    pub fn unavailable() -> Self {
        Self::new(None)
    }

    /// Whether a link is currently held
    pub fn is_available(&self) -> bool {
        self.link.lock().is_some()
    }

    /// Description of the link opened at startup
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Snapshot of the link statistics
    pub fn stats(&self) -> LinkStats {
        self.stats.read().clone()
    }

    /// Write a command's frames back to back
    ///
    /// A failed write drops the link; every later call reports
    /// [`GatewayError::DeviceUnavailable`].
    pub async fn write(&self, frames: Vec<Bytes>) -> GatewayResult<()> {
        let link = self.link.clone();
        let stats = self.stats.clone();

        run_blocking(move || {
            let mut guard = link.lock();
            let port = guard.as_mut().ok_or(GatewayError::DeviceUnavailable)?;

            for frame in &frames {
                if let Err(e) = port.write_frame(frame) {
                    error!("Controller write failed, releasing link: {}", e);
                    *guard = None;
                    stats.write().errors += 1;
                    return Err(GatewayError::DeviceUnavailable);
                }
                debug!(frame = %hex::encode(frame), "Wrote frame");
            }

            let mut stats = stats.write();
            stats.frames_written += frames.len() as u64;
            stats.bytes_written += frames.iter().map(|f| f.len() as u64).sum::<u64>();
            Ok(())
        })
        .await
    }

    /// Poll for one complete telemetry line without waiting for data
    pub async fn try_read_line(&self) -> GatewayResult<Option<String>> {
        let link = self.link.clone();
        let stats = self.stats.clone();

        run_blocking(move || {
            let mut guard = link.lock();
            let port = guard.as_mut().ok_or(GatewayError::DeviceUnavailable)?;

            match port.read_line() {
                Ok(Some(line)) => {
                    stats.write().lines_read += 1;
                    Ok(Some(line))
                }
                Ok(None) => Ok(None),
                Err(e) => {
                    error!("Controller read failed, releasing link: {}", e);
                    *guard = None;
                    stats.write().errors += 1;
                    Err(GatewayError::DeviceUnavailable)
                }
            }
        })
        .await
    }

    /// Release the link once any in-flight operation has finished
    pub async fn close(&self) {
        let link = self.link.clone();
        let released = run_blocking(move || Ok(link.lock().take())).await;
        if let Ok(Some(port)) = released {
            info!("Released controller link {}", port.describe());
        }
    }
}

async fn run_blocking<T, F>(op: F) -> GatewayResult<T>
where
    F: FnOnce() -> GatewayResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op).await.unwrap_or_else(|e| {
        error!("Controller I/O task failed: {}", e);
        Err(GatewayError::DeviceUnavailable)
    })
}

#[cfg(test)]
mod tests {
    use super::super::{MockSerialLink, VirtualLink};
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_unavailable_reports_device_unavailable() {
        let coordinator = SerialCoordinator::unavailable();
        assert!(!coordinator.is_available());
        assert!(matches!(
            coordinator.write(vec![Bytes::from("START")]).await,
            Err(GatewayError::DeviceUnavailable)
        ));
        assert!(matches!(
            coordinator.try_read_line().await,
            Err(GatewayError::DeviceUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (link, controller) = VirtualLink::pair();
        let coordinator = SerialCoordinator::new(Some(Box::new(link)));

        coordinator
            .write(vec![Bytes::from("101"), Bytes::from("P1")])
            .await
            .unwrap();
        assert_eq!(controller.written(), vec![Bytes::from("101"), Bytes::from("P1")]);

        assert_eq!(coordinator.try_read_line().await.unwrap(), None);
        controller.inject_line("LLEGADA 101");
        assert_eq!(
            coordinator.try_read_line().await.unwrap().as_deref(),
            Some("LLEGADA 101")
        );

        let stats = coordinator.stats();
        assert_eq!(stats.frames_written, 2);
        assert_eq!(stats.bytes_written, 5);
        assert_eq!(stats.lines_read, 1);
    }

    #[tokio::test]
    async fn test_write_failure_is_sticky() {
        let mut link = MockSerialLink::new();
        link.expect_describe().return_const("mock".to_string());
        link.expect_write_frame()
            .times(1)
            .returning(|_| Err(std::io::ErrorKind::BrokenPipe.into()));
        link.expect_read_line().never();

        let coordinator = SerialCoordinator::new(Some(Box::new(link)));
        assert!(coordinator.is_available());
        assert!(matches!(
            coordinator.write(vec![Bytes::from("CLEAR")]).await,
            Err(GatewayError::DeviceUnavailable)
        ));
        assert!(!coordinator.is_available());
        assert!(matches!(
            coordinator.try_read_line().await,
            Err(GatewayError::DeviceUnavailable)
        ));
        assert_eq!(coordinator.stats().errors, 1);
    }

    #[tokio::test]
    async fn test_read_failure_drops_link() {
        let mut link = MockSerialLink::new();
        link.expect_describe().return_const("mock".to_string());
        link.expect_read_line()
            .times(1)
            .returning(|| Err(std::io::ErrorKind::UnexpectedEof.into()));

        let coordinator = SerialCoordinator::new(Some(Box::new(link)));
        assert!(coordinator.try_read_line().await.is_err());
        assert!(!coordinator.is_available());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_keep_frames_adjacent() {
        let (link, controller) = VirtualLink::pair();
        controller.set_write_delay(Duration::from_millis(1));
        let coordinator = Arc::new(SerialCoordinator::new(Some(Box::new(link))));

        let mut tasks = Vec::new();
        for writer in 0..6u8 {
            let coordinator = coordinator.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..5 {
                    let head = Bytes::from(format!("H{writer}"));
                    let tail = Bytes::from(format!("T{writer}"));
                    coordinator.write(vec![head, tail]).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let written = controller.written();
        assert_eq!(written.len(), 60);
        for pair in written.chunks(2) {
            assert_eq!(pair[0][0], b'H');
            assert_eq!(pair[1][0], b'T');
            assert_eq!(pair[0][1..], pair[1][1..]);
        }
    }

    /// Link that records whether a read ever ran while a write was in progress
    #[derive(Clone, Default)]
    struct OverlapDetectingLink {
        writing: Arc<AtomicBool>,
        overlapped: Arc<AtomicBool>,
        reads: Arc<AtomicUsize>,
        writes: Arc<AtomicUsize>,
    }

    impl SerialLink for OverlapDetectingLink {
        fn write_frame(&mut self, _frame: &[u8]) -> std::io::Result<()> {
            self.writing.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(1));
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.writing.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn read_line(&mut self) -> std::io::Result<Option<String>> {
            if self.writing.load(Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        fn describe(&self) -> String {
            "overlap detector".to_string()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reads_never_overlap_writes() {
        let link = OverlapDetectingLink::default();
        let coordinator = Arc::new(SerialCoordinator::new(Some(Box::new(link.clone()))));
        let done = Arc::new(AtomicBool::new(false));

        let mut readers = Vec::new();
        for _ in 0..2 {
            let coordinator = coordinator.clone();
            let done = done.clone();
            readers.push(tokio::spawn(async move {
                while !done.load(Ordering::SeqCst) {
                    coordinator.try_read_line().await.unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }

        let mut writers = Vec::new();
        for _ in 0..4 {
            let coordinator = coordinator.clone();
            writers.push(tokio::spawn(async move {
                for _ in 0..10 {
                    coordinator
                        .write(vec![Bytes::from("204"), Bytes::from("P3")])
                        .await
                        .unwrap();
                }
            }));
        }
        for writer in writers {
            writer.await.unwrap();
        }
        done.store(true, Ordering::SeqCst);
        for reader in readers {
            reader.await.unwrap();
        }

        assert_eq!(link.writes.load(Ordering::SeqCst), 80);
        assert!(link.reads.load(Ordering::SeqCst) > 0);
        assert!(!link.overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_close_releases_link() {
        let (link, _controller) = VirtualLink::pair();
        let coordinator = SerialCoordinator::new(Some(Box::new(link)));
        assert_eq!(coordinator.description(), "virtual controller");
        coordinator.close().await;
        assert!(!coordinator.is_available());
    }
}
