//! Outbound UI surface shared by every machine in a session tree.

use shared_types::{Inspection, Notice, NoticeLevel};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

/// Fans notices and inspections out to whoever renders the session.
#[derive(Debug, Clone)]
pub struct Observer {
    notices: broadcast::Sender<Notice>,
    inspections: broadcast::Sender<Inspection>,
}

impl Observer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (notices, _) = broadcast::channel(capacity);
        let (inspections, _) = broadcast::channel(capacity);
        Self {
            notices,
            inspections,
        }
    }

    /// Surface a user-facing notice. Logged even when nobody is subscribed.
    pub fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Warning => tracing::warn!(
                kind = ?notice.kind,
                notice_id = %notice.id,
                "{}",
                notice.message
            ),
            NoticeLevel::Error => tracing::error!(
                kind = ?notice.kind,
                notice_id = %notice.id,
                "{}",
                notice.message
            ),
        }
        let _ = self.notices.send(notice);
    }

    pub fn inspect(&self, inspection: Inspection) {
        let _ = self.inspections.send(inspection);
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub fn subscribe_inspections(&self) -> broadcast::Receiver<Inspection> {
        self.inspections.subscribe()
    }
}

impl Default for Observer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
