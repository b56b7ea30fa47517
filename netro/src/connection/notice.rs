//! Server notice delivery.
use std::{collections::VecDeque, fmt};

use crate::{common::warning, netezza::NoticeResponse};

/// Server notice, e.g. `NOTICE:  table dropped`.
pub type Notice = NoticeResponse;

/// Notice listener, registered with [`Connection::on_notice`][super::Connection::on_notice].
pub type NoticeListener = Box<dyn FnMut(&Notice) + Send>;

/// Default maximum number of undelivered notices.
pub const DEFAULT_NOTICE_CAPACITY: usize = 1024;

/// Bounded queue of notices waiting for delivery.
///
/// Notices are queued as they arrive and delivered in arrival order between
/// protocol messages. Without listener, notices stay queued until taken with
/// [`NoticeQueue::take`]. When full, the oldest notice is dropped.
pub(crate) struct NoticeQueue {
    queue: VecDeque<Notice>,
    capacity: usize,
    listeners: Vec<NoticeListener>,
}

impl NoticeQueue {
    pub fn new(capacity: usize) -> Self {
        Self { queue: VecDeque::new(), capacity: capacity.max(1), listeners: vec![] }
    }

    pub fn listen(&mut self, listener: NoticeListener) {
        self.listeners.push(listener);
    }

    pub fn push(&mut self, notice: Notice) {
        if self.queue.len() >= self.capacity {
            let _dropped = self.queue.pop_front();
            warning!("notice queue full, dropping {:?}", _dropped);
        }
        self.queue.push_back(notice);
    }

    /// Deliver queued notices to every listener.
    pub fn dispatch(&mut self) {
        if self.listeners.is_empty() {
            return;
        }
        while let Some(notice) = self.queue.pop_front() {
            for listener in &mut self.listeners {
                listener(&notice);
            }
        }
    }

    /// Take undelivered notices.
    pub fn take(&mut self) -> Vec<Notice> {
        self.queue.drain(..).collect()
    }
}

impl fmt::Debug for NoticeQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoticeQueue")
            .field("queue", &self.queue)
            .field("capacity", &self.capacity)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
