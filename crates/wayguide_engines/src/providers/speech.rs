#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use super::{ProviderError, SpeechPriority, SpeechProvider};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Announcement {
    /// Strictly increasing per sink, starting at 1.
    pub seq: u64,
    pub text: String,
    pub priority: SpeechPriority,
    pub unix_ms: u64,
}

#[derive(Debug, Default)]
struct SpeechLog {
    next_seq: u64,
    recent: VecDeque<Announcement>,
}

/// Keeps the latest announcements for clients that voice them on-device.
#[derive(Debug)]
pub struct BufferedSpeechSink {
    capacity: usize,
    log: Mutex<SpeechLog>,
}

impl BufferedSpeechSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            log: Mutex::new(SpeechLog {
                next_seq: 1,
                recent: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SpeechLog> {
        match self.log.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                self.log.clear_poison();
                poisoned.into_inner()
            }
        }
    }

    /// Announcements with `seq > after`, oldest first.
    pub fn since(&self, after: u64) -> Vec<Announcement> {
        self.lock()
            .recent
            .iter()
            .filter(|a| a.seq > after)
            .cloned()
            .collect()
    }

    pub fn latest(&self) -> Option<Announcement> {
        self.lock().recent.back().cloned()
    }
}

impl SpeechProvider for BufferedSpeechSink {
    fn speak(&self, text: &str, priority: SpeechPriority) -> Result<(), ProviderError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        let mut log = self.lock();
        let seq = log.next_seq;
        log.next_seq += 1;
        if log.recent.len() >= self.capacity {
            log.recent.pop_front();
        }
        log.recent.push_back(Announcement {
            seq,
            text: text.to_string(),
            priority,
            unix_ms,
        });
        info!(seq, ?priority, text, "announce");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_speech_01_ring_keeps_latest_and_sequence() {
        let sink = BufferedSpeechSink::new(2);
        sink.speak("one", SpeechPriority::Normal).unwrap();
        sink.speak("  ", SpeechPriority::Normal).unwrap();
        sink.speak("two", SpeechPriority::High).unwrap();
        sink.speak("three", SpeechPriority::Normal).unwrap();

        let all = sink.since(0);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].text, "two");
        assert_eq!(all[0].seq, 2);
        assert_eq!(all[0].priority, SpeechPriority::High);
        assert_eq!(sink.since(2).len(), 1);
        assert_eq!(sink.latest().map(|a| a.seq), Some(3));
    }
}
