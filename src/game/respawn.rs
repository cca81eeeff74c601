//! Deferred revival timers, one per session at most

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{ServerEvent, SessionId};

#[derive(Debug)]
struct PendingRespawn {
    ticket: u64,
    task: JoinHandle<()>,
}

/// Posts `RespawnDue` back into the event loop after a fixed delay
#[derive(Debug)]
pub struct RespawnScheduler {
    delay: Duration,
    events: mpsc::Sender<ServerEvent>,
    pending: HashMap<SessionId, PendingRespawn>,
    next_ticket: u64,
}

impl RespawnScheduler {
    pub fn new(delay: Duration, events: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            delay,
            events,
            pending: HashMap::new(),
            next_ticket: 0,
        }
    }

    /// Start the timer for `id`, replacing any running one
    pub fn schedule(&mut self, id: SessionId) -> u64 {
        self.cancel(id);

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let delay = self.delay;
        let events = self.events.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(ServerEvent::RespawnDue { id, ticket }).await;
        });

        self.pending.insert(id, PendingRespawn { ticket, task });
        debug!(
            session_id = id,
            ticket,
            delay_ms = delay.as_millis() as u64,
            "Respawn scheduled"
        );
        ticket
    }

    /// Abort the timer for `id`. Returns true if one was pending.
    pub fn cancel(&mut self, id: SessionId) -> bool {
        match self.pending.remove(&id) {
            Some(pending) => {
                pending.task.abort();
                true
            }
            None => false,
        }
    }

    /// Claim a fired timer. False if it was cancelled or superseded meanwhile.
    pub fn take_due(&mut self, id: SessionId, ticket: u64) -> bool {
        match self.pending.get(&id) {
            Some(pending) if pending.ticket == ticket => {
                self.pending.remove(&id);
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self, id: SessionId) -> bool {
        self.pending.contains_key(&id)
    }
}

impl Drop for RespawnScheduler {
    fn drop(&mut self) {
        for pending in self.pending.values() {
            pending.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{self, Instant};

    fn scheduler() -> (RespawnScheduler, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (RespawnScheduler::new(Duration::from_secs(5), tx), rx)
    }

    fn due(event: Option<ServerEvent>) -> (SessionId, u64) {
        match event {
            Some(ServerEvent::RespawnDue { id, ticket }) => (id, ticket),
            other => panic!("expected RespawnDue, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_the_delay() {
        let (mut respawns, mut rx) = scheduler();
        let start = Instant::now();
        let ticket = respawns.schedule(7);

        let (id, fired) = due(rx.recv().await);
        assert_eq!((id, fired), (7, ticket));
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(respawns.take_due(id, fired));
        assert!(!respawns.is_pending(7));
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_keeps_only_the_latest_timer() {
        let (mut respawns, mut rx) = scheduler();
        let start = Instant::now();
        respawns.schedule(1);
        time::advance(Duration::from_secs(3)).await;
        let latest = respawns.schedule(1);

        // The first timer would have fired at 5s
        assert!(time::timeout(Duration::from_millis(4500), rx.recv())
            .await
            .is_err());

        let (id, ticket) = due(rx.recv().await);
        assert_eq!((id, ticket), (1, latest));
        assert!(start.elapsed() >= Duration::from_secs(8));
        assert!(respawns.take_due(id, ticket));

        assert!(time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let (mut respawns, mut rx) = scheduler();
        respawns.schedule(2);
        assert!(respawns.cancel(2));
        assert!(!respawns.cancel(2));

        assert!(time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn stale_ticket_is_rejected() {
        let (mut respawns, _rx) = scheduler();
        let old = respawns.schedule(3);
        let new = respawns.schedule(3);
        assert!(!respawns.take_due(3, old));
        assert!(respawns.take_due(3, new));
        assert!(!respawns.take_due(3, new));
    }
}
