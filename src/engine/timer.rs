// src/engine/timer.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::broadcast::{Publisher, publish_or_log};
use crate::models::event::RoomEvent;

/// Emitted once when a room's countdown reaches zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expiry {
    pub room_code: String,
    /// Identifies the timer instance that expired.
    pub epoch: u64,
}

/// State of the single live countdown of a room.
#[derive(Debug)]
struct ArmedTimer {
    epoch: u64,
    duration: u32,
    remaining: u32,
    task: JoinHandle<()>,
}

struct Inner {
    rooms: DashMap<String, ArmedTimer>,
    /// Most recent epoch armed per room. Survives natural expiry, cleared by disarm.
    latest: DashMap<String, u64>,
    next_epoch: AtomicU64,
    tick: Duration,
    publisher: Arc<dyn Publisher>,
    expiries: UnboundedSender<Expiry>,
}

/// Per-room countdown timers. At most one live timer per room.
///
/// Each tick publishes `TIMER_UPDATE` with the new remaining value; at zero the
/// timer retires itself and sends exactly one [`Expiry`] on the channel handed
/// out by [`TimerScheduler::new`]. The scheduler knows nothing about quizzes.
#[derive(Clone)]
pub struct TimerScheduler {
    inner: Arc<Inner>,
}

impl TimerScheduler {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        tick: Duration,
    ) -> (Self, UnboundedReceiver<Expiry>) {
        let (tx, rx) = unbounded_channel();
        let scheduler = Self {
            inner: Arc::new(Inner {
                rooms: DashMap::new(),
                latest: DashMap::new(),
                next_epoch: AtomicU64::new(0),
                tick,
                publisher,
                expiries: tx,
            }),
        };
        (scheduler, rx)
    }

    /// Starts a countdown of `duration` seconds for the room, replacing any
    /// live one. Returns the epoch of the new timer.
    pub fn arm(&self, room_code: &str, duration: u32) -> u64 {
        let epoch = self.inner.next_epoch.fetch_add(1, Ordering::AcqRel) + 1;

        // The entry guard is held across the swap so a tick of the old timer
        // cannot slip in between.
        match self.inner.rooms.entry(room_code.to_string()) {
            Entry::Occupied(mut occupied) => {
                let task = self.spawn_countdown(room_code, epoch);
                let previous = occupied.insert(ArmedTimer {
                    epoch,
                    duration,
                    remaining: duration,
                    task,
                });
                previous.task.abort();
                tracing::debug!(
                    room = %room_code,
                    replaced = previous.epoch,
                    "timer re-armed"
                );
            }
            Entry::Vacant(vacant) => {
                let task = self.spawn_countdown(room_code, epoch);
                vacant.insert(ArmedTimer {
                    epoch,
                    duration,
                    remaining: duration,
                    task,
                });
            }
        }
        self.inner.latest.insert(room_code.to_string(), epoch);

        tracing::debug!(room = %room_code, epoch, duration, "timer armed");
        epoch
    }

    /// Cancels the room's timer. A no-op when nothing is armed.
    pub fn disarm(&self, room_code: &str) {
        self.inner.latest.remove(room_code);
        if let Some((_, timer)) = self.inner.rooms.remove(room_code) {
            timer.task.abort();
            tracing::debug!(room = %room_code, epoch = timer.epoch, "timer disarmed");
        }
    }

    pub fn is_armed(&self, room_code: &str) -> bool {
        self.inner.rooms.contains_key(room_code)
    }

    pub fn remaining(&self, room_code: &str) -> Option<u32> {
        self.inner.rooms.get(room_code).map(|timer| timer.remaining)
    }

    pub fn duration(&self, room_code: &str) -> Option<u32> {
        self.inner.rooms.get(room_code).map(|timer| timer.duration)
    }

    /// `true` when `epoch` is the last timer armed for the room and the room
    /// has not been disarmed since.
    pub fn is_latest(&self, room_code: &str, epoch: u64) -> bool {
        self.inner
            .latest
            .get(room_code)
            .is_some_and(|latest| *latest == epoch)
    }

    pub fn active_rooms(&self) -> usize {
        self.inner.rooms.len()
    }

    fn spawn_countdown(&self, room_code: &str, epoch: u64) -> JoinHandle<()> {
        tokio::spawn(run_countdown(
            Arc::clone(&self.inner),
            room_code.to_string(),
            epoch,
        ))
    }
}

async fn run_countdown(inner: Arc<Inner>, room_code: String, epoch: u64) {
    let mut interval = tokio::time::interval_at(Instant::now() + inner.tick, inner.tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        {
            // Checked under the entry lock: a disarm or re-arm that already
            // happened means this tick must not be delivered.
            let Some(mut timer) = inner.rooms.get_mut(&room_code) else {
                return;
            };
            if timer.epoch != epoch {
                return;
            }
            timer.remaining = timer.remaining.saturating_sub(1);
            publish_or_log(
                inner.publisher.as_ref(),
                &room_code,
                RoomEvent::TimerUpdate(timer.remaining),
            );
            if timer.remaining > 0 {
                continue;
            }
        }

        // Reached zero: retire this timer, then hand off exactly one expiry.
        if inner
            .rooms
            .remove_if(&room_code, |_, timer| timer.epoch == epoch)
            .is_some()
        {
            tracing::debug!(room = %room_code, epoch, "timer expired");
            if inner
                .expiries
                .send(Expiry {
                    room_code: room_code.clone(),
                    epoch,
                })
                .is_err()
            {
                tracing::error!(room = %room_code, "expiry listener is gone");
            }
        }
        return;
    }
}
