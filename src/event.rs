//! Event queue: a time-and-priority ordered min-heap of simulation events,
//! grounded on `crpd/internals/events.py` and the `_EventQueue` class in
//! `crpd/internals/simulator.py`.
//!
//! Events are ordered first by time, then by a kind-rank that breaks ties
//! between events scheduled at the same instant: a completion must be
//! processed before an arrival at the same time, which must be processed
//! before a deadline, which must be processed before a schedule tick.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use static_assertions::const_assert;

use crate::history::StateEvent;
use crate::job::{Job, JobManager};
use crate::task::{TaskId, Time};

/// Completion(1) < Arrival(2) < Deadline(3) < ScheduleTick(4).
const_assert!(1u8 < 2u8 && 2u8 < 3u8 && 3u8 < 4u8);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum KindRank {
    Completion = 1,
    Arrival = 2,
    Deadline = 3,
    ScheduleTick = 4,
}

/// A pending simulation event, carrying just enough identity
/// (`task_id`/`release_index`) to look its job up in a [`JobManager`] rather
/// than holding the job itself — this lets events be cheaply `Clone`d and
/// converted to/from [`StateEvent`] snapshots.
#[derive(Debug, Clone)]
pub enum Event {
    Completion { time: Time, task_id: TaskId, release_index: u64 },
    Arrival { time: Time, task_id: TaskId, release_index: u64 },
    Deadline { time: Time, task_id: TaskId, release_index: u64 },
    ScheduleTick { time: Time },
}

impl Event {
    pub fn completion(job: &Job) -> Self {
        Event::Completion {
            time: job.release_time() + job.remaining_exec_with_debt() as Time,
            task_id: job.task_id(),
            release_index: job.release_index(),
        }
    }

    pub fn completion_at(time: Time, job: &Job) -> Self {
        Event::Completion {
            time,
            task_id: job.task_id(),
            release_index: job.release_index(),
        }
    }

    pub fn arrival(job: &Job) -> Self {
        Event::Arrival {
            time: job.release_time(),
            task_id: job.task_id(),
            release_index: job.release_index(),
        }
    }

    pub fn deadline(job: &Job) -> Self {
        Event::Deadline {
            time: job.deadline(),
            task_id: job.task_id(),
            release_index: job.release_index(),
        }
    }

    pub fn schedule_tick(time: Time) -> Self {
        Event::ScheduleTick { time }
    }

    pub fn time(&self) -> Time {
        match self {
            Event::Completion { time, .. }
            | Event::Arrival { time, .. }
            | Event::Deadline { time, .. }
            | Event::ScheduleTick { time } => *time,
        }
    }

    fn kind_rank(&self) -> KindRank {
        match self {
            Event::Completion { .. } => KindRank::Completion,
            Event::Arrival { .. } => KindRank::Arrival,
            Event::Deadline { .. } => KindRank::Deadline,
            Event::ScheduleTick { .. } => KindRank::ScheduleTick,
        }
    }

    /// The secondary sort key used to break ties between two events with
    /// the same time and kind rank: the owning task's id, or 0 for a
    /// schedule tick which has no owning task.
    fn task_key(&self) -> TaskId {
        match self {
            Event::Completion { task_id, .. }
            | Event::Arrival { task_id, .. }
            | Event::Deadline { task_id, .. } => *task_id,
            Event::ScheduleTick { .. } => 0,
        }
    }

    /// A completion event is stale (and must be skipped rather than
    /// executed) when the job it refers to still has outstanding work and
    /// either hasn't started yet, or its freshly computed completion time
    /// no longer matches this event's time (the job was preempted and
    /// re-scheduled since the event was queued).
    ///
    /// Panics if the recomputed completion time precedes `self.time()` —
    /// that would mean execution progressed faster than physically
    /// possible, an invariant violation akin to the original's
    /// `assert completionTime >= self._time`.
    pub fn should_ignore(&self, job_manager: &JobManager) -> bool {
        match self {
            Event::Completion {
                time,
                task_id,
                release_index,
            } => {
                let job = job_manager
                    .get(*task_id, *release_index)
                    .expect("completion event references a job no longer tracked");
                let remaining = job.remaining_exec_with_debt();
                if remaining > 0 {
                    if let Some(last_start) = job.last_start() {
                        let completion_time = last_start + remaining as Time;
                        assert!(
                            completion_time >= *time,
                            "job completion time moved backwards: recomputed {completion_time} < event time {time}"
                        );
                        completion_time != *time
                    } else {
                        true
                    }
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    pub fn state_converted(&self) -> StateEvent {
        match self {
            Event::Completion {
                time,
                task_id,
                release_index,
            } => StateEvent::Completion {
                time: *time,
                task_id: *task_id,
                release_index: *release_index,
            },
            Event::Arrival {
                time,
                task_id,
                release_index,
            } => StateEvent::Arrival {
                time: *time,
                task_id: *task_id,
                release_index: *release_index,
            },
            Event::Deadline {
                time,
                task_id,
                release_index,
            } => StateEvent::Deadline {
                time: *time,
                task_id: *task_id,
                release_index: *release_index,
            },
            Event::ScheduleTick { time } => StateEvent::ScheduleTick { time: *time },
        }
    }
}

/// `BinaryHeap` is a max-heap; events compare by `(time, kind_rank,
/// task_key)` ascending, so the ordering below is reversed to make the
/// *earliest* event the heap's max (and therefore its top).
#[derive(Debug, Clone)]
struct HeapEntry(Event);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.sort_key().cmp(&self.sort_key())
    }
}

impl HeapEntry {
    fn sort_key(&self) -> (Time, KindRank, TaskId) {
        (self.0.time(), self.0.kind_rank(), self.0.task_key())
    }
}

/// A time-and-priority ordered queue of pending events.
pub struct EventQueue {
    heap: BinaryHeap<HeapEntry>,
}

impl EventQueue {
    pub fn new() -> Self {
        EventQueue {
            heap: BinaryHeap::new(),
        }
    }

    pub fn from_events(events: impl IntoIterator<Item = Event>) -> Self {
        EventQueue {
            heap: events.into_iter().map(HeapEntry).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn push(&mut self, event: Event) {
        self.heap.push(HeapEntry(event));
    }

    pub fn add_arrival(&mut self, job: &Job) {
        self.push(Event::arrival(job));
    }

    pub fn add_deadline(&mut self, job: &Job) {
        self.push(Event::deadline(job));
    }

    pub fn add_schedule_tick(&mut self, time: Time) {
        self.push(Event::schedule_tick(time));
    }

    /// The raw top of the heap without skipping stale completions.
    pub fn top(&self) -> Option<&Event> {
        self.heap.peek().map(|e| &e.0)
    }

    /// The top of the heap after discarding any stale completion events in
    /// front of it.
    pub fn effective_top(&mut self, job_manager: &JobManager) -> Option<&Event> {
        while let Some(entry) = self.heap.peek() {
            if entry.0.should_ignore(job_manager) {
                self.heap.pop();
            } else {
                break;
            }
        }
        self.heap.peek().map(|e| &e.0)
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop().map(|e| e.0)
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.heap.iter().map(|e| &e.0)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Rehydrates an event queue from a set of state snapshots captured in
/// history. Unlike the Python original, this crate doesn't need a job
/// manager to do so since events carry identity rather than job references.
pub fn events_from_states(states: impl IntoIterator<Item = StateEvent>) -> EventQueue {
    EventQueue::from_events(states.into_iter().map(|s| match s {
        StateEvent::Completion {
            time,
            task_id,
            release_index,
        } => Event::Completion {
            time,
            task_id,
            release_index,
        },
        StateEvent::Arrival {
            time,
            task_id,
            release_index,
        } => Event::Arrival {
            time,
            task_id,
            release_index,
        },
        StateEvent::Deadline {
            time,
            task_id,
            release_index,
        } => Event::Deadline {
            time,
            task_id,
            release_index,
        },
        StateEvent::ScheduleTick { time } => Event::ScheduleTick { time },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{reset_task_id_counter, ArrivalDistribution, Task};
    use std::sync::Arc;

    #[test]
    fn ties_break_by_kind_rank_then_task_id() {
        let mut q = EventQueue::new();
        q.push(Event::Deadline {
            time: 10,
            task_id: 1,
            release_index: 0,
        });
        q.push(Event::Arrival {
            time: 10,
            task_id: 1,
            release_index: 0,
        });
        q.push(Event::Completion {
            time: 10,
            task_id: 1,
            release_index: 0,
        });
        q.push(Event::ScheduleTick { time: 10 });

        assert!(matches!(q.pop(), Some(Event::Completion { .. })));
        assert!(matches!(q.pop(), Some(Event::Arrival { .. })));
        assert!(matches!(q.pop(), Some(Event::Deadline { .. })));
        assert!(matches!(q.pop(), Some(Event::ScheduleTick { .. })));
    }

    #[test]
    fn earliest_time_pops_first_regardless_of_kind() {
        let mut q = EventQueue::new();
        q.push(Event::ScheduleTick { time: 5 });
        q.push(Event::Completion {
            time: 1,
            task_id: 0,
            release_index: 0,
        });
        let first = q.pop().unwrap();
        assert_eq!(first.time(), 1);
    }

    #[test]
    fn effective_top_skips_stale_completion() {
        reset_task_id_counter();
        let task = Arc::new(Task::new(10, 10, ArrivalDistribution::fixed(10)));
        let mut jm = JobManager::new();
        {
            let job = jm.get_or_create(&task, 0);
            job.start(0);
        }
        // preemption at time 3 added debt, job restarted at time 6: the
        // originally queued completion time of 10 is now stale.
        {
            let job = jm.get_mut(task.unique_id(), 0).unwrap();
            job.progress_to(3);
            job.stop();
        }
        {
            let job = jm.get_mut(task.unique_id(), 0).unwrap();
            job.start(6);
        }
        let mut q = EventQueue::new();
        q.push(Event::Completion {
            time: 10,
            task_id: task.unique_id(),
            release_index: 0,
        });
        q.push(Event::Arrival {
            time: 6,
            task_id: task.unique_id(),
            release_index: 1,
        });
        let top = q.effective_top(&jm).unwrap();
        assert!(matches!(top, Event::Arrival { .. }));
    }
}
