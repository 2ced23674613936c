//! Named repeating callbacks driven by the host's frame clock.
//!
//! The multiplexer never reads a wall clock. Every time value is a frame
//! timestamp in milliseconds handed to [`TimerMultiplexer::tick`]; a task's
//! start delay is measured from the timestamp of the last tick seen before
//! it was registered.

use std::collections::HashMap;
use std::fmt;

use tracing::trace;

pub type TimerCallback<C> = Box<dyn FnMut(&mut C, Fire)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fire {
    pub now_ms: u64,
    /// 1 on the first fire of a task.
    pub counter: u32,
}

struct ScheduledTask<C> {
    callback: TimerCallback<C>,
    interval_ms: u64,
    delay_until: Option<u64>,
    /// 0 means unlimited.
    count: u32,
    counter: u32,
    last_fire: Option<u64>,
}

/// Snapshot of a task, returned when it is removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskState {
    pub name: String,
    pub interval_ms: u64,
    pub delay_until: Option<u64>,
    pub count: u32,
    pub counter: u32,
    pub last_fire: Option<u64>,
}

pub struct TimerMultiplexer<C> {
    tasks: HashMap<String, ScheduledTask<C>>,
    last_tick: u64,
}

impl<C> Default for TimerMultiplexer<C> {
    fn default() -> Self {
        Self {
            tasks: HashMap::new(),
            last_tick: 0,
        }
    }
}

impl<C> fmt::Debug for TimerMultiplexer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerMultiplexer")
            .field("tasks", &self.tasks.keys().collect::<Vec<_>>())
            .field("last_tick", &self.last_tick)
            .finish()
    }
}

impl<C> TimerMultiplexer<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` under `name`, replacing any task already there.
    pub fn add<F>(
        &mut self,
        name: impl Into<String>,
        callback: F,
        interval_ms: u64,
        delay_ms: Option<u64>,
        count: Option<u32>,
    ) where
        F: FnMut(&mut C, Fire) + 'static,
    {
        let name = name.into();
        let task = ScheduledTask {
            callback: Box::new(callback),
            interval_ms,
            delay_until: delay_ms.map(|delay| self.last_tick.saturating_add(delay)),
            count: count.unwrap_or(0),
            counter: 0,
            last_fire: None,
        };
        trace!(target = "client::timer", task = %name, interval_ms, ?delay_ms, "task scheduled");
        self.tasks.insert(name, task);
    }

    /// Cancels a task. Unknown names are ignored.
    pub fn remove(&mut self, name: &str) -> Option<TaskState> {
        self.tasks.remove(name).map(|task| TaskState {
            name: name.to_string(),
            interval_ms: task.interval_ms,
            delay_until: task.delay_until,
            count: task.count,
            counter: task.counter,
            last_fire: task.last_fire,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn last_tick(&self) -> u64 {
        self.last_tick
    }

    /// Runs one frame. Each due task fires at most once, however far the
    /// clock has moved since its last fire.
    pub fn tick(&mut self, ctx: &mut C, now_ms: u64) {
        let mut expired = Vec::new();
        for (name, task) in self.tasks.iter_mut() {
            if let Some(until) = task.delay_until {
                if now_ms < until {
                    continue;
                }
            }
            // Before the first fire the interval runs from frame time zero.
            let last = task.last_fire.unwrap_or(0);
            let due = now_ms.saturating_sub(last) >= task.interval_ms;
            if !due {
                continue;
            }
            task.last_fire = Some(now_ms);
            task.counter = task.counter.saturating_add(1);
            (task.callback)(
                ctx,
                Fire {
                    now_ms,
                    counter: task.counter,
                },
            );
            if task.count > 0 && task.counter >= task.count {
                expired.push(name.clone());
            }
        }
        for name in expired {
            trace!(target = "client::timer", task = %name, "task reached its fire count");
            self.tasks.remove(&name);
        }
        self.last_tick = now_ms;
    }
}
