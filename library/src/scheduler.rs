//! Push-mode evaluation: dirty components run on a worker pool as soon as their producers are done.
//!
//! The scheduler keeps one task per component and a central ready queue. A task's `pending` count is the
//! number of parent edges it has to a dirty producer that has not finished yet; finishing a task releases
//! every consumer edge leaving its slots. Two components joined by an edge therefore never run at the
//! same time, and a task is queued at most once per pass.
//!
//! A slot dirtied in the middle of a pass re-opens its owner and everything downstream of it. Tasks caught
//! running are evaluated once more when they finish.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};

use crate::component::ComponentNode;
use crate::error::EngineError;
use crate::graph::{Node, Slot};

fn slot_key(slot: &Slot) -> usize {
    slot as *const Slot as usize
}

struct Task {
    component: Arc<ComponentNode>,
    slots: Vec<usize>,
    /// `(producer slot, producer task)` for every parent edge into this task.
    edges: Vec<(usize, usize)>,
    pending: usize,
    dirty: bool,
    queued: bool,
    running: bool,
    /// Dirtied again while running: goes back to the queue instead of finishing.
    rerun: bool,
    done: bool,
}

impl Task {
    fn owes_work(&self) -> bool {
        self.dirty && !self.done
    }
}

#[derive(Default)]
struct SchedulerState {
    active: bool,
    shutdown: bool,
    workers: usize,
    tasks: Vec<Task>,
    task_of_slot: HashMap<usize, usize>,
    consumers: HashMap<usize, Vec<usize>>,
    /// Slots whose consumer edges were released this pass.
    produced: HashSet<usize>,
    ready: VecDeque<usize>,
    running: usize,
    remaining: usize,
}

impl SchedulerState {
    fn enqueue(&mut self, index: usize) -> bool {
        let task = &self.tasks[index];
        if !task.owes_work() || task.queued || task.running || task.pending > 0 || self.consumer_running(index) {
            return false;
        }
        self.tasks[index].queued = true;
        self.ready.push_back(index);
        true
    }

    /// Whether a component reading from `index` is being evaluated right now.
    fn consumer_running(&self, index: usize) -> bool {
        self.tasks[index]
            .slots
            .iter()
            .filter_map(|slot| self.consumers.get(slot))
            .flatten()
            .any(|&consumer| consumer != index && self.tasks[consumer].running)
    }

    fn pending_of(&self, index: usize) -> usize {
        self.tasks[index]
            .edges
            .iter()
            .filter(|(slot, producer)| !self.produced.contains(slot) && self.tasks[*producer].owes_work())
            .count()
    }

    /// Releases every consumer edge leaving `slot`, once per pass. Returns whether work became ready.
    fn release(&mut self, slot: usize) -> bool {
        if !self.produced.insert(slot) {
            return false;
        }
        let Some(consumers) = self.consumers.get(&slot).cloned() else {
            return false;
        };
        let mut woke = false;
        for consumer in consumers {
            let task = &mut self.tasks[consumer];
            if !task.owes_work() || task.queued || task.running {
                continue;
            }
            task.pending = task.pending.saturating_sub(1);
            woke |= self.enqueue(consumer);
        }
        woke
    }

    fn pop_ready(&mut self) -> Option<(usize, Arc<ComponentNode>)> {
        let index = self.ready.pop_front()?;
        self.running += 1;
        let task = &mut self.tasks[index];
        task.running = true;
        Some((index, task.component.clone()))
    }

    /// Returns whether work became ready.
    fn complete(&mut self, index: usize) -> bool {
        self.running -= 1;
        let task = &mut self.tasks[index];
        task.running = false;
        let mut woke = false;
        if task.rerun {
            task.rerun = false;
            task.queued = false;
            task.component.force_dirty();
            self.tasks[index].pending = self.pending_of(index);
            woke |= self.enqueue(index);
        } else if !task.done {
            task.done = true;
            self.remaining = self.remaining.saturating_sub(1);
            for slot in self.tasks[index].slots.clone() {
                woke |= self.release(slot);
            }
        }
        // Producers held back while this task ran.
        let producers: Vec<usize> = self.tasks[index].edges.iter().map(|&(_, producer)| producer).collect();
        for producer in producers {
            woke |= self.enqueue(producer);
        }
        woke
    }

    /// Re-opens `start` and every task downstream of it. Returns the tasks touched.
    fn reopen_from(&mut self, start: usize) -> Vec<usize> {
        let mut seen = HashSet::new();
        let mut stack = vec![start];
        let mut touched = Vec::new();
        while let Some(index) = stack.pop() {
            if !seen.insert(index) {
                continue;
            }
            for slot in self.tasks[index].slots.clone() {
                self.produced.remove(&slot);
                if let Some(consumers) = self.consumers.get(&slot) {
                    stack.extend(consumers.iter().copied());
                }
            }

            let task = &mut self.tasks[index];
            if task.running {
                task.rerun = true;
            } else if task.owes_work() {
                if task.queued {
                    task.queued = false;
                    self.ready.retain(|&queued| queued != index);
                }
            } else {
                task.dirty = true;
                task.done = false;
                task.queued = false;
                self.remaining += 1;
            }
            touched.push(index);
        }
        touched
    }
}

struct SchedulerShared {
    state: Mutex<SchedulerState>,
    work_available: Condvar,
    progress: Condvar,
}

impl SchedulerShared {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap()
    }

    fn run_task(&self, index: usize, component: Arc<ComponentNode>) {
        component.update_if_dirty();
        let woke = self.lock().complete(index);
        if woke {
            self.work_available.notify_all();
        }
        self.progress.notify_all();
    }

    fn worker_loop(&self, id: usize) {
        debug!("Scheduler worker {} started", id);
        loop {
            let (index, component) = {
                let mut state = self.lock();
                loop {
                    if state.shutdown {
                        debug!("Scheduler worker {} exiting", id);
                        return;
                    }
                    if state.active {
                        if let Some(next) = state.pop_ready() {
                            break next;
                        }
                    }
                    state = self.work_available.wait(state).unwrap();
                }
            };
            self.run_task(index, component);
        }
    }
}

pub struct Scheduler {
    shared: Arc<SchedulerShared>,
    workers: Vec<JoinHandle<()>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// An inactive scheduler without workers; call [`Scheduler::init`] to start it.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                state: Mutex::new(SchedulerState::default()),
                work_available: Condvar::new(),
                progress: Condvar::new(),
            }),
            workers: Vec::new(),
        }
    }

    /// (Re)sizes the worker pool and activates the scheduler.
    pub fn init(&mut self, worker_count: usize) -> Result<(), EngineError> {
        self.stop();
        self.join_workers();

        info!("Scheduler starting {} worker(s)", worker_count);
        {
            let mut state = self.shared.lock();
            state.shutdown = false;
            state.active = true;
            state.workers = worker_count;
        }
        for id in 0..worker_count {
            let shared = Arc::clone(&self.shared);
            let handle = thread::Builder::new()
                .name(format!("slotflow-worker-{}", id))
                .spawn(move || shared.worker_loop(id))?;
            self.workers.push(handle);
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn is_active(&self) -> bool {
        self.shared.lock().active
    }

    /// Rebuilds tasks and edges from the current component graph.
    pub fn set_components(&self, components: &[Arc<ComponentNode>]) {
        let mut task_of_component = HashMap::new();
        let mut task_of_slot = HashMap::new();
        let mut tasks: Vec<Task> = components
            .iter()
            .enumerate()
            .map(|(index, component)| {
                task_of_component.insert(Arc::as_ptr(component) as usize, index);
                let slots: Vec<usize> = component.slots().iter().map(|s| slot_key(s)).collect();
                for &slot in &slots {
                    task_of_slot.insert(slot, index);
                }
                Task {
                    component: component.clone(),
                    slots,
                    edges: Vec::new(),
                    pending: 0,
                    dirty: false,
                    queued: false,
                    running: false,
                    rerun: false,
                    done: false,
                }
            })
            .collect();

        let mut consumers: HashMap<usize, Vec<usize>> = HashMap::new();
        for (index, component) in components.iter().enumerate() {
            for input in component.input_slots() {
                let Some((producer_slot, producer)) = Self::producer_of(&input, component, &task_of_component) else {
                    continue;
                };
                tasks[index].edges.push((producer_slot, producer));
                consumers.entry(producer_slot).or_default().push(index);
            }
        }

        let mut state = self.shared.lock();
        debug!("Scheduler tracking {} task(s)", tasks.len());
        state.tasks = tasks;
        state.task_of_slot = task_of_slot;
        state.consumers = consumers;
        state.produced.clear();
        state.ready.clear();
        state.remaining = 0;
    }

    /// First slot up the parent chain that belongs to another scheduled component.
    fn producer_of(
        input: &Arc<Slot>,
        consumer: &Arc<ComponentNode>,
        task_of_component: &HashMap<usize, usize>,
    ) -> Option<(usize, usize)> {
        let mut current = input.parent();
        let mut hops = 0;
        while let Some(slot) = current {
            hops += 1;
            if hops > 1024 {
                return None;
            }
            if let Some(owner) = slot.owner() {
                if !Arc::ptr_eq(&owner, consumer) {
                    let task = task_of_component.get(&(Arc::as_ptr(&owner) as usize))?;
                    return Some((slot_key(&slot), *task));
                }
            }
            current = slot.parent();
        }
        None
    }

    /// Mirrors the dirty flags of all components into fresh readiness bookkeeping and wakes the workers.
    pub fn set_dirty(&self) {
        let mut state = self.shared.lock();
        let state = &mut *state;
        state.ready.clear();
        state.produced.clear();
        let mut remaining = 0;
        for task in state.tasks.iter_mut() {
            task.dirty = task.component.is_dirty();
            task.queued = false;
            task.done = false;
            task.rerun = task.running && task.dirty;
            remaining += usize::from(task.dirty);
        }
        state.remaining = remaining;
        for index in 0..state.tasks.len() {
            if state.tasks[index].dirty {
                state.tasks[index].pending = state.pending_of(index);
                state.enqueue(index);
            }
        }
        debug!("Scheduler pass: {} dirty, {} ready", state.remaining, state.ready.len());
        self.shared.work_available.notify_all();
    }

    /// A slot became dirty after `set_dirty`: its owner and every component downstream of it owe another
    /// evaluation. Readiness is recomputed only once the whole cascade is marked.
    pub fn set_data_dirty(&self, slot: &Slot) {
        let mut state = self.shared.lock();
        let Some(&start) = state.task_of_slot.get(&slot_key(slot)) else {
            return;
        };
        let touched = state.reopen_from(start);
        for &index in &touched {
            if !state.tasks[index].running {
                state.tasks[index].pending = state.pending_of(index);
            }
        }
        let mut woke = false;
        for &index in &touched {
            woke |= state.enqueue(index);
        }
        debug!("Slot {} re-opened {} task(s)", slot.name(), touched.len());
        if woke {
            self.shared.work_available.notify_all();
        }
    }

    /// A slot has been produced: consumers waiting on it may become ready. Finishing a task publishes
    /// its slots the same way; each slot is released at most once per pass.
    pub fn set_data_ready(&self, slot: &Slot) {
        let woke = self.shared.lock().release(slot_key(slot));
        if woke {
            self.shared.work_available.notify_all();
        }
    }

    /// Blocks until no progress is possible without the caller. With `main_thread` the caller runs ready
    /// tasks itself while waiting.
    pub fn wait_for_other_tasks(&self, main_thread: bool) {
        let mut state = self.shared.lock();
        let participate = main_thread || state.workers == 0;
        loop {
            if state.remaining == 0 || !state.active {
                break;
            }
            if participate {
                if let Some((index, component)) = state.pop_ready() {
                    drop(state);
                    self.shared.run_task(index, component);
                    state = self.shared.lock();
                    continue;
                }
            }
            if state.ready.is_empty() && state.running == 0 {
                warn!(
                    "Scheduler stalled with {} task(s) outstanding, leaving them to the pull pass",
                    state.remaining
                );
                break;
            }
            state = self.shared.progress.wait(state).unwrap();
        }
    }

    /// Deactivates the scheduler, drops queued work and waits for running tasks to finish.
    pub fn stop(&self) {
        let mut state = self.shared.lock();
        state.active = false;
        for index in state.ready.drain(..).collect::<Vec<_>>() {
            state.tasks[index].queued = false;
        }
        while state.running > 0 {
            state = self.shared.progress.wait(state).unwrap();
        }
    }

    fn join_workers(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.shared.lock().shutdown = true;
        self.shared.work_available.notify_all();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("Scheduler worker panicked");
            }
        }
        info!("Scheduler workers stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
        self.join_workers();
    }
}
