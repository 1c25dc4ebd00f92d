/// An opaque unit of work, run exactly once.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A task tagged with the lane it should be queued in. Lane 0 is serviced first.
#[derive(Debug)]
pub struct Prioritized<T> {
    pub priority: usize,
    pub task: T,
}

impl<T> Prioritized<T> {
    pub fn new(priority: usize, task: T) -> Self {
        Self { priority, task }
    }
}
