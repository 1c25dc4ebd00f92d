pub mod event_loop;
pub mod handle;
pub mod mailbox;
pub mod metrics;
pub mod parallel_map;
pub mod pool;
pub mod queue;
pub mod scheduler;
pub mod task;

pub use event_loop::{BlockableEventLoop, Immediate, LoopPolicy, TickGated, TickTask};
pub use handle::{promise, Completer, ResultHandle};
pub use mailbox::{ConsecutiveExecutor, PriorityConsecutiveExecutor};
pub use metrics::{ExecutorMetrics, MetricsSource, TaskCounters};
pub use pool::{build_worker_pool, PoolError, WorkerPool};
pub use queue::{FifoQueue, FixedPriorityQueue, StrictQueue};
pub use scheduler::{PoolScheduler, TaskScheduler};
pub use task::{Prioritized, Task};

pub use tickwork_core::{
    load_dotenv, ConfigError, FatalError, ReportedError, SchedulerConfig, TaskError,
};
