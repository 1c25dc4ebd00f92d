#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    use tickwork_core::{FatalError, ReportedError, SchedulerConfig, TaskError};

    use crate::event_loop::{BlockableEventLoop, Immediate, LoopPolicy, TickGated};
    use crate::metrics::MetricsSource;
    use crate::scheduler::TaskScheduler;

    fn owned_loop() -> BlockableEventLoop {
        BlockableEventLoop::for_current_thread("test-loop", Immediate)
    }

    fn flag() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    /// Queue a task that sets `flag`, bypassing the inline path.
    fn tell<P: LoopPolicy>(event_loop: &BlockableEventLoop<P>, flag: &Arc<AtomicBool>) {
        let flag = Arc::clone(flag);
        event_loop.schedule(event_loop.wrap_runnable(Box::new(move || {
            flag.store(true, Ordering::SeqCst);
        })));
    }

    #[test]
    fn execute_runs_inline_on_owner() {
        let event_loop = owned_loop();
        let ran = flag();
        let r = Arc::clone(&ran);

        assert!(event_loop.is_same_thread());
        event_loop.execute(move || r.store(true, Ordering::SeqCst));

        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(event_loop.pending_tasks_count(), 0);
    }

    #[test]
    fn execute_from_other_thread_is_queued() {
        let event_loop = owned_loop();
        let ran = flag();

        thread::scope(|s| {
            s.spawn(|| {
                assert!(!event_loop.is_same_thread());
                let r = Arc::clone(&ran);
                event_loop.execute(move || r.store(true, Ordering::SeqCst));
            });
        });

        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(event_loop.pending_tasks_count(), 1);

        event_loop.run_all_tasks();
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(event_loop.pending_tasks_count(), 0);
    }

    #[test]
    fn submit_on_owner_is_already_resolved() {
        let event_loop = owned_loop();
        let handle = event_loop.submit(|| 5);
        assert_eq!(handle.try_join().ok(), Some(Ok(5)));
    }

    #[test]
    fn submit_from_other_thread_runs_on_owner() {
        let event_loop = owned_loop();
        let done = flag();

        let ran_on = thread::scope(|s| {
            let helper = s.spawn(|| {
                let result = event_loop.submit(|| thread::current().id()).join();
                done.store(true, Ordering::SeqCst);
                result
            });
            event_loop.managed_block(|| done.load(Ordering::SeqCst));
            helper.join().unwrap()
        });

        assert_eq!(ran_on, Ok(thread::current().id()));
    }

    #[test]
    fn execute_blocking_waits_for_owner() {
        let event_loop = owned_loop().configured(&SchedulerConfig::default());
        let done = flag();

        let value = thread::scope(|s| {
            let helper = s.spawn(|| {
                let value = event_loop.execute_blocking(|| 2 + 2);
                done.store(true, Ordering::SeqCst);
                value
            });
            event_loop.managed_block(|| done.load(Ordering::SeqCst));
            helper.join().unwrap()
        });

        assert_eq!(value, Ok(4));
        assert_eq!(event_loop.execute_blocking(|| "inline"), Ok("inline"));
    }

    #[test]
    fn managed_block_runs_the_task_it_waits_for() {
        let event_loop = owned_loop();
        let ready = flag();
        tell(&event_loop, &ready);

        event_loop.managed_block(|| ready.load(Ordering::SeqCst));

        assert!(ready.load(Ordering::SeqCst));
        assert!(!event_loop.is_managed_blocking());
    }

    #[test]
    fn nested_managed_block_does_not_deadlock() {
        let event_loop = Arc::new(owned_loop());
        let outer_done = flag();
        let inner_done = flag();
        let inner_saw_blocking = flag();

        {
            let lp = Arc::clone(&event_loop);
            let (outer_done, inner_done) = (Arc::clone(&outer_done), Arc::clone(&inner_done));
            event_loop.schedule(Box::new(move || {
                // Waits on a task queued behind this one.
                lp.managed_block(|| inner_done.load(Ordering::SeqCst));
                outer_done.store(true, Ordering::SeqCst);
            }));
        }
        {
            let lp = Arc::clone(&event_loop);
            let (inner_done, saw) = (Arc::clone(&inner_done), Arc::clone(&inner_saw_blocking));
            event_loop.schedule(Box::new(move || {
                saw.store(lp.is_managed_blocking(), Ordering::SeqCst);
                inner_done.store(true, Ordering::SeqCst);
            }));
        }

        event_loop.managed_block(|| outer_done.load(Ordering::SeqCst));

        assert!(inner_done.load(Ordering::SeqCst));
        assert!(inner_saw_blocking.load(Ordering::SeqCst));
        assert!(!event_loop.is_managed_blocking());
    }

    #[test]
    fn managed_block_refuses_other_threads() {
        let event_loop = owned_loop();
        let ran = flag();
        tell(&event_loop, &ran);

        let outcome = thread::scope(|s| {
            s.spawn(|| event_loop.managed_block(|| ran.load(Ordering::SeqCst)))
                .join()
        });

        assert!(outcome.is_err());
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(event_loop.pending_tasks_count(), 1);
        assert!(!event_loop.is_managed_blocking());
    }

    #[test]
    fn poll_task_respects_the_policy_outside_managed_block() {
        let event_loop = BlockableEventLoop::for_current_thread("ticks", TickGated::new(1));
        let ran = flag();
        tell(&event_loop, &ran);

        assert!(!event_loop.poll_task());
        event_loop.run_all_tasks();
        assert_eq!(event_loop.pending_tasks_count(), 1);
        assert!(!ran.load(Ordering::SeqCst));

        event_loop.policy().advance();
        event_loop.policy().advance();
        assert!(event_loop.poll_task());
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn managed_block_ignores_the_policy() {
        let event_loop = BlockableEventLoop::for_current_thread("ticks", TickGated::new(100));
        let ran = flag();
        tell(&event_loop, &ran);
        assert!(!event_loop.poll_task());

        event_loop.managed_block(|| ran.load(Ordering::SeqCst));
        assert_eq!(event_loop.pending_tasks_count(), 0);
    }

    #[test]
    fn fatal_task_is_rethrown() {
        let event_loop = owned_loop();
        event_loop.schedule(Box::new(|| panic::panic_any(FatalError::OutOfMemory)));

        let payload = panic::catch_unwind(AssertUnwindSafe(|| event_loop.run_all_tasks()))
            .expect_err("fatal error must escape the loop");

        assert_eq!(payload.downcast_ref::<FatalError>(), Some(&FatalError::OutOfMemory));
        assert_eq!(event_loop.metrics().tasks_failed, 1);
    }

    #[test]
    fn reported_fatal_is_rethrown() {
        let event_loop = owned_loop();
        event_loop.schedule(Box::new(|| {
            panic::panic_any(ReportedError::new("ticking world", FatalError::StackOverflow))
        }));

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| event_loop.run_all_tasks()));
        assert!(outcome.is_err());
    }

    #[test]
    fn ordinary_panic_is_logged_and_draining_continues() {
        let event_loop = owned_loop();
        let after = flag();
        event_loop.schedule(Box::new(|| panic!("ordinary failure")));
        event_loop.schedule(Box::new(|| {
            panic::panic_any(ReportedError::new("wrapped", TaskError::Failed("bad".into())))
        }));
        tell(&event_loop, &after);

        event_loop.run_all_tasks();

        assert!(after.load(Ordering::SeqCst));
        let metrics = event_loop.metrics();
        assert_eq!(metrics.tasks_executed, 3);
        assert_eq!(metrics.tasks_failed, 2);
        assert_eq!(metrics.pending_tasks, 0);
    }

    #[test]
    fn panicking_submission_fails_its_handle() {
        let event_loop = owned_loop();
        let handle = thread::scope(|s| {
            s.spawn(|| event_loop.submit::<u32, _>(|| panic!("nope")))
                .join()
                .unwrap()
        });

        event_loop.run_all_tasks();
        assert_eq!(handle.join(), Err(TaskError::Panicked("nope".into())));
        assert_eq!(event_loop.metrics().tasks_failed, 0);
    }

    #[test]
    fn dropped_tasks_abandon_their_handles() {
        let event_loop = owned_loop();
        let handle = thread::scope(|s| s.spawn(|| event_loop.submit(|| 1)).join().unwrap());
        assert_eq!(event_loop.pending_tasks_count(), 1);

        event_loop.drop_all_tasks();

        assert_eq!(event_loop.pending_tasks_count(), 0);
        assert_eq!(handle.join(), Err(TaskError::Abandoned));
    }

    #[test]
    fn loop_reports_its_name() {
        let event_loop = owned_loop();
        assert_eq!(event_loop.name(), "test-loop");
        assert_eq!(event_loop.metrics().name, "test-loop");
        event_loop.close();
    }
}
