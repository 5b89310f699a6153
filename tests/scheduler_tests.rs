use spool_lite::config::{ResourceConfig, ServerConfig};
use spool_lite::monitor::Monitor;
use spool_lite::scheduler::{
    ClientId, JobStatus, QueueKind, SpoolState, Submission, TickOutcome,
};

fn state(threshold: u64, resources: ResourceConfig) -> SpoolState {
    let config = ServerConfig {
        admission_threshold: threshold,
        resources,
        ..Default::default()
    };
    SpoolState::new(&config, Monitor::new())
}

fn submit(state: &mut SpoolState, lines: usize) -> u64 {
    let body: Vec<String> = (0..lines).map(|i| format!("line {}", i)).collect();
    let submission = Submission {
        resource_type: "paper".to_string(),
        lines: body,
    };
    state.admit(ClientId(1), "127.0.0.1:40000", submission)
}

#[test]
fn test_queue_numbers_are_monotonic() {
    let mut state = state(1, ResourceConfig::default());
    let numbers: Vec<u64> = (0..5).map(|_| submit(&mut state, 1)).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);

    // Completing jobs never frees a number for reuse
    state.begin_processing();
    for _ in 0..100 {
        state.tick();
    }
    assert!(state.jobs.is_empty());
    assert_eq!(submit(&mut state, 1), 6);
}

#[test]
fn test_threshold_gate() {
    let mut state = state(3, ResourceConfig::default());
    state.begin_processing();
    submit(&mut state, 1);
    submit(&mut state, 1);

    for _ in 0..10 {
        assert_eq!(state.tick(), TickOutcome::Gated);
    }
    assert_eq!(state.quantum(), 10);
    assert_eq!(state.jobs.queue_len(QueueKind::Admission), 2);
    assert_eq!(state.pool.available_paper(), 2);

    submit(&mut state, 1);
    assert_ne!(state.tick(), TickOutcome::Gated);
}

#[test]
fn test_not_processing_until_begin() {
    let mut state = state(1, ResourceConfig::default());
    submit(&mut state, 1);
    assert_eq!(state.tick(), TickOutcome::Gated);
    assert!(!state.is_processing());

    state.begin_processing();
    assert!(matches!(state.tick(), TickOutcome::HandedOff { .. }));
}

#[test]
fn test_lone_job_finishes_in_lines_plus_two_quanta() {
    for lines in 1..=5 {
        let mut state = state(1, ResourceConfig::default());
        state.begin_processing();
        let n = submit(&mut state, lines);

        let mut ticks = 0;
        let elapsed = loop {
            ticks += 1;
            assert!(ticks <= lines + 2, "job with {} lines took too long", lines);
            if let TickOutcome::Completed {
                queue_number,
                elapsed_quanta,
                ..
            } = state.tick()
            {
                assert_eq!(queue_number, n);
                break elapsed_quanta;
            }
        };
        assert_eq!(ticks, lines + 2);
        assert_eq!(elapsed, (lines + 2) as u64);
    }
}

#[test]
fn test_mixed_workload_keeps_invariants() {
    let mut state = state(3, ResourceConfig::default());
    state.begin_processing();
    for lines in [3, 1, 4, 1, 5, 2] {
        submit(&mut state, lines);
    }

    let mut completed = Vec::new();
    for _ in 0..500 {
        if let TickOutcome::Completed { queue_number, .. } = state.tick() {
            completed.push(queue_number);
        }
        assert!(state.is_conserved(), "resource units leaked or duplicated");
        for job in state.jobs.all_jobs() {
            assert!(
                state.jobs.locate(job.queue_number).is_some(),
                "job {} is in no queue",
                job.queue_number
            );
        }
        if state.jobs.is_empty() {
            break;
        }
    }

    completed.sort_unstable();
    assert_eq!(completed, vec![1, 2, 3, 4, 5, 6]);
    assert!(state.is_processing());
    assert_eq!(state.pool.available_paper(), 2);
    assert_eq!(state.pool.available_printer(), 1);
}

#[test]
fn test_deadlock_needs_three_jobs_holding_both() {
    let mut state = state(1, ResourceConfig { paper: 3, printer: 3 });
    for expected in [false, false, true] {
        let n = submit(&mut state, 1);
        let state = &mut state;
        let job = state.jobs.get_mut(n).unwrap();
        assert!(state.pool.try_acquire_paper(job));
        assert!(state.pool.try_acquire_printer(job));
        assert_eq!(state.detect_deadlock(), expected);
    }

    state.begin_processing();
    assert_eq!(state.tick(), TickOutcome::Deadlocked);
    assert!(!state.is_processing());
    assert_eq!(state.tick(), TickOutcome::Gated);
}

#[test]
fn test_deadlock_requires_every_job_to_hold_both() {
    let mut state = state(1, ResourceConfig { paper: 3, printer: 3 });
    for n in 1..=3 {
        submit(&mut state, 1);
        let state = &mut state;
        let job = state.jobs.get_mut(n).unwrap();
        state.pool.try_acquire_paper(job);
        if n != 2 {
            state.pool.try_acquire_printer(job);
        }
    }
    assert!(!state.detect_deadlock());
}

#[test]
fn test_resolve_with_short_pool() {
    let mut state = state(1, ResourceConfig::default());
    for _ in 0..3 {
        submit(&mut state, 1);
    }
    {
        let state = &mut state;
        let job = state.jobs.get_mut(1).unwrap();
        state.pool.try_acquire_paper(job);
        state.pool.try_acquire_printer(job);
        job.set_status(JobStatus::Blocked);

        let job = state.jobs.get_mut(2).unwrap();
        state.pool.try_acquire_paper(job);
        job.set_status(JobStatus::Blocked);

        state.jobs.get_mut(3).unwrap().set_status(JobStatus::Blocked);
    }
    assert_eq!(state.pool.available_paper(), 0);

    let report = state.force_resolve_deadlock();
    assert_eq!(report.preempted, vec![1, 2, 3]);
    assert_eq!(report.promoted, vec![1]);
    assert_eq!(report.still_blocked, vec![2, 3]);
    assert_eq!(report.released_paper, 2);
    assert_eq!(report.released_printer, 1);
    assert_eq!(report.granted_paper, 2);
    assert_eq!(report.granted_printer, 1);

    assert_eq!(state.jobs.locate(1), Some(QueueKind::Ready));
    assert_eq!(state.jobs.get(1).unwrap().status, JobStatus::Ready);
    assert_eq!(state.jobs.ids(QueueKind::Admission), vec![2, 3]);
    assert!(state.is_processing());
    assert!(state.is_conserved());
}

#[test]
fn test_resolve_ignores_ready_jobs() {
    let mut state = state(1, ResourceConfig { paper: 3, printer: 3 });
    submit(&mut state, 1);
    {
        let state = &mut state;
        let job = state.jobs.get_mut(1).unwrap();
        state.pool.try_acquire_paper(job);
    }

    let report = state.force_resolve_deadlock();
    assert!(report.preempted.is_empty());
    assert!(state.jobs.get(1).unwrap().has_paper);
    assert_eq!(state.pool.available_paper(), 2);
}

#[test]
fn test_reset_restarts_run() {
    let mut state = state(1, ResourceConfig::default());
    state.begin_processing();
    submit(&mut state, 3);
    state.tick();
    state.tick();

    state.reset();
    assert!(state.jobs.is_empty());
    assert_eq!(state.quantum(), 0);
    assert_eq!(state.admitted_total(), 0);
    assert!(!state.is_processing());
    assert_eq!(state.pool.available_paper(), 2);
    assert_eq!(state.pool.available_printer(), 1);
    assert_eq!(submit(&mut state, 1), 1);
}
