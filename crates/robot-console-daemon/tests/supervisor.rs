#![expect(
    clippy::unwrap_used,
    reason = "Test-only assertions use unwrap for clarity."
)]

//! Supervisor lifecycle against real PTY children.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::sh;
use proptest::prelude::*;
use robot_console_daemon::{SubscriberSlot, Supervisor};

fn supervisor() -> Arc<Supervisor> {
    Arc::new(Supervisor::new(
        Arc::new(SubscriberSlot::new()),
        Duration::from_millis(200),
    ))
}

#[test]
fn input_is_delivered_in_order() {
    let sup = supervisor();
    let dir = tempfile::TempDir::new().unwrap();
    let out = dir.path().join("input.txt");
    let script = format!("cat > {}", out.display());
    sup.start("Capture", &sh(&script)).unwrap();

    assert!(sup.write_input(b"one\n").unwrap());
    assert!(sup.write_input(b"two\n").unwrap());
    assert!(sup.write_input(b"three\n").unwrap());
    // ^D on an empty line ends cat's input.
    assert!(sup.write_input(&[0x04]).unwrap());

    let deadline = Instant::now() + Duration::from_secs(5);
    while !sup.status().exited && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    let captured = std::fs::read_to_string(&out).unwrap();
    assert_eq!(captured, "one\ntwo\nthree\n");
}

#[test]
fn concurrent_starts_leave_one_session() {
    let sup = supervisor();
    let handles: Vec<_> = (0..6)
        .map(|i| {
            let sup = Arc::clone(&sup);
            thread::spawn(move || sup.start(&format!("Job {i}"), &sh("sleep 30")).unwrap())
        })
        .collect();
    let started: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let status = sup.status();
    assert!(status.live);
    let winner = started
        .iter()
        .find(|s| Some(s.session_id) == status.session_id)
        .unwrap();
    assert_eq!(status.pid, winner.pid);

    #[cfg(target_os = "linux")]
    for loser in started.iter().filter(|s| s.session_id != winner.session_id) {
        let pid = loser.pid.unwrap();
        assert!(
            common::process_gone(pid, Duration::from_secs(5)),
            "replaced session {pid} still running"
        );
    }
    sup.terminate();
}

#[test]
fn terminate_escalates_for_stubborn_process() {
    let sup = supervisor();
    let started = sup
        .start("Stubborn", &sh("trap '' TERM; while true; do sleep 0.1; done"))
        .unwrap();
    assert!(sup.terminate());
    assert!(!sup.status().live);

    #[cfg(target_os = "linux")]
    assert!(common::process_gone(
        started.pid.unwrap(),
        Duration::from_secs(5)
    ));
    #[cfg(not(target_os = "linux"))]
    let _ = started;
}

#[cfg(target_os = "linux")]
#[test]
fn terminate_after_exit_reaches_leftover_descendants() {
    let sup = supervisor();
    let dir = tempfile::TempDir::new().unwrap();
    let pidfile = dir.path().join("bg.pid");
    let script = format!("trap '' HUP; sleep 30 & echo $! > {}; exit 0", pidfile.display());
    sup.start("Leaves a child", &sh(&script)).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while !sup.status().exited && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    assert!(sup.status().exited);
    let orphan: u32 = std::fs::read_to_string(&pidfile)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(!common::process_gone(orphan, Duration::from_millis(100)));

    assert!(sup.terminate());
    assert!(
        common::process_gone(orphan, Duration::from_secs(5)),
        "descendant {orphan} survived terminate"
    );
}

#[test]
fn dropping_supervisor_terminates_session() {
    let sup = supervisor();
    let started = sup.start("Sleep", &sh("sleep 30")).unwrap();
    drop(sup);

    #[cfg(target_os = "linux")]
    assert!(common::process_gone(
        started.pid.unwrap(),
        Duration::from_secs(5)
    ));
    #[cfg(not(target_os = "linux"))]
    let _ = started;
}

#[derive(Debug, Clone)]
enum Op {
    Start,
    Terminate,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Start), Just(Op::Terminate)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn at_most_one_session_is_live(ops in prop::collection::vec(op(), 1..6)) {
        let sup = supervisor();
        let mut expected_live = false;
        let mut last_id = None;
        let mut pids = Vec::new();

        for op in ops {
            match op {
                Op::Start => {
                    let started = sup.start("Sleep", &sh("sleep 30")).unwrap();
                    if let Some(prev) = last_id.replace(started.session_id) {
                        prop_assert!(started.session_id > prev);
                    }
                    pids.push(started.pid);
                    expected_live = true;
                }
                Op::Terminate => {
                    prop_assert_eq!(sup.terminate(), expected_live);
                    expected_live = false;
                }
            }
            let status = sup.status();
            prop_assert_eq!(status.live, expected_live);
            if expected_live {
                prop_assert_eq!(status.session_id, last_id);
            }
        }

        sup.terminate();
        #[cfg(target_os = "linux")]
        for pid in pids.into_iter().flatten() {
            prop_assert!(common::process_gone(pid, Duration::from_secs(5)));
        }
    }
}
