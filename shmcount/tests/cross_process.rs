//! Multi-process tests.
//!
//! Uses `fork()` so attachers really are different processes with different
//! pids:
//! - creator bookkeeping follows the pid that drove the count from 0 to 1
//! - only one of several processes racing a fresh segment becomes creator
//! - concurrent attaches from many processes see distinct initial counts
//! - user data written by one process is read back by another

use shmcount::{CounterConfig, NO_CREATOR_PID, SegmentDiscovery, SharedCounter};
use std::mem::ManuallyDrop;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn config(dir: &TempDir) -> CounterConfig {
    CounterConfig {
        shm_dir: dir.path().to_path_buf(),
        ..CounterConfig::default()
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    false
}

/// Run `body` in a forked child and return the child's pid.
///
/// The child exits with 0 if `body` succeeds, 1 otherwise; it never
/// returns into the test harness.
fn spawn_child(body: impl FnOnce() -> Result<(), String>) -> libc::pid_t {
    // Safety: fork() is unsafe but this is a controlled test environment.
    let pid = unsafe { libc::fork() };
    if pid == 0 {
        let code = match body() {
            Ok(()) => 0,
            Err(msg) => {
                eprintln!("child failed: {msg}");
                1
            }
        };
        std::process::exit(code);
    }
    assert!(pid > 0, "fork failed");
    pid
}

fn wait_child(pid: libc::pid_t) -> bool {
    let mut status: libc::c_int = 0;
    unsafe {
        libc::waitpid(pid, &mut status, 0);
    }
    libc::WIFEXITED(status) && libc::WEXITSTATUS(status) == 0
}

/// Test: a non-creator process detaching leaves the creator in place.
#[test]
fn cross_process_non_creator_detach_keeps_creator() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let parent_pid = std::process::id();

    let counter = SharedCounter::create_with("keep_creator", &config).expect("parent: create");
    assert_eq!(counter.creator_pid().unwrap(), parent_pid);

    let child_config = config.clone();
    let child = spawn_child(move || {
        let counter = SharedCounter::create_with("keep_creator", &child_config)
            .map_err(|e| e.to_string())?;
        if counter.initial_count() != 1 {
            return Err(format!("initial count {}", counter.initial_count()));
        }
        let creator = counter.creator_pid().map_err(|e| e.to_string())?;
        if creator != parent_pid {
            return Err(format!("creator {creator}, expected {parent_pid}"));
        }
        counter.close().map_err(|e| e.to_string())
    });

    assert!(wait_child(child), "child should attach as non-creator");
    assert_eq!(counter.creator_pid().unwrap(), parent_pid);
    assert_eq!(counter.instance_count().unwrap(), 1);
}

/// Test: the creator process detaching resets creator to the sentinel.
#[test]
fn cross_process_creator_detach_resets_sentinel() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);

    let child_config = config.clone();
    let child = spawn_child(move || {
        let counter =
            SharedCounter::create_with("reset_creator", &child_config).map_err(|e| e.to_string())?;
        if !counter.is_creator().map_err(|e| e.to_string())? {
            return Err("child should be creator".to_string());
        }
        // Stay attached until the parent joins.
        let joined = wait_until(Duration::from_secs(5), || {
            counter.instance_count().map(|n| n >= 2).unwrap_or(false)
        });
        if !joined {
            return Err("parent never attached".to_string());
        }
        counter.close().map_err(|e| e.to_string())
    });

    let discovery = SegmentDiscovery::new(config.clone());
    assert!(
        wait_until(Duration::from_secs(5), || {
            matches!(discovery.find_segment("reset_creator"), Ok(Some(info)) if info.instance_count >= 1)
        }),
        "timeout waiting for child to create segment"
    );

    let counter = SharedCounter::create_with("reset_creator", &config).expect("parent: attach");
    assert_eq!(counter.initial_count(), 1);
    assert_eq!(counter.creator_pid().unwrap(), child as u32);
    assert!(!counter.is_creator().unwrap());

    assert!(wait_child(child), "child should exit cleanly");
    assert_eq!(counter.creator_pid().unwrap(), NO_CREATOR_PID);
    assert_eq!(counter.instance_count().unwrap(), 1);
}

/// Test: concurrent attaches from many processes get distinct initial counts.
///
/// Each child marks slot `initial_count` in the user data; a duplicate
/// initial count shows up as a slot marked twice.
#[test]
fn cross_process_concurrent_attach_counts() {
    const CHILDREN: usize = 8;

    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let observer = SharedCounter::create_with("proc_race", &config).expect("parent: create");

    let children: Vec<_> = (0..CHILDREN)
        .map(|_| {
            let child_config = config.clone();
            spawn_child(move || {
                let counter = SharedCounter::create_with("proc_race", &child_config)
                    .map_err(|e| e.to_string())?;
                let slot = counter.initial_count() as usize;

                let guard = counter.lock().map_err(|e| e.to_string())?;
                let mut mark = [0u8; 1];
                guard.read_user_data(slot, &mut mark).map_err(|e| e.to_string())?;
                guard
                    .write_user_data(slot, &[mark[0] + 1])
                    .map_err(|e| e.to_string())?;
                guard.unlock().map_err(|e| e.to_string())?;

                // Hold the attachment until every child is in.
                let all_in = wait_until(Duration::from_secs(5), || {
                    counter
                        .instance_count()
                        .map(|n| n as usize == CHILDREN + 1)
                        .unwrap_or(false)
                });
                if !all_in {
                    return Err("not every child attached".to_string());
                }
                counter.close().map_err(|e| e.to_string())
            })
        })
        .collect();

    for child in children {
        assert!(wait_child(child), "child should exit cleanly");
    }

    let guard = observer.lock().unwrap();
    let mut marks = [0u8; CHILDREN + 1];
    guard.read_user_data(0, &mut marks).unwrap();
    guard.unlock().unwrap();

    assert_eq!(marks[0], 0, "slot 0 belongs to the observer");
    assert!(marks[1..].iter().all(|&m| m == 1), "marks: {marks:?}");
    assert_eq!(observer.instance_count().unwrap(), 1);
    assert_eq!(observer.creator_pid().unwrap(), std::process::id());
}

/// Test: user data written in one process is visible in another.
#[test]
fn cross_process_user_data_round_trip() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let payload = b"written by the child process";

    let counter = SharedCounter::create_with("proc_payload", &config).expect("parent: create");

    let child_config = config.clone();
    let child = spawn_child(move || {
        let counter = SharedCounter::create_with("proc_payload", &child_config)
            .map_err(|e| e.to_string())?;
        let guard = counter.lock().map_err(|e| e.to_string())?;
        guard.write_user_data(0, payload).map_err(|e| e.to_string())?;
        guard.unlock().map_err(|e| e.to_string())?;
        counter.close().map_err(|e| e.to_string())
    });
    assert!(wait_child(child), "child should exit cleanly");

    let guard = counter.lock().unwrap();
    let mut buf = vec![0u8; payload.len()];
    guard.read_user_data(0, &mut buf).unwrap();
    guard.unlock().unwrap();
    assert_eq!(&buf, payload);
}

/// Test: exactly one of many processes racing a fresh segment becomes creator.
///
/// Each child writes a record into the slot given by its initial count:
/// byte 0 is `1 + is_creator`, bytes 8..16 the creation time it observed.
#[test]
fn cross_process_single_creator_among_racing_attaches() {
    const CHILDREN: usize = 6;
    const RECORD: usize = 16;

    let dir = TempDir::new().unwrap();
    let config = CounterConfig {
        remove_on_last_detach: false,
        ..config(&dir)
    };

    let children: Vec<_> = (0..CHILDREN)
        .map(|_| {
            let child_config = config.clone();
            spawn_child(move || {
                let counter = SharedCounter::create_with("creator_race", &child_config)
                    .map_err(|e| e.to_string())?;
                let is_creator = counter.is_creator().map_err(|e| e.to_string())?;
                let created = counter.creation_time().map_err(|e| e.to_string())?;

                let mut record = [0u8; RECORD];
                record[0] = 1 + u8::from(is_creator);
                record[8..].copy_from_slice(&created.to_le_bytes());
                let offset = counter.initial_count() as usize * RECORD;
                let guard = counter.lock().map_err(|e| e.to_string())?;
                guard
                    .write_user_data(offset, &record)
                    .map_err(|e| e.to_string())?;
                guard.unlock().map_err(|e| e.to_string())?;

                // Nobody leaves before everyone is in, so the count never returns to 0.
                let all_in = wait_until(Duration::from_secs(5), || {
                    counter
                        .instance_count()
                        .map(|n| n as usize == CHILDREN)
                        .unwrap_or(false)
                });
                if !all_in {
                    return Err("not every child attached".to_string());
                }
                counter.close().map_err(|e| e.to_string())
            })
        })
        .collect();

    for child in children {
        assert!(wait_child(child), "child should exit cleanly");
    }

    let reader = SharedCounter::create_with("creator_race", &config).expect("parent: attach");
    let mut records = [0u8; CHILDREN * RECORD];
    let guard = reader.lock().unwrap();
    guard.read_user_data(0, &mut records).unwrap();
    guard.unlock().unwrap();

    let records: Vec<_> = records.chunks(RECORD).collect();
    assert!(records.iter().all(|r| r[0] != 0), "every slot written once");
    let creators: Vec<_> = (0..CHILDREN).filter(|&i| records[i][0] == 2).collect();
    assert_eq!(creators, vec![0], "only the first attach is creator");

    let created: Vec<f64> = records
        .iter()
        .map(|r| f64::from_le_bytes(r[8..].try_into().unwrap()))
        .collect();
    assert!(created.iter().all(|&t| t == created[0] && t > 0.0));
}

/// Test: a detach performed by a forked child does not clear the parent as creator.
#[test]
fn cross_process_inherited_instance_detach_in_child() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let parent_pid = std::process::id();

    let counter = SharedCounter::create_with("inherited", &config).expect("parent: create");
    let _keeper = SharedCounter::create_with("inherited", &config).expect("parent: second");

    // Only the child may detach this instance; the parent's copy is leaked.
    let counter = ManuallyDrop::new(counter);
    let child = spawn_child(move || {
        ManuallyDrop::into_inner(counter)
            .close()
            .map_err(|e| e.to_string())
    });
    assert!(wait_child(child), "child should exit cleanly");

    let observer = SharedCounter::create_with("inherited", &config).expect("parent: observe");
    assert_eq!(observer.creator_pid().unwrap(), parent_pid);
    assert_eq!(observer.instance_count().unwrap(), 2);
}
