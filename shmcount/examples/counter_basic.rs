//! Basic usage example for shmcount
//! Several "instances" attach to one counter and publish a status record
//!
//! Attach, detach and creator changes are logged at debug level on stderr;
//! set `RUST_LOG` to override the default `shmcount=debug` filter.

use serde::{Deserialize, Serialize};
use shmcount::{NO_CREATOR_PID, SharedCounter, ShmResult};
use std::thread;
use std::time::Duration;

const IDENTIFIER: &str = "Example\\Render Farm";

#[derive(Debug, Serialize, Deserialize)]
struct Status {
    leader_pid: u32,
    jobs_done: u64,
}

/// Length-prefixed JSON at the start of the user data
fn publish(counter: &SharedCounter, status: &Status) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = serde_json::to_vec(status)?;
    let guard = counter.lock()?;
    guard.write_user_data(0, &(bytes.len() as u32).to_le_bytes())?;
    guard.write_user_data(4, &bytes)?;
    guard.unlock()?;
    Ok(())
}

fn fetch(counter: &SharedCounter) -> Result<Option<Status>, Box<dyn std::error::Error>> {
    let guard = counter.lock()?;
    let mut len = [0u8; 4];
    guard.read_user_data(0, &mut len)?;
    let len = u32::from_le_bytes(len) as usize;
    if len == 0 {
        guard.unlock()?;
        return Ok(None);
    }
    let mut bytes = vec![0u8; len];
    guard.read_user_data(4, &mut bytes)?;
    guard.unlock()?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}

fn worker(id: usize) -> ShmResult<()> {
    let counter = SharedCounter::create(IDENTIFIER)?;
    println!(
        "Worker {}: attached as instance #{} ({} live)",
        id,
        counter.initial_count() + 1,
        counter.instance_count()?
    );

    thread::sleep(Duration::from_millis(200));
    match fetch(&counter) {
        Ok(Some(status)) => println!(
            "Worker {}: leader is pid {} after {} jobs",
            id, status.leader_pid, status.jobs_done
        ),
        Ok(None) => println!("Worker {}: no status yet", id),
        Err(e) => println!("Worker {}: read error: {}", id, e),
    }

    counter.close()
}

fn main() -> ShmResult<()> {
    shmcount::init_tracing("shmcount=debug");

    let observer = SharedCounter::create(IDENTIFIER)?;
    println!(
        "Segment {} created by pid {}",
        observer.identifier(),
        observer.creator_pid()?
    );
    if observer.initial_count() == 0 {
        let status = Status {
            leader_pid: std::process::id(),
            jobs_done: 0,
        };
        if let Err(e) = publish(&observer, &status) {
            println!("Publish failed: {}", e);
        }
    }

    let handles: Vec<_> = (1..=3)
        .map(|id| {
            thread::Builder::new()
                .name(format!("worker-{id}"))
                .spawn(move || worker(id))
                .expect("spawn worker thread")
        })
        .collect();
    for handle in handles {
        if let Ok(Err(e)) = handle.join() {
            println!("Worker failed: {}", e);
        }
    }

    println!("Live instances after workers: {}", observer.instance_count()?);
    // Workers share this pid, so their detach clears the creator too.
    if observer.creator_pid()? == NO_CREATOR_PID {
        println!("Creator has detached");
    }
    observer.close()
}
