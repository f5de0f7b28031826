#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{job, names, wait_until};
use spooler::{Job, JobQueue};

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn snapshot_is_sorted_by_priority_then_arrival() -> Result<(), Box<dyn Error>> {
    let queue = JobQueue::new(10)?;
    for (name, priority) in [("a", 3), ("b", 1), ("c", 3), ("d", -2), ("e", 1), ("f", 3)] {
        queue.enqueue(job(name, priority))?;
    }

    let snapshot = queue.snapshot();
    assert_eq!(names(&snapshot), ["d", "b", "e", "a", "c", "f"]);

    let drained: Vec<String> = std::iter::from_fn(|| queue.try_dequeue())
        .map(|j| j.name().to_string())
        .collect();
    assert_eq!(drained, ["d", "b", "e", "a", "c", "f"]);
    Ok(())
}

#[test]
fn full_queue_blocks_producer_until_dequeue() -> Result<(), Box<dyn Error>> {
    let queue = Arc::new(JobQueue::new(2)?);
    queue.enqueue(job("a", 5))?;
    queue.enqueue(job("b", 1))?;

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.enqueue(job("c", 5)))
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!producer.is_finished());
    assert_eq!(queue.len(), 2);

    let head = queue.dequeue();
    assert_eq!(head.name(), "b");
    producer.join().map_err(|_| "producer panicked")??;

    assert_eq!(names(&queue.snapshot()), ["a", "c"]);
    Ok(())
}

#[test]
fn capacity_two_scenario_serves_b_then_a_then_c() -> Result<(), Box<dyn Error>> {
    let queue = Arc::new(JobQueue::new(2)?);
    queue.enqueue(job("A", 5))?;
    queue.enqueue(job("B", 1))?;

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.enqueue(job("C", 5)))
    };

    thread::sleep(Duration::from_millis(50));
    assert_eq!(names(&queue.snapshot()), ["B", "A"]);

    let mut served = vec![queue.dequeue().name().to_string()];
    producer.join().map_err(|_| "producer panicked")??;
    assert_eq!(names(&queue.snapshot()), ["A", "C"]);

    served.extend(std::iter::from_fn(|| queue.try_dequeue()).map(|j| j.name().to_string()));
    assert_eq!(served, ["B", "A", "C"]);
    Ok(())
}

#[test]
fn many_producers_all_complete_with_concurrent_consumer() -> Result<(), Box<dyn Error>> {
    const PRODUCERS: usize = 32;
    let queue = Arc::new(JobQueue::new(3)?);

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|i| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.enqueue(job(&format!("job-{i}"), (i % 4) as i32)))
        })
        .collect();

    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let mut seen = Vec::with_capacity(PRODUCERS);
            for _ in 0..PRODUCERS {
                assert!(queue.len() <= queue.capacity());
                seen.push(queue.dequeue());
            }
            seen
        })
    };

    for producer in producers {
        producer.join().map_err(|_| "producer panicked")??;
    }
    let seen: Vec<Job> = consumer.join().map_err(|_| "consumer panicked")?;

    assert_eq!(seen.len(), PRODUCERS);
    assert!(queue.is_empty());
    Ok(())
}

#[test]
fn clear_releases_blocked_producers() -> Result<(), Box<dyn Error>> {
    let queue = Arc::new(JobQueue::new(1)?);
    queue.enqueue(job("resident", 1))?;

    let producers: Vec<_> = (0..3)
        .map(|i| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.enqueue(job(&format!("p{i}"), i)))
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    // Each clear frees exactly one slot at capacity 1.
    assert!(wait_until(WAIT, || {
        queue.clear();
        producers.iter().all(|p| p.is_finished())
    }));
    for producer in producers {
        producer.join().map_err(|_| "producer panicked")??;
    }
    assert!(queue.len() <= 1);
    Ok(())
}

#[test]
fn consumer_blocks_until_job_arrives() -> Result<(), Box<dyn Error>> {
    let queue = Arc::new(JobQueue::new(2)?);
    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.dequeue())
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!consumer.is_finished());

    queue.enqueue(job("late", 0))?;
    let got = consumer.join().map_err(|_| "consumer panicked")?;
    assert_eq!(got.name(), "late");
    Ok(())
}

#[test]
fn snapshot_never_sees_unsorted_state_under_contention() -> Result<(), Box<dyn Error>> {
    let queue = Arc::new(JobQueue::new(8)?);

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || -> Result<(), spooler::QueueError> {
                for i in 0..50 {
                    queue.enqueue(job(&format!("{p}-{i}"), (i * 7 + p) % 5))?;
                }
                Ok(())
            })
        })
        .collect();

    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for _ in 0..200 {
                let _ = queue.dequeue();
            }
        })
    };

    while !consumer.is_finished() {
        let snapshot = queue.snapshot();
        assert!(snapshot.len() <= 8);
        assert!(snapshot.windows(2).all(|w| w[0].priority() <= w[1].priority()));
    }

    for producer in producers {
        producer.join().map_err(|_| "producer panicked")??;
    }
    consumer.join().map_err(|_| "consumer panicked")?;
    Ok(())
}
