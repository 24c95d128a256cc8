// queue_tests.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

use super::queue::*;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_push_and_pop_keep_fifo_order() {
    let queue = ThreadSafeQueue::new();
    for i in 0..5 {
        queue.push(i);
    }
    assert_eq!(queue.len(), 5);
    let popped: Vec<i32> = (0..5).map(|_| queue.wait_and_pop()).collect();
    assert_eq!(popped, vec![0, 1, 2, 3, 4]);
    assert!(queue.is_empty());
}

#[test]
fn test_try_pop_on_empty_queue() {
    let queue: ThreadSafeQueue<u8> = ThreadSafeQueue::new();
    assert!(queue.try_pop().is_none());
}

#[test]
fn test_wait_and_try_pop_times_out() {
    let queue: ThreadSafeQueue<u8> = ThreadSafeQueue::new();
    let start = Instant::now();
    assert!(queue.wait_and_try_pop(Duration::from_millis(30)).is_none());
    assert!(start.elapsed() >= Duration::from_millis(25));
}

#[test]
fn test_wait_and_try_pop_wakes_on_push() {
    let queue = Arc::new(ThreadSafeQueue::new());
    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            queue.push(42u32);
        })
    };
    assert_eq!(queue.wait_and_try_pop(Duration::from_secs(5)), Some(42));
    producer.join().unwrap();
}

#[test]
fn test_bounded_try_push_rejects_when_full() {
    let queue = ThreadSafeQueue::bounded(2);
    assert!(queue.try_push(1).is_ok());
    assert!(queue.try_push(2).is_ok());
    assert_eq!(queue.try_push(3), Err(3));
    assert_eq!(queue.try_pop(), Some(1));
    assert!(queue.try_push(3).is_ok());
}

#[test]
fn test_bounded_push_timeout_returns_value() {
    let queue = ThreadSafeQueue::bounded(1);
    queue.push("a");
    assert_eq!(queue.push_timeout("b", Duration::from_millis(20)), Err("b"));
    assert_eq!(queue.len(), 1);
}

#[test]
fn test_bounded_push_blocks_until_space() {
    let queue = Arc::new(ThreadSafeQueue::bounded(1));
    queue.push(1);
    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            queue.push(2);
        })
    };
    thread::sleep(Duration::from_millis(30));
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.wait_and_pop(), 1);
    producer.join().unwrap();
    assert_eq!(queue.wait_and_pop(), 2);
}

#[test]
fn test_zero_capacity_is_bumped_to_one() {
    let queue = ThreadSafeQueue::bounded(0);
    assert_eq!(queue.capacity(), Some(1));
    assert!(queue.try_push(1).is_ok());
    assert!(queue.try_push(2).is_err());
}

#[test]
fn test_clear_drops_items() {
    let queue = ThreadSafeQueue::bounded(4);
    queue.push(1);
    queue.push(2);
    assert_eq!(queue.clear(), 2);
    assert!(queue.is_empty());
}
