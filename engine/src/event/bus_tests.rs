// bus_tests.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

use super::bus::*;
use super::event::*;
use crate::error::StreamDagError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[test]
fn test_post_event_requires_running_bus() {
    let bus = EventBus::new();
    let result = bus.post_event(Event::new(EventType::Warning, "m", "msg"));
    assert!(matches!(result, Err(StreamDagError::BusNotRunning)));
}

#[test]
fn test_watchers_run_in_registration_order() {
    let bus = Arc::new(EventBus::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    for id in 0..3 {
        let seen = Arc::clone(&seen);
        bus.add_bus_watch(move |_event: &Event| {
            seen.lock().push(id);
            EventHandleFlag::Synced
        });
    }
    assert_eq!(bus.watcher_count(), 3);

    bus.start().unwrap();
    bus.post_event(Event::new(EventType::Warning, "m", "msg"))
        .unwrap();
    assert!(wait_until(|| seen.lock().len() == 3));
    assert_eq!(*seen.lock(), vec![0, 1, 2]);
    bus.stop();
}

#[test]
fn test_intercepted_skips_later_watchers() {
    let bus = Arc::new(EventBus::new());
    let first_calls = Arc::new(Mutex::new(0));
    let later_calls = Arc::new(Mutex::new(0));
    {
        let first_calls = Arc::clone(&first_calls);
        bus.add_bus_watch(move |_event: &Event| {
            *first_calls.lock() += 1;
            EventHandleFlag::Intercepted
        });
    }
    {
        let later_calls = Arc::clone(&later_calls);
        bus.add_bus_watch(move |_event: &Event| {
            *later_calls.lock() += 1;
            EventHandleFlag::Synced
        });
    }
    bus.start().unwrap();
    bus.post_event(Event::new(EventType::Warning, "m", "first"))
        .unwrap();
    bus.post_event(Event::new(EventType::Eos, "m", "second"))
        .unwrap();
    assert!(wait_until(|| *first_calls.lock() == 2));
    bus.stop();
    assert_eq!(*later_calls.lock(), 0);
}

#[test]
fn test_stop_flag_terminates_loop() {
    let bus = Arc::new(EventBus::new());
    bus.add_bus_watch(|event: &Event| {
        if event.kind == EventType::Stop {
            EventHandleFlag::Stop
        } else {
            EventHandleFlag::Null
        }
    });
    bus.start().unwrap();
    bus.post_event(Event::new(EventType::Stop, "m", "bye")).unwrap();
    assert!(wait_until(|| !bus.is_running()));
    assert!(matches!(
        bus.post_event(Event::new(EventType::Warning, "m", "late")),
        Err(StreamDagError::BusNotRunning)
    ));
    bus.stop();
}

#[test]
fn test_restart_after_stop() {
    let bus = Arc::new(EventBus::new());
    let count = Arc::new(Mutex::new(0));
    {
        let count = Arc::clone(&count);
        bus.add_bus_watch(move |_event: &Event| {
            *count.lock() += 1;
            EventHandleFlag::Synced
        });
    }
    bus.start().unwrap();
    bus.stop();
    assert!(!bus.is_running());
    bus.start().unwrap();
    bus.post_event(Event::new(EventType::Eos, "m", "")).unwrap();
    assert!(wait_until(|| *count.lock() == 1));
    bus.stop();
}

#[test]
fn test_clear_all_watchers() {
    let bus = EventBus::new();
    bus.add_bus_watch(|_event: &Event| EventHandleFlag::Null);
    bus.add_bus_watch(|_event: &Event| EventHandleFlag::Null);
    bus.clear_all_watchers();
    assert_eq!(bus.watcher_count(), 0);
}
