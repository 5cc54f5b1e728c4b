//! Integration tests for the dispatcher and observer sets
//!
//! These tests verify that:
//! - Notifications from worker threads run on the draining thread, in order
//! - Dropping a subscription stops delivery, including already queued messages
//! - run_until keeps draining while a future is pending

use std::sync::{Arc, Mutex};
use std::thread;
use steampipe::dispatch::DEFAULT_TICK;
use steampipe::{Dispatcher, ObserverSet};
use tokio::time::{Duration, sleep};

#[test]
fn test_worker_notifications_run_on_consumer_thread() {
    let dispatcher = Dispatcher::new();
    let observers = ObserverSet::new();
    let consumer = thread::current().id();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _sub = observers.subscribe(move |line| {
        assert_eq!(thread::current().id(), consumer);
        sink.lock().unwrap().push(line.to_string());
    });

    let handle = dispatcher.handle();
    let producer_set = observers.clone();
    thread::spawn(move || {
        for i in 0..50 {
            assert!(producer_set.dispatch(&handle, format!("line {}", i)));
        }
    })
    .join()
    .unwrap();

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(dispatcher.drain(), 50);

    let expected: Vec<String> = (0..50).map(|i| format!("line {}", i)).collect();
    assert_eq!(*seen.lock().unwrap(), expected);
}

#[test]
fn test_dropped_subscription_misses_queued_messages() {
    let dispatcher = Dispatcher::new();
    let observers = ObserverSet::new();
    let handle = dispatcher.handle();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let kept_sink = seen.clone();
    let dropped_sink = seen.clone();
    let _kept = observers.subscribe(move |line| kept_sink.lock().unwrap().push(format!("kept {}", line)));
    let dropped =
        observers.subscribe(move |line| dropped_sink.lock().unwrap().push(format!("dropped {}", line)));

    observers.dispatch(&handle, "a");
    dropped.unsubscribe();
    observers.dispatch(&handle, "b");
    dispatcher.drain();

    assert_eq!(*seen.lock().unwrap(), vec!["kept a", "kept b"]);
    assert_eq!(observers.len(), 1);
}

#[test]
fn test_handle_outliving_dispatcher() {
    let observers = ObserverSet::new();
    let calls = Arc::new(Mutex::new(0));
    let sink = calls.clone();
    let _sub = observers.subscribe(move |_| *sink.lock().unwrap() += 1);

    let handle = {
        let dispatcher = Dispatcher::new();
        dispatcher.handle()
    };

    assert!(!handle.is_connected());
    assert!(!observers.dispatch(&handle, "late"));
    assert_eq!(*calls.lock().unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_until_drains_while_pending() {
    let dispatcher = Dispatcher::new();
    let observers = ObserverSet::new();
    let handle = dispatcher.handle();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _sub = observers.subscribe(move |line| sink.lock().unwrap().push(line.to_string()));

    let producer_set = observers.clone();
    let producer = tokio::spawn(async move {
        for i in 0..5 {
            producer_set.dispatch(&handle, format!("tick {}", i));
            sleep(Duration::from_millis(5)).await;
        }
    });

    let observed = seen.clone();
    let delivered_midway = dispatcher
        .run_until(
            async move {
                producer.await.unwrap();
                sleep(DEFAULT_TICK * 3).await;
                observed.lock().unwrap().len()
            },
            DEFAULT_TICK,
        )
        .await;

    // everything was delivered by ticks before the future finished
    assert_eq!(delivered_midway, 5);
    assert_eq!(dispatcher.pending(), 0);
    assert_eq!(seen.lock().unwrap().len(), 5);
}

#[test]
fn test_run_until_with_block_on() {
    let dispatcher = Dispatcher::new();
    let handle = dispatcher.handle();
    let order = Arc::new(Mutex::new(Vec::new()));

    let inner = order.clone();
    let output = tokio_test::block_on(dispatcher.run_until(
        async move {
            let record = inner.clone();
            handle.enqueue(move || record.lock().unwrap().push("callback"));
            inner.lock().unwrap().push("future");
            42
        },
        DEFAULT_TICK,
    ));

    assert_eq!(output, 42);
    assert_eq!(*order.lock().unwrap(), vec!["future", "callback"]);
}
