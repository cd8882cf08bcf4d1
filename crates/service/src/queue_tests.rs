// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use lf_adapters::MemoryQueueBackend;
use lf_core::FakeClock;

fn backend() -> MemoryQueueBackend<FakeClock> {
    MemoryQueueBackend::new(FakeClock::new())
}

fn options(name: &str, owned: bool) -> QueueOptions {
    QueueOptions {
        name: name.to_string(),
        visibility_timeout_sec: 30,
        owned,
        auto_create: true,
    }
}

#[tokio::test]
async fn open_creates_owned_queue() {
    let backend = backend();
    let queue = WorkQueue::open(backend.clone(), options("work", true)).await.unwrap();
    assert_eq!(queue.name(), "work");
    assert_eq!(queue.visibility_timeout_sec(), 30);
    assert!(backend.queue_exists("work").await.unwrap());
}

#[tokio::test]
async fn open_unowned_absent_queue_fails() {
    let result = WorkQueue::open(backend(), options("work", false)).await;
    assert!(matches!(result, Err(ServiceError::QueueNotFound(name)) if name == "work"));
}

#[tokio::test]
async fn open_owned_without_auto_create_fails() {
    let mut opts = options("work", true);
    opts.auto_create = false;
    let result = WorkQueue::open(backend(), opts).await;
    assert!(matches!(result, Err(ServiceError::QueueNotFound(_))));
}

#[tokio::test]
async fn open_owned_updates_visibility_timeout() {
    let backend = backend();
    backend.create_queue("work", 120, false).await.unwrap();
    let queue = WorkQueue::open(backend.clone(), options("work", true)).await.unwrap();
    assert_eq!(queue.visibility_timeout_sec(), 30);
    assert_eq!(backend.visibility_timeout("work").await.unwrap(), 30);
}

#[tokio::test]
async fn open_unowned_adopts_existing_timeout() {
    let backend = backend();
    backend.create_queue("work", 120, false).await.unwrap();
    let queue = WorkQueue::open(backend, options("work", false)).await.unwrap();
    assert_eq!(queue.visibility_timeout_sec(), 120);
}

#[tokio::test]
async fn fifo_detection_and_group_id() {
    let backend = backend();
    let queue = WorkQueue::open(backend.clone(), options("work.fifo", true)).await.unwrap();
    // Send succeeds because the adapter supplies the fixed group id.
    queue.enqueue("payload").await.unwrap();
    let received = queue
        .dequeue(1, std::time::Duration::ZERO, None)
        .await
        .unwrap();
    assert_eq!(received.len(), 1);
}

#[tokio::test]
async fn extend_visibility_uses_queue_timeout() {
    let clock = FakeClock::new();
    let backend = MemoryQueueBackend::new(clock.clone());
    let queue = WorkQueue::open(backend, options("work", true)).await.unwrap();
    queue.enqueue("m").await.unwrap();

    let received = queue.dequeue(1, std::time::Duration::ZERO, None).await.unwrap();
    clock.advance(std::time::Duration::from_secs(25));
    queue.extend_visibility(&received[0].receipt_handle).await.unwrap();
    clock.advance(std::time::Duration::from_secs(20));
    // 45s since receipt but only 20s since extension: still leased.
    assert!(queue.dequeue(1, std::time::Duration::ZERO, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_queue_refused_when_unowned() {
    let backend = backend();
    backend.create_queue("work", 30, false).await.unwrap();
    let queue = WorkQueue::open(backend, options("work", false)).await.unwrap();
    assert!(matches!(queue.delete_queue().await, Err(ServiceError::InvalidConfig(_))));
}

#[tokio::test]
async fn delete_queue_when_owned() {
    let backend = backend();
    let queue = WorkQueue::open(backend.clone(), options("work", true)).await.unwrap();
    queue.delete_queue().await.unwrap();
    assert!(!backend.queue_exists("work").await.unwrap());
}

#[tokio::test]
async fn size_estimate_counts_invisible() {
    let backend = backend();
    let queue = WorkQueue::open(backend, options("work", true)).await.unwrap();
    queue.enqueue("a").await.unwrap();
    queue.enqueue("b").await.unwrap();
    queue.dequeue(1, std::time::Duration::ZERO, None).await.unwrap();
    assert_eq!(queue.size_estimate(false).await.unwrap(), 1);
    assert_eq!(queue.size_estimate(true).await.unwrap(), 2);
}
