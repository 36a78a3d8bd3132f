// std
use std::{
	sync::Arc,
	time::{Duration, Instant},
};
// self
use spapi_governor::{
	context::{Cancellation, Context},
	rate_limit::{DimensionKey, RateLimitManager, RateLimiter, TokenBucket},
};

#[test]
fn bucket_bursts_then_regenerates_after_sleeping() {
	let bucket = TokenBucket::new(10.0, 5).expect("Bucket fixture should be valid.");

	for _ in 0..5 {
		assert!(bucket.take().is_granted());
	}

	assert!(!bucket.take().is_granted());

	std::thread::sleep(Duration::from_millis(200));

	assert!(bucket.take().is_granted(), "About two tokens regenerate in 200ms at 10/s.");
}

#[test]
fn manager_isolates_principals_sharing_an_operation() {
	let manager = RateLimitManager::new(10.0, 5).expect("Manager fixture should be valid.");
	let s1 = DimensionKey::new("s1", "a1", "m1", "op1");
	let s2 = DimensionKey::new("s2", "a1", "m1", "op1");

	for _ in 0..5 {
		assert!(manager.allow(&s1));
	}

	assert!(!manager.allow(&s1));
	assert!(manager.allow(&s2));
	assert_eq!(manager.count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_waiters_are_paced_by_the_rate() {
	let limiter = Arc::new(RateLimiter::new(20.0, 1).expect("Limiter fixture should be valid."));
	let ctx = Context::new();
	let started = Instant::now();
	let mut tasks = Vec::new();

	for _ in 0..5 {
		let limiter = limiter.clone();
		let ctx = ctx.clone();

		tasks.push(tokio::spawn(async move { limiter.wait(&ctx).await }));
	}
	for task in tasks {
		task.await.expect("Waiter task should not panic.").expect("Waiter should be granted.");
	}

	// One token up front, then four refills at 50ms each.
	assert!(started.elapsed() >= Duration::from_millis(190));
}

#[tokio::test]
async fn cancelling_a_shared_context_releases_every_waiter() {
	let manager =
		Arc::new(RateLimitManager::new(0.01, 1).expect("Manager fixture should be valid."));
	let key = DimensionKey::new("seller", "app", "ATVPDKIKX0DER", "getOrders");
	let ctx = Context::new();

	manager.wait(&ctx, &key).await.expect("The burst token is available.");

	let waiter = {
		let manager = manager.clone();
		let key = key.clone();
		let ctx = ctx.child();

		tokio::spawn(async move { manager.wait(&ctx, &key).await })
	};

	tokio::time::sleep(Duration::from_millis(20)).await;
	ctx.cancel();

	let result = tokio::time::timeout(Duration::from_secs(1), waiter)
		.await
		.expect("Cancellation should wake the waiter promptly.")
		.expect("Waiter task should not panic.");

	assert_eq!(result, Err(Cancellation::Cancelled));
}
