//! Coordinated rate limiting against a live counter service

use std::sync::Arc;
use weather_gateway::clock::{ManualClock, SharedClock};
use weather_gateway::ratelimit::service::{
    CounterService, SqliteCounterStore, create_counter_routes,
};
use weather_gateway::ratelimit::{CoordinatedRateLimiter, RateLimiter};

/// Serve the counter routes on an ephemeral port and return the base URL
async fn spawn_counter_service(clock: ManualClock) -> String {
    let store = Arc::new(SqliteCounterStore::new("sqlite::memory:").await.unwrap());
    let clock: SharedClock = Arc::new(clock);
    let service = Arc::new(CounterService::new(store, clock));
    let app = create_counter_routes(service);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_coordinated_limit_shared_across_gateways() {
    let clock = ManualClock::starting_now();
    let url = spawn_counter_service(clock.clone()).await;

    // Two gateway instances share one counter service
    let first = CoordinatedRateLimiter::new(url.clone(), 2_000).unwrap();
    let second = CoordinatedRateLimiter::new(url, 2_000).unwrap();
    assert_eq!(first.backend(), "coordinated");

    for i in 0..10 {
        let limiter = if i % 2 == 0 { &first } else { &second };
        assert!(limiter.check_and_consume("ip:203.0.113.7", 10).await);
    }
    assert!(!first.check_and_consume("ip:203.0.113.7", 10).await);
    assert!(!second.check_and_consume("ip:203.0.113.7", 10).await);

    // Other keys are unaffected
    assert!(first.check_and_consume("client:ios-app", 10).await);

    clock.advance_secs(60);
    assert!(second.check_and_consume("ip:203.0.113.7", 10).await);
}

#[tokio::test]
async fn test_concurrent_checks_never_exceed_limit() {
    let url = spawn_counter_service(ManualClock::starting_now()).await;
    let limiter = Arc::new(CoordinatedRateLimiter::new(url, 2_000).unwrap());

    let mut handles = Vec::new();
    for _ in 0..30 {
        let limiter = Arc::clone(&limiter);
        handles.push(tokio::spawn(async move {
            limiter.check_and_consume("client:web", 10).await
        }));
    }

    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 10);
}
