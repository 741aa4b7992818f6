//! Limiters shared across threads.

use std::sync::Arc;
use std::thread;

use tollgate::ratelimit::{evaluate_all, Check, LimiterConfig, ManualClock, RateLimiter};

const THREADS: usize = 8;
const PER_THREAD: usize = 250;

fn shared(max_requests: u64) -> Arc<RateLimiter> {
    let clock = ManualClock::new(0);
    let limiter =
        RateLimiter::with_clock(LimiterConfig::new(60_000, max_requests), Arc::new(clock)).unwrap();
    Arc::new(limiter)
}

#[test]
fn racing_consumes_are_never_lost() {
    let limiter = shared(10_000);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            thread::spawn(move || {
                for _ in 0..PER_THREAD {
                    limiter.consume("ip-1");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let spent = (THREADS * PER_THREAD) as u64;
    assert_eq!(limiter.inspect("ip-1").remaining, 10_000 - spent);
}

#[test]
fn exactly_max_requests_admitted_under_contention() {
    let limiter = shared(100);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            thread::spawn(move || {
                (0..PER_THREAD)
                    .filter(|_| limiter.consume("shared").allowed)
                    .count()
            })
        })
        .collect();
    let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(admitted, 100);
}

#[test]
fn compound_checks_charge_every_limiter_concurrently() {
    let per_ip = shared(1_000_000);
    let per_account = shared(1_000_000);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let per_ip = Arc::clone(&per_ip);
            let per_account = Arc::clone(&per_account);
            thread::spawn(move || {
                let account = format!("email:user{}", t % 2);
                for _ in 0..PER_THREAD {
                    evaluate_all(&[
                        Check::new(&per_ip, "ip:10.0.0.1"),
                        Check::new(&per_account, &account),
                    ]);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let total = (THREADS * PER_THREAD) as u64;
    assert_eq!(per_ip.inspect("ip:10.0.0.1").remaining, 1_000_000 - total);
    assert_eq!(per_account.inspect("email:user0").remaining, 1_000_000 - total / 2);
    assert_eq!(per_account.inspect("email:user1").remaining, 1_000_000 - total / 2);
}
