mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::manager;
use redstash::CacheError;

const LOCK_TTL: Duration = Duration::from_secs(10);

#[tokio::test(start_paused = true)]
async fn test_critical_sections_never_overlap() {
    let (cache, _) = manager();
    let concurrent = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let mut holders = Vec::new();
    for _ in 0..4 {
        let cache = cache.clone();
        let concurrent = Arc::clone(&concurrent);
        let overlaps = Arc::clone(&overlaps);
        holders.push(tokio::spawn(async move {
            cache
                .with_lock("reports:rebuild", LOCK_TTL, true, || async move {
                    if concurrent.fetch_add(1, Ordering::SeqCst) > 0 {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    tokio::time::sleep(Duration::from_millis(150)).await;
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
        }));
    }

    for holder in holders {
        let result = holder.await.unwrap().unwrap();
        assert_eq!(result, Some(()));
    }
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_non_blocking_acquire_returns_none_when_held() {
    let (cache, _) = manager();

    let holder = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .with_lock("reports:rebuild", LOCK_TTL, true, || async {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    Ok(())
                })
                .await
        })
    };
    // Let the holder take the lock.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let refused: Option<()> = cache
        .with_lock("reports:rebuild", LOCK_TTL, false, || async { Ok(()) })
        .await
        .unwrap();
    assert_eq!(refused, None);

    holder.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_blocking_acquire_times_out() {
    let (cache, _) = manager();

    let holder = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .with_lock("reports:rebuild", Duration::from_secs(30), true, || async {
                    tokio::time::sleep(Duration::from_secs(20)).await;
                    Ok(())
                })
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result: Result<Option<()>, _> = cache
        .with_lock("reports:rebuild", Duration::from_secs(2), true, || async { Ok(()) })
        .await;
    assert!(matches!(result, Err(CacheError::LockTimeout { .. })));

    holder.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_nested_acquisition_fails_fast() {
    let (cache, _) = manager();

    let result: Result<Option<()>, _> = cache
        .with_lock("reports:rebuild", LOCK_TTL, true, || {
            let cache = cache.clone();
            async move {
                let nested: Result<Option<()>, _> = cache
                    .with_lock("reports:rebuild", LOCK_TTL, true, || async { Ok(()) })
                    .await;
                assert!(matches!(nested, Err(CacheError::NestedLock { .. })));
                Ok(())
            }
        })
        .await;
    assert_eq!(result.unwrap(), Some(()));
}

#[tokio::test]
async fn test_different_resources_nest_fine() {
    let (cache, _) = manager();

    let result: Result<Option<u32>, _> = cache
        .with_lock("reports:rebuild", LOCK_TTL, true, || {
            let cache = cache.clone();
            async move {
                let inner = cache
                    .with_lock("reports:export", LOCK_TTL, true, || async { Ok(41) })
                    .await?;
                Ok(inner.unwrap_or(0) + 1)
            }
        })
        .await;
    assert_eq!(result.unwrap(), Some(42));
}

#[tokio::test]
async fn test_lock_released_after_func_error() {
    let (cache, _) = manager();

    let failed: Result<Option<()>, _> = cache
        .with_lock("reports:rebuild", LOCK_TTL, true, || async {
            Err(CacheError::from(redstash::StoreError::Script(
                "boom".into(),
            )))
        })
        .await;
    assert!(failed.is_err());

    // The failed call released its hold: a non-blocking retry acquires.
    let retry: Option<()> = cache
        .with_lock("reports:rebuild", LOCK_TTL, false, || async { Ok(()) })
        .await
        .unwrap();
    assert_eq!(retry, Some(()));
}

#[tokio::test]
async fn test_func_result_is_returned() {
    let (cache, _) = manager();
    let result = cache
        .with_lock("reports:rebuild", LOCK_TTL, true, || async { Ok("done") })
        .await
        .unwrap();
    assert_eq!(result, Some("done"));
}
