//! Concurrent allocation against a file-backed database.

mod common;

use std::collections::{HashMap, HashSet};

use common::{date, new_series, TempDb};
use ornum_core::GenerationMethod;
use ornum_db::AllocatorConfig;

const USERS: [&str; 2] = ["cashier-a", "cashier-b"];
const TASKS_PER_USER: usize = 4;
const ALLOCATIONS_PER_TASK: usize = 10;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_users_never_share_a_number() {
    let temp = TempDb::new(4).await;
    let series = temp.db.series().create(new_series(None)).await.unwrap();
    let allocator = temp
        .db
        .allocator(AllocatorConfig::default().max_retries(10));
    let d = date(2025, 7, 1);

    let mut handles = Vec::new();
    for user in USERS {
        for _ in 0..TASKS_PER_USER {
            let allocator = allocator.clone();
            let series_id = series.id.clone();
            handles.push(tokio::spawn(async move {
                let mut raws = Vec::new();
                for _ in 0..ALLOCATIONS_PER_TASK {
                    let n = allocator
                        .allocate(&series_id, user, d, GenerationMethod::Automatic)
                        .await
                        .unwrap();
                    raws.push(n.actual_number);
                }
                (user, raws)
            }));
        }
    }

    let mut by_user: HashMap<&str, Vec<i64>> = HashMap::new();
    for handle in handles {
        let (user, raws) = handle.await.unwrap();
        by_user.entry(user).or_default().extend(raws);
    }

    let per_user = TASKS_PER_USER * ALLOCATIONS_PER_TASK;
    let mut all = HashSet::new();
    for raws in by_user.values_mut() {
        raws.sort_unstable();
        assert_eq!(raws.len(), per_user);
        // Contiguous within the user's band
        assert_eq!(raws[per_user - 1] - raws[0], per_user as i64 - 1);
        all.extend(raws.iter().copied());
    }
    assert_eq!(all.len(), USERS.len() * per_user);

    let stored = temp.db.series().require(&series.id).await.unwrap();
    assert_eq!(stored.current_number, (USERS.len() * per_user) as i64);

    let counts = temp
        .db
        .issued_numbers()
        .count_by_status(&series.id)
        .await
        .unwrap();
    assert_eq!(counts.generated, (USERS.len() * per_user) as i64);

    temp.db.close().await;
}
