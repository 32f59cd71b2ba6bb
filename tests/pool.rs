//! Integration tests for the file-backed credential pool under concurrency.
//!
//! Writers run on the blocking pool the same way the admin routes do, while
//! readers list the store continuously and check that no torn line is ever
//! observed.

use std::sync::Arc;

use credgate::pool::CredentialPool;

fn token(i: usize) -> String {
    format!("cred-{:03}-{}", i, "z".repeat(i % 17))
}

fn is_known_token(line: &str) -> bool {
    line.strip_prefix("cred-")
        .and_then(|rest| rest.get(..3))
        .and_then(|index| index.parse::<usize>().ok())
        .is_some_and(|i| line == token(i))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_with_readers() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("token.txt");
    std::fs::write(&store, "").unwrap();
    let pool = Arc::new(CredentialPool::load(&store, &store).unwrap());
    let n = 100;

    let writers: Vec<_> = (0..n)
        .map(|i| {
            let pool = pool.clone();
            tokio::task::spawn_blocking(move || pool.append(&token(i)))
        })
        .collect();

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            tokio::task::spawn_blocking(move || {
                for _ in 0..25 {
                    let content = pool.list().unwrap();
                    assert!(content.is_empty() || content.ends_with('\n'));
                    assert!(content.lines().all(is_known_token), "torn line in {:?}", content);
                    let snapshot = pool.snapshot();
                    assert!(snapshot.iter().all(|c| is_known_token(c.expose_secret())));
                }
            })
        })
        .collect();

    for writer in writers {
        writer.await.unwrap().unwrap();
    }
    for reader in readers {
        reader.await.unwrap();
    }

    let content = pool.list().unwrap();
    let mut lines: Vec<&str> = content.lines().collect();
    lines.sort();
    let mut expected: Vec<String> = (0..n).map(token).collect();
    expected.sort();
    assert_eq!(lines, expected);
    assert_eq!(pool.len(), n);

    let reloaded = pool.reload().unwrap();
    assert_eq!(reloaded.len(), n);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_clear_interleaved_with_appends_leaves_consistent_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("token.txt");
    std::fs::write(&store, "seed\n").unwrap();
    let pool = Arc::new(CredentialPool::load(&store, &store).unwrap());

    let mut tasks = Vec::new();
    for i in 0..50 {
        let pool = pool.clone();
        tasks.push(tokio::task::spawn_blocking(move || {
            if i == 25 {
                pool.clear()
            } else {
                pool.append(&token(i))
            }
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    // Whatever survived the clear, memory and disk must agree.
    let on_disk: Vec<String> = pool
        .list()
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    let in_memory: Vec<String> = pool
        .snapshot()
        .iter()
        .map(|c| c.expose_secret().to_string())
        .collect();
    assert_eq!(on_disk, in_memory);
    assert!(!on_disk.iter().any(|line| line == "seed"));
}

#[test]
fn test_startup_load_fails_when_no_store_is_readable() {
    let dir = tempfile::tempdir().unwrap();
    let err = CredentialPool::load(dir.path().join("a/token.txt"), dir.path().join("b/token.txt"))
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("a/token.txt"));
    assert!(message.contains("b/token.txt"));
}
