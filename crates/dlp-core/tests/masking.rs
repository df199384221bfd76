//! # Masking Integration Tests
//!
//! End-to-end behaviour of the masking path: referential file on disk,
//! shared cache, processor over a batch of events.
//!
//! ## Coverage
//!
//! | Property | Test |
//! |----------|------|
//! | Denylisted token masked in place | `test_end_to_end_secret_code` |
//! | Unknown algorithm == SHA256 | `test_unknown_algorithm_matches_sha256_referential` |
//! | One load under concurrent first lookups | `test_concurrent_first_lookups_load_once` |
//! | Load-once despite file mutation | `test_file_mutation_after_load_is_invisible` |
//! | Fail-open / fail-closed | `test_missing_referential_*` |

use dlp_core::{
    CountingListener, DlpProcessor, Event, Filter, HashAlgorithm, JsonEvent, LoadFailurePolicy,
    ProcessorConfig, ReferentialCache,
};
use std::fs;
use std::sync::{Arc, Barrier};
use tempfile::TempDir;

fn hash_path(dir: &TempDir) -> String {
    format!("{}/", dir.path().display())
}

fn write_referential(dir: &TempDir, code: &str, algorithm: HashAlgorithm, values: &[&str]) {
    let body: String = values
        .iter()
        .map(|v| format!("{}\n", algorithm.digest(v)))
        .collect();
    fs::write(dir.path().join(format!("{}.data", code)), body).unwrap();
}

fn processor(dir: &TempDir, algorithm: HashAlgorithm) -> DlpProcessor {
    let config = ProcessorConfig {
        hash_path: hash_path(dir),
        hashing_algorithm: algorithm,
        ..ProcessorConfig::default()
    };
    DlpProcessor::with_own_cache(config)
}

fn event(code: &str, message: &str) -> JsonEvent {
    JsonEvent::new().with("elk", code).with("message", message)
}

// =============================================================================
// END-TO-END MASKING
// =============================================================================

#[test]
fn test_end_to_end_secret_code() {
    let dir = TempDir::new().unwrap();
    write_referential(&dir, "app1", HashAlgorithm::Sha256, &["secret"]);

    let processor = processor(&dir, HashAlgorithm::Sha256);
    let mut events = vec![event("app1", "the secret code")];
    let listener = CountingListener::new();
    processor.filter(&mut events, &listener);

    assert_eq!(events[0].get_str("message"), Some("the ###### code"));
    assert_eq!(listener.matched(), 1);
}

#[test]
fn test_every_supported_algorithm_round_trips() {
    for algorithm in [
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha512,
        HashAlgorithm::Md5,
    ] {
        let dir = TempDir::new().unwrap();
        write_referential(&dir, "app1", algorithm, &["4111111111111111", "alice"]);

        let processor = processor(&dir, algorithm);
        let redaction = processor.redact("card 4111111111111111 owner alice", "app1");
        assert_eq!(
            redaction.text, "card ################ owner #####",
            "{}",
            algorithm
        );
        assert_eq!(redaction.masked, 2);
    }
}

#[test]
fn test_mismatched_algorithm_masks_nothing() {
    let dir = TempDir::new().unwrap();
    write_referential(&dir, "app1", HashAlgorithm::Sha1, &["secret"]);

    let processor = processor(&dir, HashAlgorithm::Sha256);
    assert_eq!(processor.redact("the secret", "app1").text, "the secret");
}

#[test]
fn test_unknown_algorithm_matches_sha256_referential() {
    let dir = TempDir::new().unwrap();
    write_referential(&dir, "app1", HashAlgorithm::Sha256, &["secret"]);

    let processor = processor(&dir, HashAlgorithm::from_name("FOO"));
    assert_eq!(processor.redact("the secret code", "app1").text, "the ###### code");
}

#[test]
fn test_events_route_to_their_own_application() {
    let dir = TempDir::new().unwrap();
    write_referential(&dir, "app1", HashAlgorithm::Sha256, &["alpha"]);
    write_referential(&dir, "app2", HashAlgorithm::Sha256, &["beta"]);

    let processor = processor(&dir, HashAlgorithm::Sha256);
    let mut events = vec![
        event("app1", "alpha beta"),
        event("app2", "alpha beta"),
        event("app1", "beta alpha"),
    ];
    processor.filter(&mut events, &CountingListener::new());

    assert_eq!(events[0].get_str("message"), Some("##### beta"));
    assert_eq!(events[1].get_str("message"), Some("alpha ####"));
    assert_eq!(events[2].get_str("message"), Some("beta #####"));
    assert_eq!(processor.cache().loads(), 2);
}

#[test]
fn test_other_fields_are_untouched() {
    let dir = TempDir::new().unwrap();
    write_referential(&dir, "app1", HashAlgorithm::Sha256, &["secret"]);

    let processor = processor(&dir, HashAlgorithm::Sha256);
    let mut events = vec![event("app1", "secret").with("note", "secret")];
    processor.filter(&mut events, &CountingListener::new());

    assert_eq!(events[0].get_str("message"), Some("######"));
    assert_eq!(events[0].get_str("note"), Some("secret"));
}

// =============================================================================
// CACHE SEMANTICS
// =============================================================================

#[test]
fn test_concurrent_first_lookups_load_once() {
    let dir = TempDir::new().unwrap();
    let values: Vec<String> = (0..50_000).map(|i| format!("value-{}", i)).collect();
    let refs: Vec<&str> = values.iter().map(String::as_str).collect();
    write_referential(&dir, "big", HashAlgorithm::Sha256, &refs);

    let cache = ReferentialCache::new(hash_path(&dir));
    let threads = 8;
    let barrier = Barrier::new(threads);

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    cache.lookup("big")
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(cache.loads(), 1);
    for referential in &results {
        assert!(Arc::ptr_eq(referential, &results[0]));
        assert_eq!(referential.digests().len(), 50_000);
    }
}

#[test]
fn test_concurrent_masking_through_shared_processor() {
    let dir = TempDir::new().unwrap();
    write_referential(&dir, "app1", HashAlgorithm::Sha256, &["secret"]);
    let processor = processor(&dir, HashAlgorithm::Sha256);

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..100 {
                    let mut events = vec![event("app1", "a secret b")];
                    processor.filter(&mut events, &CountingListener::new());
                    assert_eq!(events[0].get_str("message"), Some("a ###### b"));
                }
            });
        }
    });

    assert_eq!(processor.cache().loads(), 1);
}

#[test]
fn test_file_mutation_after_load_is_invisible() {
    let dir = TempDir::new().unwrap();
    write_referential(&dir, "app1", HashAlgorithm::Sha256, &["secret"]);

    let processor = processor(&dir, HashAlgorithm::Sha256);
    assert_eq!(processor.redact("secret other", "app1").text, "###### other");

    write_referential(&dir, "app1", HashAlgorithm::Sha256, &["other"]);
    assert_eq!(processor.redact("secret other", "app1").text, "###### other");
    assert_eq!(processor.cache().loads(), 1);
}

#[test]
fn test_shared_cache_between_processors() {
    let dir = TempDir::new().unwrap();
    write_referential(&dir, "app1", HashAlgorithm::Sha256, &["secret"]);

    let cache = Arc::new(ReferentialCache::new(hash_path(&dir)));
    let config = ProcessorConfig {
        hash_path: hash_path(&dir),
        ..ProcessorConfig::default()
    };
    let first = DlpProcessor::new(config.clone(), Arc::clone(&cache));
    let second = DlpProcessor::new(config, Arc::clone(&cache));

    assert_eq!(first.redact("secret", "app1").text, "######");
    assert_eq!(second.redact("secret", "app1").text, "######");
    assert_eq!(cache.loads(), 1);
}

// =============================================================================
// LOAD FAILURE POLICY
// =============================================================================

#[test]
fn test_missing_referential_fail_open() {
    let dir = TempDir::new().unwrap();
    let processor = processor(&dir, HashAlgorithm::Sha256);

    let mut events = vec![event("nope", "the secret code")];
    let listener = CountingListener::new();
    processor.filter(&mut events, &listener);

    assert_eq!(events[0].get_str("message"), Some("the secret code"));
    assert_eq!(listener.matched(), 1);
}

#[test]
fn test_missing_referential_fail_closed() {
    let dir = TempDir::new().unwrap();
    let config = ProcessorConfig {
        hash_path: hash_path(&dir),
        on_load_failure: LoadFailurePolicy::FailClosed,
        ..ProcessorConfig::default()
    };
    let processor = DlpProcessor::with_own_cache(config);

    let mut events = vec![event("nope", "the secret code")];
    processor.filter(&mut events, &CountingListener::new());
    assert_eq!(events[0].get_str("message"), Some("### ###### ####"));
}

#[test]
fn test_missing_referential_is_not_retried() {
    let dir = TempDir::new().unwrap();
    let processor = processor(&dir, HashAlgorithm::Sha256);

    assert_eq!(processor.redact("secret", "late").text, "secret");
    write_referential(&dir, "late", HashAlgorithm::Sha256, &["secret"]);
    assert_eq!(processor.redact("secret", "late").text, "secret");

    assert!(processor.cache().invalidate("late"));
    assert_eq!(processor.redact("secret", "late").text, "######");
    assert_eq!(processor.cache().loads(), 2);
}
