mod common;

use common::FakeFactory;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use voicestudio::dispatch::{SpeechService, WorkDispatcher};
use voicestudio::error::VoiceError;

fn service(factory: &FakeFactory, workers: usize, output_dir: &Path) -> SpeechService {
    SpeechService::new(
        factory.registry(),
        Arc::new(WorkDispatcher::new(workers, None)),
        output_dir,
        "wav",
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_job_does_not_block_free_slot() {
    let dispatcher = Arc::new(WorkDispatcher::new(2, None));
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

    let slow = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            dispatcher
                .run(move || {
                    release_rx.recv().ok();
                    Ok("slow")
                })
                .await
        })
    };
    while dispatcher.stats().busy == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let fast = tokio::time::timeout(Duration::from_secs(2), dispatcher.run(|| Ok("fast")))
        .await
        .expect("second job waited on the slow one")
        .unwrap();
    assert_eq!(fast, "fast");
    assert!(!slow.is_finished());

    release_tx.send(()).unwrap();
    assert_eq!(slow.await.unwrap().unwrap(), "slow");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_synthesis_runs_in_parallel_across_models() {
    let temp_dir = TempDir::new().unwrap();
    let factory = FakeFactory {
        synth_delay: Duration::from_millis(400),
        ..FakeFactory::default()
    };
    let speech = service(&factory, 2, temp_dir.path());

    let started = Instant::now();
    let (a, b) = tokio::join!(
        speech.synthesize("alpha", "first"),
        speech.synthesize("beta", "second"),
    );
    a.unwrap();
    b.unwrap();

    assert!(
        started.elapsed() < Duration::from_millis(750),
        "jobs ran one after another: {:?}",
        started.elapsed()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_filenames_are_unique_per_call() {
    let temp_dir = TempDir::new().unwrap();
    let factory = FakeFactory::default();
    let speech = service(&factory, 4, temp_dir.path());

    let calls = (0..8).map(|i| {
        let speech = speech.clone();
        tokio::spawn(async move { speech.synthesize("alpha", &format!("line {i}")).await })
    });

    let mut names = HashSet::new();
    for call in calls.collect::<Vec<_>>() {
        let output = call.await.unwrap().unwrap();
        let path = Path::new(&output.filename);
        assert!(path.exists(), "missing {}", path.display());
        assert!(path.starts_with(temp_dir.path().join("alpha")));

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("alpha_"), "unexpected name {name}");
        assert!(name.ends_with(".wav"));
        names.insert(name);
    }

    assert_eq!(names.len(), 8);
    assert_eq!(factory.stats.constructions(), 1);
}

#[tokio::test]
async fn test_unknown_model_writes_no_file() {
    let temp_dir = TempDir::new().unwrap();
    let factory = FakeFactory::default();
    let speech = service(&factory, 2, temp_dir.path());

    let err = speech.synthesize("gamma", "hello").await.unwrap_err();

    assert!(matches!(err, VoiceError::UnknownModel { ref id, .. } if id == "gamma"));
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    assert_eq!(factory.stats.constructions(), 0);
}

#[tokio::test]
async fn test_empty_text_is_invalid() {
    let temp_dir = TempDir::new().unwrap();
    let factory = FakeFactory::default();
    let speech = service(&factory, 2, temp_dir.path());

    let err = speech.synthesize("alpha", "  ").await.unwrap_err();
    assert!(matches!(err, VoiceError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_synthesis_failure_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let factory = FakeFactory {
        fail_synthesis: true,
        ..FakeFactory::default()
    };
    let speech = service(&factory, 2, temp_dir.path());

    let err = speech.synthesize("alpha", "hello").await.unwrap_err();
    assert!(matches!(err, VoiceError::Synthesis(ref m) if m.contains("cannot say")));
}

#[tokio::test]
async fn test_change_language_loads_and_applies() {
    let temp_dir = TempDir::new().unwrap();
    let factory = FakeFactory::default();
    let registry = factory.registry();
    let speech = SpeechService::new(
        Arc::clone(&registry),
        Arc::new(WorkDispatcher::new(2, None)),
        temp_dir.path(),
        "wav",
    );

    speech
        .change_language("alpha", "j", Some("jf_alpha"))
        .await
        .unwrap();

    assert!(registry.is_loaded("alpha"));
    assert_eq!(
        *factory.stats.last_language.lock(),
        Some(("j".to_string(), Some("jf_alpha".to_string())))
    );

    let err = speech.change_language("gamma", "j", None).await.unwrap_err();
    assert!(matches!(err, VoiceError::UnknownModel { .. }));
}
