use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use particle_scope::{
    BackendError, ContourCountBackend, EncodeError, ParticleScope, ScopeConfig, StartError,
    StartOutcome,
};
use particle_vision::ShapeCategory;
use video_ingest::{CaptureSettings, SceneBuilder, SyntheticCamera};

fn config() -> ScopeConfig {
    ScopeConfig {
        camera_id: "synthetic://test".into(),
        capture: CaptureSettings {
            width: 160,
            height: 120,
            fps: 30.0,
        },
        frame_pause: Duration::from_millis(2),
        frame_wait_timeout: Duration::from_millis(300),
        frame_poll_interval: Duration::from_millis(10),
        ..ScopeConfig::default()
    }
}

fn bead_camera() -> SyntheticCamera {
    SyntheticCamera::repeating(SceneBuilder::new(160, 120, 255).disc(80.0, 60.0, 20.0, 0).build())
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn second_start_is_a_no_op() {
    let camera = bead_camera();
    let scope = ParticleScope::new(config(), Arc::new(camera.clone())).unwrap();

    assert_eq!(scope.start().unwrap(), StartOutcome::Started);
    assert_eq!(scope.start().unwrap(), StartOutcome::AlreadyRunning);
    assert!(scope.is_running());
    assert_eq!(camera.open_count(), 1);

    scope.stop();
    assert!(!scope.is_running());
    assert!(camera.was_released());
}

#[test]
fn unavailable_camera_leaves_service_stopped() {
    let scope = ParticleScope::new(config(), Arc::new(SyntheticCamera::unavailable())).unwrap();

    let err = scope.start().unwrap_err();
    assert!(matches!(err, StartError::CameraUnavailable { ref camera_id, .. } if camera_id == "synthetic://test"));
    assert!(!scope.is_running());
    assert_eq!(scope.status().frame_count, 0);
}

#[test]
fn read_failure_ends_session_and_releases_device() {
    let camera = bead_camera().with_frame_limit(3);
    let scope = ParticleScope::new(config(), Arc::new(camera.clone())).unwrap();
    scope.start().unwrap();

    assert!(wait_until(Duration::from_secs(10), || !scope.is_running()));
    assert!(camera.was_released());
    let stats = scope.statistics();
    assert_eq!(stats.frame_count, 3);
    assert!(!stats.is_running);
    assert_eq!(stats.current_particle_count, 1);
    assert_eq!(scope.history().len(), 3);
}

#[test]
fn detections_are_published() {
    let scope = ParticleScope::new(config(), Arc::new(bead_camera())).unwrap();
    scope.start().unwrap();
    assert!(wait_until(Duration::from_secs(10), || scope.status().frame_count >= 2));

    let particles = scope.current_particles();
    assert_eq!(particles.len(), 1);
    assert_eq!(particles[0].shape, ShapeCategory::Bead);

    let quantification = scope.quantification();
    assert_eq!(quantification.count, 1);
    assert_eq!(quantification.shape_distribution[&ShapeCategory::Bead], 1);
    scope.stop();
}

#[test]
fn stop_freezes_published_results() {
    let scope = ParticleScope::new(config(), Arc::new(bead_camera())).unwrap();
    scope.start().unwrap();
    assert!(wait_until(Duration::from_secs(10), || scope.status().frame_count >= 2));
    scope.stop();

    let frozen = scope.statistics();
    thread::sleep(Duration::from_millis(50));
    let later = scope.statistics();
    assert_eq!(frozen.frame_count, later.frame_count);
    assert_eq!(frozen.particles, later.particles);
    assert_eq!(later.current_particle_count, 1);
    assert!(!later.is_running);

    // Stopping twice is harmless.
    scope.stop();
}

#[test]
fn history_is_bounded_and_ordered() {
    let camera = bead_camera().with_frame_limit(8);
    let scope = ParticleScope::new(
        ScopeConfig {
            history_capacity: 3,
            ..config()
        },
        Arc::new(camera),
    )
    .unwrap();
    scope.start().unwrap();
    assert!(wait_until(Duration::from_secs(10), || !scope.is_running()));

    let history = scope.history();
    let frames: Vec<u64> = history.iter().map(|e| e.frame_number).collect();
    assert_eq!(frames, vec![6, 7, 8]);
    assert!(history.iter().all(|e| e.count == 1));
    assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    let snapshots = scope.history_snapshots();
    assert_eq!(snapshots.len(), 3);
    assert_eq!(snapshots[2].particles.len(), snapshots[2].count);
}

#[test]
fn new_session_clears_history_but_keeps_counting() {
    let camera = bead_camera().with_frame_limit(2);
    let scope = ParticleScope::new(config(), Arc::new(camera.clone())).unwrap();

    scope.start().unwrap();
    assert!(wait_until(Duration::from_secs(10), || !scope.is_running()));
    assert_eq!(scope.status().frame_count, 2);

    assert_eq!(scope.start().unwrap(), StartOutcome::Started);
    assert!(wait_until(Duration::from_secs(10), || !scope.is_running()));
    assert_eq!(camera.open_count(), 2);
    assert_eq!(scope.status().frame_count, 4);
    let frames: Vec<u64> = scope.history().iter().map(|e| e.frame_number).collect();
    assert_eq!(frames, vec![3, 4]);
}

#[test]
fn panicking_source_is_contained() {
    let camera = SyntheticCamera::new(|index, _| {
        if index == 1 {
            panic!("sensor fault");
        }
        SceneBuilder::new(64, 64, 255).build()
    });
    let scope = ParticleScope::new(config(), Arc::new(camera.clone())).unwrap();
    scope.start().unwrap();

    assert!(wait_until(Duration::from_secs(10), || !scope.is_running()));
    assert!(camera.was_released());
    assert_eq!(scope.status().frame_count, 1);
}

#[test]
fn frame_readers_report_absence() {
    let scope = ParticleScope::new(config(), Arc::new(bead_camera())).unwrap();

    let started = Instant::now();
    assert!(scope.wait_for_frame(Duration::from_millis(60)).is_none());
    assert!(started.elapsed() >= Duration::from_millis(60));
    assert!(scope.annotated_frame().is_none());
    assert!(matches!(scope.annotated_jpeg(), Err(EncodeError::NoFrame)));
    assert!(matches!(scope.annotated_base64(), Err(EncodeError::NoFrame)));
    assert!(matches!(
        scope.estimate_with(&ContourCountBackend::default()),
        Err(BackendError::NoFrame)
    ));
    assert!(scope.history().is_empty());
    assert_eq!(scope.quantification().count, 0);
}

#[test]
fn annotated_outputs_after_first_frame() {
    let scope = ParticleScope::new(config(), Arc::new(bead_camera())).unwrap();
    scope.start().unwrap();

    let frame = scope.wait_for_frame(Duration::from_secs(10)).unwrap();
    assert_eq!((frame.width, frame.height), (160, 120));

    let jpeg = scope.annotated_jpeg().unwrap();
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    let encoded = scope.annotated_base64().unwrap();
    assert!(!encoded.is_empty());
    assert_eq!(encoded.len() % 4, 0);

    let estimate = scope.estimate_with(&ContourCountBackend::default()).unwrap();
    assert_eq!(estimate.count, 1);
    scope.stop();
}

#[test]
fn unbounded_frame_wait_returns_once_a_frame_arrives() {
    let scope = ParticleScope::new(config(), Arc::new(bead_camera())).unwrap();
    scope.start().unwrap();

    let frame = scope.wait_for_frame(Duration::MAX).unwrap();
    assert_eq!((frame.width, frame.height), (160, 120));
    // Already published: returns without waiting.
    assert!(scope.wait_for_frame(Duration::MAX).is_some());
    scope.stop();
}

#[test]
fn concurrent_readers_see_consistent_snapshots() {
    let scope = Arc::new(ParticleScope::new(config(), Arc::new(bead_camera())).unwrap());
    scope.start().unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let scope = scope.clone();
            thread::spawn(move || {
                let mut last = 0;
                for _ in 0..50 {
                    let stats = scope.statistics();
                    assert_eq!(stats.current_particle_count, stats.particles.len());
                    assert_eq!(stats.quantification.count, stats.particles.len());
                    assert!(stats.frame_count >= last);
                    last = stats.frame_count;

                    let status = scope.status();
                    let scaled = status.fps * 10.0;
                    assert!((scaled - scaled.round()).abs() < 1e-6);
                    thread::sleep(Duration::from_millis(1));
                }
            })
        })
        .collect();
    for reader in readers {
        reader.join().unwrap();
    }
    scope.stop();
}
