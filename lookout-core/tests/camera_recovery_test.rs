use lookout_lib::camera::{
    BackoffPolicy, CameraError, CameraEvent, CameraSettings, CameraStreamManager,
};
use lookout_lib::sim::SimulatedCamera;
use std::sync::Arc;
use tokio::time::{Duration, Instant};

/// Requests issued by one pass over the constraint ladder
const LADDER_LEN: usize = 3;

fn settings(base_ms: u64, max_ms: u64, max_attempts: u32) -> CameraSettings {
    CameraSettings {
        backoff: BackoffPolicy::new(
            Duration::from_millis(base_ms),
            Duration::from_millis(max_ms),
            max_attempts,
        ),
        ..CameraSettings::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_recovery_exhaustion_with_backoff() {
    let camera = SimulatedCamera::new();
    let manager = CameraStreamManager::new(Arc::new(camera.clone()), settings(1000, 10_000, 3));
    let mut events = manager.subscribe();

    let stream = manager.acquire(true).await.unwrap();

    // 三次重连的每一级约束都失败
    for _ in 0..(3 * LADDER_LEN) {
        camera.fail_next(CameraError::DeviceUnavailable("in use".to_string()));
    }
    camera.unplug();

    let mut delays = Vec::new();
    let mut timestamps = Vec::new();
    let (attempts, error) = loop {
        match events.recv().await.unwrap() {
            CameraEvent::TrackEnded { stream_id, .. } => {
                assert_eq!(stream_id, stream.id());
            }
            CameraEvent::Reconnecting { attempt, delay } => {
                assert_eq!(attempt as usize, delays.len() + 1);
                delays.push(delay);
                timestamps.push(Instant::now());
            }
            CameraEvent::Reconnected { .. } => panic!("should not reconnect"),
            CameraEvent::RecoveryFailed { attempts, error } => break (attempts, error),
        }
    };

    assert_eq!(
        delays,
        vec![
            Duration::from_millis(1000),
            Duration::from_millis(2000),
            Duration::from_millis(4000),
        ]
    );
    // 实际间隔与计划一致（暂停时钟下精确推进）
    assert!(timestamps[1] - timestamps[0] >= delays[0]);
    assert!(timestamps[2] - timestamps[1] >= delays[1]);

    assert_eq!(attempts, 3);
    assert!(matches!(error, Some(CameraError::DeviceUnavailable(_))));
    assert_eq!(manager.recovery_attempts(), 3);
    assert!(manager.current_stream().is_none());
    assert!(stream.tracks().iter().all(|t| !t.is_live()));

    // 耗尽后不再自动重连
    let requests = camera.requests().len();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(camera.requests().len(), requests);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_is_capped() {
    let camera = SimulatedCamera::new();
    let manager = CameraStreamManager::new(Arc::new(camera.clone()), settings(1000, 3000, 4));
    let mut events = manager.subscribe();

    manager.acquire(true).await.unwrap();
    for _ in 0..(4 * LADDER_LEN) {
        camera.fail_next(CameraError::DeviceNotFound);
    }
    camera.unplug();

    let mut delays = Vec::new();
    loop {
        match events.recv().await.unwrap() {
            CameraEvent::Reconnecting { delay, .. } => delays.push(delay),
            CameraEvent::RecoveryFailed { .. } => break,
            _ => {}
        }
    }

    assert_eq!(delays.len(), 4);
    assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    assert!(delays.iter().all(|d| *d <= Duration::from_millis(3000)));
    assert_eq!(delays[3], Duration::from_millis(3000));
}

#[tokio::test(start_paused = true)]
async fn test_counter_resets_after_successful_recovery() {
    let camera = SimulatedCamera::new();
    let manager = CameraStreamManager::new(Arc::new(camera.clone()), settings(500, 10_000, 3));
    let mut events = manager.subscribe();

    manager.acquire(true).await.unwrap();

    // 第一次重连失败，第二次成功
    for _ in 0..LADDER_LEN {
        camera.fail_next(CameraError::DeviceUnavailable("busy".to_string()));
    }
    camera.unplug();

    let recovered = loop {
        match events.recv().await.unwrap() {
            CameraEvent::Reconnecting { attempt: 2, delay } => {
                assert_eq!(delay, Duration::from_millis(1000));
            }
            CameraEvent::Reconnected { stream } => break stream,
            CameraEvent::RecoveryFailed { .. } => panic!("should recover"),
            _ => {}
        }
    };

    assert_eq!(manager.recovery_attempts(), 0);
    assert!(recovered.is_active());

    // 再次中断时从第一级延迟重新开始
    camera.unplug();
    loop {
        if let CameraEvent::Reconnecting { attempt, delay } = events.recv().await.unwrap() {
            assert_eq!(attempt, 1);
            assert_eq!(delay, Duration::from_millis(500));
            break;
        }
    }
}

#[tokio::test]
async fn test_list_devices() {
    let manager = CameraStreamManager::new(Arc::new(SimulatedCamera::new()), CameraSettings::default());
    let devices = manager.list_devices().await.unwrap();

    let ids: Vec<_> = devices.iter().map(|d| d.device_id.as_str()).collect();
    assert_eq!(ids, vec!["sim-front", "sim-rear"]);
}
