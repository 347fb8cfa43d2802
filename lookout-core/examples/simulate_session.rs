//! 模拟会话演示
//!
//! 使用模拟摄像头和脚本化模型跑完整流程：
//! 权限 -> 欢迎 -> 加载 -> 实时字幕 -> 拔出摄像头 -> 自动重连 -> 关闭
//!
//! 运行: cargo run --example simulate_session [config.json]

use anyhow::Context;
use lookout_lib::capability::{CapabilityReport, PerformanceTier};
use lookout_lib::recovery::PlatformFamily;
use lookout_lib::session::{CaptionUpdate, SessionDeps, VisionSession};
use lookout_lib::sim::{ScriptedModel, SimulatedCamera, StaticCapability, StaticFrameSource};
use lookout_lib::state::{ConfigManager, StateSummary};
use lookout_lib::utils::logging::init_logging;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = match std::env::args().nth(1) {
        Some(path) => ConfigManager::load(&path)
            .with_context(|| format!("failed to load config from {}", path))?,
        None => Default::default(),
    };

    println!("=== 模拟会话 ===\n");

    let camera = SimulatedCamera::new();
    let model = ScriptedModel::new(["A", " person", " holding", " a", " coffee", " mug"])
        .with_token_delay(Duration::from_millis(60));

    let deps = SessionDeps {
        camera: Arc::new(camera.clone()),
        model: Arc::new(model),
        detector: Arc::new(StaticCapability::new(CapabilityReport::supported(
            PerformanceTier::Medium,
        ))),
        frames: Arc::new(StaticFrameSource::jpeg()),
        platform: PlatformFamily::Chromium,
    };
    let session = VisionSession::new(config, deps).await;

    // 打印每次状态变化
    let _log = session.machine().subscribe(|change| {
        if let Some(event) = change.event() {
            println!(
                "[state] {} -> {} ({}, {})",
                change.previous.view_state,
                change.current.view_state,
                event.kind(),
                change.current.runtime_state()
            );
        }
    });

    let mut captions = session.captions();
    let printer = tokio::spawn(async move {
        while let Ok(update) = captions.recv().await {
            match update {
                CaptionUpdate::Partial(text) => println!("  … {}", text),
                CaptionUpdate::Final(text) => println!("  ✓ {}", text),
                CaptionUpdate::Error(e) => println!("  ✗ {}", e),
            }
        }
    });

    anyhow::ensure!(session.request_permission().await, "camera not granted");
    session.set_video_ready(true);
    anyhow::ensure!(session.start().await, "model did not start");

    tokio::time::sleep(Duration::from_secs(3)).await;

    println!("\n拔出摄像头...\n");
    camera.unplug();
    tokio::time::sleep(Duration::from_secs(3)).await;

    let summary = StateSummary::from(&session.state());
    println!("\n当前状态:\n{}", serde_json::to_string_pretty(&summary)?);

    session.shutdown().await;
    printer.abort();

    let stats = session.coordinator().stats();
    println!(
        "\n完成! 推理 {} 次, 跳过 {} 次, 失败 {} 次",
        stats.completed, stats.dropped, stats.failed
    );

    Ok(())
}
