use async_trait::async_trait;

use crate::inference::error::InferenceResult;
use crate::inference::frame::Frame;

/// Progress report emitted while the model downloads and initializes
#[derive(Debug, Clone, PartialEq)]
pub struct LoadProgress {
    /// Overall fraction in `0.0..=1.0`
    pub fraction: f32,
    /// Human-readable stage, e.g. the file being fetched
    pub message: Option<String>,
}

impl LoadProgress {
    pub fn new(fraction: f32) -> Self {
        Self {
            fraction: fraction.clamp(0.0, 1.0),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Vision-language model backend
///
/// Tokenization and tensor work live behind this trait. The backend's GPU
/// context is not shareable, so callers must never run two `generate`
/// calls concurrently; `InferenceCoordinator` enforces this.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Whether `load` has completed successfully
    fn is_loaded(&self) -> bool;

    /// Download and initialize the model, reporting progress
    async fn load(&self, on_progress: &(dyn Fn(LoadProgress) + Send + Sync)) -> InferenceResult<()>;

    /// Run one throwaway pass so the first real frame is not slow
    async fn warmup(&self) -> InferenceResult<()>;

    /// Caption a frame, streaming each decoded token through `on_token`
    ///
    /// Returns the full generated text.
    async fn generate(
        &self,
        frame: &Frame,
        instruction: &str,
        on_token: &mut (dyn for<'t> FnMut(&'t str) + Send),
    ) -> InferenceResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::frame::FrameFormat;
    use std::sync::Arc;

    /// Emits one token per word of the instruction, each borrowed from a
    /// buffer local to the call.
    struct EchoModel;

    #[async_trait]
    impl VisionModel for EchoModel {
        fn is_loaded(&self) -> bool {
            true
        }

        async fn load(
            &self,
            on_progress: &(dyn Fn(LoadProgress) + Send + Sync),
        ) -> InferenceResult<()> {
            on_progress(LoadProgress::new(1.0));
            Ok(())
        }

        async fn warmup(&self) -> InferenceResult<()> {
            Ok(())
        }

        async fn generate(
            &self,
            frame: &Frame,
            instruction: &str,
            on_token: &mut (dyn for<'t> FnMut(&'t str) + Send),
        ) -> InferenceResult<String> {
            let mut text = String::new();
            for word in instruction.split_whitespace() {
                let token = format!("{word}@{}x{} ", frame.width, frame.height);
                tokio::task::yield_now().await;
                on_token(&token);
                text.push_str(&token);
            }
            Ok(text.trim_end().to_string())
        }
    }

    #[tokio::test]
    async fn test_generate_streams_tokens_through_trait_object() {
        let model: Arc<dyn VisionModel> = Arc::new(EchoModel);
        let frame = Frame::new(2, 1, FrameFormat::Jpeg, vec![0xFF, 0xD8]);

        let mut seen: Vec<String> = Vec::new();
        let mut on_token = |token: &str| seen.push(token.to_string());
        let text = model
            .generate(&frame, "a red ball", &mut on_token)
            .await
            .unwrap();

        assert_eq!(text, "a@2x1 red@2x1 ball@2x1");
        assert_eq!(seen, vec!["a@2x1 ", "red@2x1 ", "ball@2x1 "]);
    }

    #[test]
    fn test_load_progress_is_clamped() {
        assert_eq!(LoadProgress::new(1.5).fraction, 1.0);
        assert_eq!(LoadProgress::new(-0.2).fraction, 0.0);
        assert_eq!(
            LoadProgress::new(0.5).with_message("weights").message.as_deref(),
            Some("weights")
        );
    }
}
