//! Screen capture collaborator for OS-mode agent loops (spec §4.2 algorithm
//! step 2a: "If OS mode: capture a fresh screen image...").
//!
//! Corresponds to `local_interpreter/tools/os_tools.py::capture_screen`,
//! which grabs the active monitor and returns it base64-encoded, and
//! `local_interpreter/interpreter.py`'s use of it (`screenshot_b64 =
//! os_tools.capture_screen()`) to prepend an `image_url` content part ahead
//! of the next LLM request. This crate's dependency stack carries no
//! platform screen-grab primitive, so capture is an embedder-supplied
//! collaborator behind this trait rather than a bundled OS API call — the
//! same seam `ModuleEntryPoint` uses for module tools (SPEC_FULL §4.1.1).

use async_trait::async_trait;

use crate::error::CoreError;

/// One captured frame: a MIME type and base64-encoded image bytes.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub mime: String,
    pub data_base64: String,
}

/// Captures the current screen on demand. Implementations are supplied by
/// the embedder (no platform-specific capture crate is part of this
/// crate's own dependency table).
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    async fn capture(&self) -> Result<CapturedFrame, CoreError>;
}

#[cfg(test)]
pub(crate) struct FixedScreenCapture(pub CapturedFrame);

#[cfg(test)]
#[async_trait]
impl ScreenCapture for FixedScreenCapture {
    async fn capture(&self) -> Result<CapturedFrame, CoreError> {
        Ok(self.0.clone())
    }
}
