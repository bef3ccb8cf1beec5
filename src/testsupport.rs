//! Shared test fixtures for protocol, correlator, and session test modules.

use crate::rpc::FrameSink;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temporary directory fixture with best-effort cleanup.
#[derive(Debug)]
pub struct TestTempDir {
    path: PathBuf,
}

impl TestTempDir {
    pub fn new(prefix: &str) -> Self {
        let suffix = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let dir = std::env::temp_dir().join(format!("runwire-{prefix}-{millis}-{suffix}"));
        fs::create_dir_all(&dir).expect("failed to create temporary fixture directory");
        Self { path: dir }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write UTF-8 text to a child path, creating parent directories as needed.
    pub fn write_text(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent directories for fixture");
        }
        fs::write(&path, content).expect("failed to write fixture file");
        path
    }
}

impl Drop for TestTempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// In-memory [`FrameSink`] that records every frame it accepts.
///
/// Clones share the same log and connection flag.
#[derive(Debug, Clone)]
pub struct RecordingSink {
    frames: Arc<Mutex<Vec<String>>>,
    connected: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn connected() -> Self {
        Self {
            frames: Arc::default(),
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn disconnected() -> Self {
        let sink = Self::connected();
        sink.set_connected(false);
        sink
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().expect("frames lock").clone()
    }

    /// Recorded frames parsed as JSON.
    pub fn json_frames(&self) -> Vec<Value> {
        self.frames()
            .iter()
            .map(|frame| serde_json::from_str(frame).expect("recorded frame is JSON"))
            .collect()
    }
}

impl FrameSink for RecordingSink {
    fn send_frame(&self, frame: String) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }
        self.frames.lock().expect("frames lock").push(frame);
        true
    }
}

/// Conversation `input_request` frame.
pub fn input_request_frame(request_id: &str, prompt: &str) -> String {
    json!({"type": "input_request", "request_id": request_id, "prompt": prompt}).to_string()
}

/// Step-debug `debug_input_request` frame.
pub fn debug_input_request_frame(request_id: &str, prompt: &str) -> String {
    json!({"type": "debug_input_request", "request_id": request_id, "prompt": prompt}).to_string()
}

/// Agent text frame with an explicit id.
pub fn text_frame(id: &str, sender: &str, recipient: &str, content: &str) -> String {
    json!({
        "type": "text",
        "id": id,
        "content": {"sender": sender, "recipient": recipient, "content": content}
    })
    .to_string()
}

/// `print` frame carrying `data`.
pub fn print_frame(data: &str) -> String {
    json!({"type": "print", "data": data}).to_string()
}
