//! Scripted stand-in for the external tool adapter.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::time::Duration;

use docshift::{ConversionError, ToolInvocation, ToolOutcome, ToolReport, ToolRunner};

/// What the fake tool does for one invocation.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Writes these bytes to the expected output and exits 0.
    Produce(Vec<u8>),
    /// Writes a solid PNG of the given size and exits 0.
    ProducePng(u32, u32),
    /// Exits with the code, leaving partial output behind.
    Exit(i32),
    /// Exits 0 without writing anything.
    ExitWithoutOutput,
    /// Reports a timeout.
    TimedOut,
}

/// Lets a test hold an invocation open until it decides to release it.
struct Gate {
    started: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

pub struct ScriptedRunner {
    script: Mutex<VecDeque<Behavior>>,
    fallback: Behavior,
    calls: Mutex<Vec<ToolInvocation>>,
    gate: Option<Gate>,
}

impl ScriptedRunner {
    /// Every invocation behaves the same way.
    pub fn always(behavior: Behavior) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: behavior,
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Plays `script` in order, then repeats `fallback`.
    pub fn sequence(script: Vec<Behavior>, fallback: Behavior) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::always(fallback)
        }
    }

    /// Blocks every invocation until a message arrives on the returned
    /// sender. The returned receiver fires when an invocation starts.
    pub fn gated(behavior: Behavior) -> (Self, Receiver<()>, Sender<()>) {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let runner = Self {
            gate: Some(Gate {
                started: Mutex::new(started_tx),
                release: Mutex::new(release_rx),
            }),
            ..Self::always(behavior)
        };
        (runner, started_rx, release_tx)
    }

    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn next_behavior(&self) -> Behavior {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl ToolRunner for ScriptedRunner {
    fn invoke(&self, invocation: &ToolInvocation) -> Result<ToolReport, ConversionError> {
        self.calls.lock().unwrap().push(invocation.clone());

        if let Some(gate) = &self.gate {
            gate.started.lock().unwrap().send(()).unwrap();
            gate.release
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(30))
                .unwrap();
        }

        let output = &invocation.expected_output;
        let outcome = match self.next_behavior() {
            Behavior::Produce(bytes) => {
                std::fs::write(output, bytes).unwrap();
                ToolOutcome::inspect(Some(0), output)
            }
            Behavior::ProducePng(width, height) => {
                image::RgbImage::from_pixel(width, height, image::Rgb([40, 80, 160]))
                    .save_with_format(output, image::ImageFormat::Png)
                    .unwrap();
                ToolOutcome::inspect(Some(0), output)
            }
            Behavior::Exit(code) => {
                std::fs::write(output, b"partial").unwrap();
                ToolOutcome::inspect(Some(code), output)
            }
            Behavior::ExitWithoutOutput => ToolOutcome::inspect(Some(0), output),
            Behavior::TimedOut => ToolOutcome::TimedOut(Duration::from_secs(120)),
        };

        Ok(ToolReport {
            tool: invocation.tool,
            outcome,
            stderr: "scripted stderr at /srv/secret/path".to_string(),
        })
    }
}
