//! Tracing setup. Events go to stderr and to a buffer the dashboard's debug
//! panel drains every frame.

use std::io::{self, Write};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

lazy_static::lazy_static! {
    static ref DEBUG_OUTPUT: Mutex<String> = Mutex::new(String::new());
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DebugPanelWriter;

impl Write for DebugPanelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Ok(mut output) = DEBUG_OUTPUT.lock() {
            output.push_str(&String::from_utf8_lossy(buf));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for DebugPanelWriter {
    type Writer = DebugPanelWriter;

    fn make_writer(&'a self) -> Self::Writer {
        *self
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .with_writer(io::stderr.and(DebugPanelWriter))
        .try_init();
    if let Err(err) = installed {
        eprintln!("logging already initialised: {err}");
    }
}

/// Takes everything logged since the last call.
pub fn drain_debug_output() -> String {
    match DEBUG_OUTPUT.lock() {
        Ok(mut output) => std::mem::take(&mut *output),
        Err(_) => String::new(),
    }
}
