//! Tracing subscriber setup for binaries, with optional Chrome traces.
//!
//! [`init`] installs a `tracing-subscriber` fmt layer filtered by `RUST_LOG`
//! (default `info`). With the `profiling` feature and a trace path, a
//! `tracing-chrome` layer is added; open the file in `chrome://tracing` or
//! [Perfetto](https://ui.perfetto.dev).

use std::path::Path;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Guard that flushes the trace file on drop.
///
/// Hold this in `main()`; the trace is written when the guard is dropped.
#[cfg(feature = "profiling")]
pub struct ProfilingGuard {
    _guard: Option<tracing_chrome::FlushGuard>,
}

/// Opaque guard type when profiling is disabled (zero-size, no-op drop).
#[cfg(not(feature = "profiling"))]
pub struct ProfilingGuard;

/// Initialize logging, and Chrome tracing when `trace_file` is given.
///
/// Without the `profiling` feature `trace_file` is ignored with a warning.
/// Calling this twice in one process leaves the first subscriber in place.
///
/// ```rust,ignore
/// let _guard = qwen3_tts_finetune::profiling::init(Some(Path::new("trace.json")));
/// ```
pub fn init(trace_file: Option<&Path>) -> ProfilingGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt = tracing_subscriber::fmt::layer().with_target(false);

    #[cfg(feature = "profiling")]
    {
        let (chrome_layer, guard) = match trace_file {
            Some(path) => {
                let (layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
                    .file(path)
                    .include_args(true)
                    .build();
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt)
            .with(chrome_layer)
            .try_init();

        if let Some(path) = trace_file {
            tracing::info!("Profiling enabled, trace will be written to {}", path.display());
        }
        ProfilingGuard { _guard: guard }
    }

    #[cfg(not(feature = "profiling"))]
    {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt)
            .try_init();

        if let Some(path) = trace_file {
            tracing::warn!(
                "Ignoring trace file {}: built without the `profiling` feature",
                path.display()
            );
        }
        ProfilingGuard
    }
}
