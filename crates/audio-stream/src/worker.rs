//! Per-source background tasks.
//!
//! A streaming source runs the refill task: it keeps the voice's buffer queue fed and
//! restarts a voice that starved. A preload source runs the sweep task, which releases
//! finished copy voices and notices when the main voice has stopped on its own.
//!
//! Both tasks wait on a shutdown channel with `recv_timeout`, so dropping the sender
//! ends them at their next wait point. The source mutex is never held across a wait.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::backend::VoiceState;
use crate::config::StreamerConfig;
use crate::error::SoundError;
use crate::status::PlaybackState;
use crate::streamer::{BufferStreamer, FillProgress};

/// State shared between a sound source and its background task.
pub(crate) struct SourceInner {
    pub(crate) state: PlaybackState,
    pub(crate) streamer: BufferStreamer,
}

impl SourceInner {
    /// Any state → Stopped: flush, rewind to frame 0, refill, halt.
    pub(crate) fn stop(&mut self) -> Result<(), SoundError> {
        self.state.is_playing = false;
        self.streamer.rewind()
    }
}

pub(crate) fn lock(shared: &Mutex<SourceInner>) -> MutexGuard<'_, SourceInner> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sleep for `timeout` unless shutdown is requested first. Returns `false` on shutdown.
fn wait(shutdown: &Receiver<()>, timeout: Duration) -> bool {
    matches!(shutdown.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
}

enum Step {
    Idle,
    Fill,
    Exit,
}

/// Keep a streaming voice fed until shutdown.
///
/// A one-shot stream is stopped as soon as its reader hits the loop end, which cuts
/// audio still queued. Short non-looping effects belong in
/// [`LoadMode::Preload`](audio_stream_types::LoadMode::Preload).
pub(crate) fn run_refill_task(
    name: String,
    shared: Arc<Mutex<SourceInner>>,
    shutdown: Receiver<()>,
    cfg: StreamerConfig,
) {
    tracing::debug!(source = %name, "refill task started");
    loop {
        let step = {
            let mut inner = lock(&shared);
            next_refill_step(&name, &mut inner)
        };
        let running = match step {
            Step::Idle => wait(&shutdown, cfg.idle_poll()),
            Step::Fill => fill_step(&name, &shared, &shutdown, &cfg),
            Step::Exit => false,
        };
        if !running {
            break;
        }
    }
    tracing::debug!(source = %name, "refill task stopped");
}

fn next_refill_step(name: &str, inner: &mut SourceInner) -> Step {
    if inner.state.is_ended {
        return Step::Exit;
    }
    if !inner.state.is_playing {
        return Step::Idle;
    }
    match inner.streamer.voice_state() {
        Ok(VoiceState::Playing) => Step::Fill,
        Ok(state) => {
            // A one-shot stream that drained its queue is finished, not starved.
            let result = if inner.streamer.at_loop_end() && !inner.state.is_looping {
                tracing::debug!(source = %name, "stream drained");
                inner.stop()
            } else {
                tracing::debug!(source = %name, ?state, "voice starved, restarting");
                inner.streamer.play().map_err(SoundError::from)
            };
            if let Err(e) = result {
                tracing::warn!(source = %name, "voice restart failed: {e}");
            }
            Step::Idle
        }
        Err(e) => {
            tracing::warn!(source = %name, "voice state query failed: {e}");
            Step::Idle
        }
    }
}

/// Refill up to one slot's worth of audio. Returns `false` on shutdown.
fn fill_step(
    name: &str,
    shared: &Mutex<SourceInner>,
    shutdown: &Receiver<()>,
    cfg: &StreamerConfig,
) -> bool {
    let target = lock(shared).streamer.fill_target();
    let mut filled = 0usize;
    loop {
        let progress = {
            let mut inner = lock(shared);
            if !inner.state.wants_audio() {
                return true;
            }
            let looping = inner.state.is_looping;
            match inner
                .streamer
                .refill_free_slot(target.saturating_sub(filled), looping)
            {
                Ok(FillProgress::Ended) => {
                    tracing::debug!(source = %name, "end of stream");
                    if let Err(e) = inner.stop() {
                        tracing::warn!(source = %name, "stop at end of stream failed: {e}");
                    }
                    return true;
                }
                Ok(progress) => progress,
                Err(e) => {
                    tracing::warn!(source = %name, "refill failed: {e}");
                    drop(inner);
                    return wait(shutdown, cfg.idle_poll());
                }
            }
        };
        match progress {
            FillProgress::Waiting => {
                if !wait(shutdown, cfg.backpressure_poll()) {
                    return false;
                }
            }
            FillProgress::Filled(n) | FillProgress::Wrapped(n) => {
                filled += n;
                if filled >= target {
                    return true;
                }
            }
            FillProgress::Ended => return true,
        }
    }
}

/// Release finished copy voices of a preloaded source until shutdown.
pub(crate) fn run_sweep_task(
    name: String,
    shared: Arc<Mutex<SourceInner>>,
    shutdown: Receiver<()>,
    cfg: StreamerConfig,
) {
    tracing::debug!(source = %name, "sweep task started");
    while wait(&shutdown, cfg.idle_poll()) {
        let mut inner = lock(&shared);
        if inner.state.is_ended {
            break;
        }
        let released = inner.streamer.sweep_copies();
        if released > 0 {
            tracing::trace!(source = %name, released, "copy voices released");
        }
        if inner.state.is_playing && inner.streamer.copy_count() == 0 {
            match inner.streamer.voice_state() {
                Ok(VoiceState::Playing) => {}
                Ok(_) => inner.state.is_playing = false,
                Err(e) => tracing::warn!(source = %name, "voice state query failed: {e}"),
            }
        }
    }
    tracing::debug!(source = %name, "sweep task stopped");
}
