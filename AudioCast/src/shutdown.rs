//! Process-wide cleanup: stop the renderer and remove the virtual sink,
//! exactly once, whichever path gets there first.

use std::sync::{Mutex, Once};

use castcontrol::{RendererDescriptor, TransportController};
use tracing::{info, warn};

use crate::sink;

/// Side effects run by the cleanup.
pub trait Cleanup: Send + Sync {
    fn stop_renderer(&self);
    fn unload_sink(&self, module: &str);
}

/// Real cleanup: best-effort Stop on the renderer, `pactl unload-module`.
pub struct CastCleanup {
    controller: TransportController,
    descriptor: RendererDescriptor,
    pactl: String,
}

impl CastCleanup {
    pub fn new(controller: TransportController, descriptor: RendererDescriptor) -> Self {
        Self {
            controller,
            descriptor,
            pactl: sink::PACTL.to_string(),
        }
    }
}

impl Cleanup for CastCleanup {
    fn stop_renderer(&self) {
        self.controller.stop(&self.descriptor);
    }

    fn unload_sink(&self, module: &str) {
        if let Err(e) = sink::unload_module(&self.pactl, module) {
            warn!("{:#}", e);
        }
    }
}

#[derive(Debug, Default)]
struct State {
    playing: bool,
    sink_module: Option<String>,
}

pub struct ShutdownContext<C: Cleanup> {
    state: Mutex<State>,
    once: Once,
    cleanup: C,
}

impl<C: Cleanup> ShutdownContext<C> {
    pub fn new(cleanup: C) -> Self {
        Self {
            state: Mutex::new(State::default()),
            once: Once::new(),
            cleanup,
        }
    }

    pub fn set_playing(&self, playing: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.playing = playing;
        }
    }

    pub fn set_sink_module(&self, module: Option<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.sink_module = module;
        }
    }

    pub fn is_done(&self) -> bool {
        self.once.is_completed()
    }

    /// Runs the cleanup the first time it is called; later calls return
    /// immediately. Blocks on network and `pactl`.
    pub fn run(&self) {
        self.once.call_once(|| {
            let (playing, sink_module) = match self.state.lock() {
                Ok(mut state) => (state.playing, state.sink_module.take()),
                Err(poisoned) => {
                    let mut state = poisoned.into_inner();
                    (state.playing, state.sink_module.take())
                }
            };
            info!("Shutting down");
            if playing {
                self.cleanup.stop_renderer();
            }
            if let Some(module) = sink_module {
                self.cleanup.unload_sink(&module);
            }
        });
    }
}
