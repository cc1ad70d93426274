use crate::host::Host;
use crate::qukeys::{Qukeys, DEFAULT_QUEUE_CAPACITY};
use crate::script::ScriptStep;
use crate::types::{EventId, HandlerResult, KeyEdge, KeyEvent, KeyPosition, LogicalKey};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Layered keymap. Layer 0 is always active; a missing entry on a higher
/// layer falls through to the layers below it.
#[derive(Debug, Clone, Default)]
pub struct Keymap {
    layers: Vec<HashMap<KeyPosition, LogicalKey>>,
}

impl Keymap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, layer: u8, position: KeyPosition, key: LogicalKey) {
        let layer = usize::from(layer);
        if self.layers.len() <= layer {
            self.layers.resize_with(layer + 1, HashMap::new);
        }
        self.layers[layer].insert(position, key);
    }

    pub fn with(mut self, layer: u8, position: KeyPosition, key: LogicalKey) -> Self {
        self.set(layer, position, key);
        self
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn get(&self, layer: usize, position: KeyPosition) -> Option<LogicalKey> {
        self.layers
            .get(layer)
            .and_then(|l| l.get(&position))
            .copied()
            .filter(|k| *k != LogicalKey::Transparent)
    }
}

/// An event that made it out the far end of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Emitted {
    pub event: KeyEvent,
    pub time: u32,
}

struct PipelineHost {
    keymap: Keymap,
    // Press count per shifted layer; layer 0 is implicit.
    layer_holds: HashMap<u8, u32>,
    now: u32,
    redispatched: VecDeque<KeyEvent>,
}

impl PipelineHost {
    // Layer changes take effect as soon as an event is dispatched, so keys
    // flushed later in the same pass already see the new layer.
    fn track_layers(&mut self, event: &KeyEvent) {
        let LogicalKey::LayerShift(layer) = event.key else {
            return;
        };
        match event.edge {
            KeyEdge::Down => *self.layer_holds.entry(layer).or_insert(0) += 1,
            KeyEdge::Up => {
                if let Some(count) = self.layer_holds.get_mut(&layer) {
                    *count -= 1;
                    if *count == 0 {
                        self.layer_holds.remove(&layer);
                    }
                }
            }
        }
    }

    fn resolve(&self, position: KeyPosition) -> (u8, LogicalKey) {
        for layer in (1..self.keymap.layer_count()).rev() {
            let Ok(layer_id) = u8::try_from(layer) else {
                continue;
            };
            if !self.layer_holds.contains_key(&layer_id) {
                continue;
            }
            if let Some(key) = self.keymap.get(layer, position) {
                return (layer_id, key);
            }
        }
        (0, self.keymap.get(0, position).unwrap_or(LogicalKey::NoKey))
    }
}

impl Host for PipelineHost {
    fn millis_at_cycle_start(&self) -> u32 {
        self.now
    }

    fn lookup_key(&self, position: KeyPosition) -> LogicalKey {
        self.resolve(position).1
    }

    fn active_layer(&self, position: KeyPosition) -> u8 {
        self.resolve(position).0
    }

    fn redispatch(&mut self, event: KeyEvent) {
        self.track_layers(&event);
        self.redispatched.push_back(event);
    }
}

/// A minimal firmware main loop around a [`Qukeys`] engine.
///
/// Physical transitions get fresh ids and go through the engine; anything the
/// engine re-dispatches goes through it again (and is let through), then
/// lands in the output stream. Time advances in 1 ms cycles, each ending with
/// `Qukeys::poll`.
pub struct Pipeline<const N: usize = DEFAULT_QUEUE_CAPACITY> {
    engine: Qukeys<N>,
    host: PipelineHost,
    next_event_id: EventId,
    live_keys: HashMap<KeyPosition, LogicalKey>,
    input: Vec<KeyEvent>,
    output: Vec<Emitted>,
    on_emit: Option<Box<dyn FnMut(&Emitted)>>,
}

impl<const N: usize> Pipeline<N> {
    pub fn new(keymap: Keymap, engine: Qukeys<N>) -> Self {
        Self {
            engine,
            host: PipelineHost {
                keymap,
                layer_holds: HashMap::new(),
                now: 0,
                redispatched: VecDeque::new(),
            },
            next_event_id: 0,
            live_keys: HashMap::new(),
            input: Vec::new(),
            output: Vec::new(),
            on_emit: None,
        }
    }

    pub fn set_on_emit(&mut self, cb: impl FnMut(&Emitted) + 'static) {
        self.on_emit = Some(Box::new(cb));
    }

    pub fn engine(&self) -> &Qukeys<N> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Qukeys<N> {
        &mut self.engine
    }

    pub fn now(&self) -> u32 {
        self.host.now
    }

    /// Move the clock without running cycles, e.g. to test wraparound.
    pub fn set_time(&mut self, now: u32) {
        self.host.now = now;
    }

    /// Id the next physical transition will get.
    pub fn set_next_event_id(&mut self, id: EventId) {
        self.next_event_id = id;
    }

    pub fn press(&mut self, position: KeyPosition) {
        let key = self.host.lookup_key(position);
        self.physical_event(position, KeyEdge::Down, key);
    }

    pub fn release(&mut self, position: KeyPosition) {
        let key = self
            .live_keys
            .get(&position)
            .copied()
            .unwrap_or(LogicalKey::NoKey);
        self.physical_event(position, KeyEdge::Up, key);
    }

    /// Run `ms` cycles.
    pub fn advance(&mut self, ms: u32) {
        for _ in 0..ms {
            self.run_cycle();
        }
    }

    /// End-of-cycle work, then step the clock by 1 ms.
    pub fn run_cycle(&mut self) {
        self.engine.poll(&mut self.host);
        self.drain_redispatched();
        self.host.now = self.host.now.wrapping_add(1);
    }

    pub fn run_script(&mut self, steps: &[ScriptStep]) {
        for step in steps {
            match *step {
                ScriptStep::Press(position) => self.press(position),
                ScriptStep::Release(position) => self.release(position),
                ScriptStep::Wait(ms) => self.advance(ms),
            }
        }
    }

    /// Physical transitions fed in so far, with the ids they were given.
    pub fn input(&self) -> &[KeyEvent] {
        &self.input
    }

    pub fn output(&self) -> &[Emitted] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<Emitted> {
        std::mem::take(&mut self.output)
    }

    /// Output as `(edge, key)` pairs, the shape most assertions want.
    pub fn emitted_keys(&self) -> Vec<(KeyEdge, LogicalKey)> {
        self.output
            .iter()
            .map(|e| (e.event.edge, e.event.key))
            .collect()
    }

    /// Keys currently held downstream.
    pub fn live_keys(&self) -> &HashMap<KeyPosition, LogicalKey> {
        &self.live_keys
    }

    fn physical_event(&mut self, position: KeyPosition, edge: KeyEdge, key: LogicalKey) {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        let mut event = KeyEvent::new(position, edge, key, id);
        self.input.push(event);
        if self.engine.handle_event(&mut event, &mut self.host) == HandlerResult::Continue {
            self.host.track_layers(&event);
            self.emit(event);
        }
        self.drain_redispatched();
    }

    fn drain_redispatched(&mut self) {
        while let Some(mut event) = self.host.redispatched.pop_front() {
            if self.engine.handle_event(&mut event, &mut self.host) == HandlerResult::Continue {
                self.emit(event);
            }
        }
    }

    fn emit(&mut self, event: KeyEvent) {
        match event.edge {
            KeyEdge::Down => {
                self.live_keys.insert(event.position, event.key);
            }
            KeyEdge::Up => {
                self.live_keys.remove(&event.position);
            }
        }

        debug!(
            "Pipeline: t={} {:?} {:?} {:?}",
            self.host.now, event.position, event.edge, event.key
        );
        let emitted = Emitted {
            event,
            time: self.host.now,
        };
        if let Some(ref mut cb) = self.on_emit {
            cb(&emitted);
        }
        self.output.push(emitted);
    }
}
