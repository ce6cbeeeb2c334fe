//! Scope chain backed by a frame arena.
//!
//! Frames live in slots addressed by [`FrameId`]; each frame names its
//! parent by id, so the chain is a tree with no ownership cycles even when a
//! frame binds a closure that captured that same frame.
//!
//! A frame no closure has seen is freed as soon as its block or call exits.
//! Declaring a function pins the declaring frame and its ancestors; pinned
//! frames outlive their scope and are reclaimed by [`Environment::collect`]
//! once no reachable closure refers to them.

use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::runtime::value::{Function, Value};
use crate::syntax::ast::FunDecl;

/// Pinned frames released between two collections before the next one runs.
const MIN_COLLECT_THRESHOLD: usize = 256;

/// Handle to a frame. The generation guards against reading a slot that was
/// freed and reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameId {
    index: usize,
    generation: u32,
}

/// What `define` does when the name already exists in the same frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopePolicy {
    /// Redefinition is a `DuplicateDefinition` error.
    #[default]
    Strict,
    /// Redefinition silently replaces the old binding.
    Permissive,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    #[error("Undefined variable '{0}'.")]
    Undefined(String),
    #[error("Variable '{0}' has been defined.")]
    Duplicate(String),
}

#[derive(Debug)]
struct Frame {
    vars: HashMap<String, Value>,
    parent: Option<FrameId>,
    pinned: bool,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    frame: Option<Frame>,
}

#[derive(Debug)]
pub struct Environment {
    slots: Vec<Slot>,
    free: Vec<usize>,
    global: FrameId,
    current: FrameId,
    policy: ScopePolicy,
    /// Frames pushed and not yet released, innermost last.
    active: Vec<FrameId>,
    /// Every closure created so far. Dead entries are dropped on collection.
    closures: Vec<Weak<Function>>,
    retained: usize,
    threshold: usize,
}

impl Environment {
    pub fn new(policy: ScopePolicy) -> Self {
        let global = FrameId { index: 0, generation: 0 };
        let frame = Frame { vars: HashMap::new(), parent: None, pinned: true };
        Self {
            slots: vec![Slot { generation: 0, frame: Some(frame) }],
            free: Vec::new(),
            global,
            current: global,
            policy,
            active: Vec::new(),
            closures: Vec::new(),
            retained: 0,
            threshold: MIN_COLLECT_THRESHOLD,
        }
    }

    pub fn policy(&self) -> ScopePolicy {
        self.policy
    }

    pub fn global(&self) -> FrameId {
        self.global
    }

    pub fn current(&self) -> FrameId {
        self.current
    }

    // ─── Frame lifecycle ─────────────────────────────────────────────────────

    /// Allocate an empty frame whose enclosing scope is `parent`. The frame
    /// stays active until it is passed to [`release`](Self::release).
    pub fn push(&mut self, parent: FrameId) -> FrameId {
        let frame = Frame { vars: HashMap::new(), parent: Some(parent), pinned: false };
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.frame = Some(frame);
                FrameId { index, generation: slot.generation }
            }
            None => {
                self.slots.push(Slot { generation: 0, frame: Some(frame) });
                FrameId { index: self.slots.len() - 1, generation: 0 }
            }
        };
        self.active.push(id);
        id
    }

    /// Make `frame` the innermost scope; returns the one it replaces.
    pub fn enter(&mut self, frame: FrameId) -> FrameId {
        std::mem::replace(&mut self.current, frame)
    }

    /// Mark a frame as out of scope. Unpinned frames are freed at once;
    /// pinned ones wait for the next collection.
    pub fn release(&mut self, id: FrameId) {
        if let Some(pos) = self.active.iter().rposition(|&f| f == id) {
            self.active.remove(pos);
        }
        match self.frame(id).map(|f| f.pinned) {
            None => {}
            Some(true) => {
                self.retained += 1;
                if self.retained >= self.threshold {
                    self.collect();
                }
            }
            Some(false) => self.free_slot(id.index),
        }
    }

    /// Create a closure over the current frame, pinning it and its ancestors.
    pub fn closure(&mut self, decl: Rc<FunDecl>) -> Rc<Function> {
        let mut cursor = Some(self.current);
        while let Some(id) = cursor {
            let Some(frame) = self.frame_mut(id) else { break };
            // ancestors of a pinned frame are already pinned
            if frame.pinned { break; }
            frame.pinned = true;
            cursor = frame.parent;
        }
        let function = Rc::new(Function { decl, closure: self.current });
        self.closures.push(Rc::downgrade(&function));
        function
    }

    /// Free every frame that neither an active scope nor a live closure can
    /// reach.
    ///
    /// A closure counts as a root when something outside the arena (a
    /// pending argument, a return value, the host) still holds it, which is
    /// the case exactly when its strong count exceeds the number of frame
    /// bindings holding it. Closures kept alive only by frames that are
    /// themselves unreachable, including a frame binding a closure over
    /// itself, are collected along with those frames.
    pub fn collect(&mut self) {
        self.closures.retain(|c| c.strong_count() > 0);

        let mut held_by_frames: HashMap<*const Function, usize> = HashMap::new();
        for frame in self.slots.iter().filter_map(|s| s.frame.as_ref()) {
            for value in frame.vars.values() {
                if let Value::Function(f) = value {
                    *held_by_frames.entry(Rc::as_ptr(f)).or_default() += 1;
                }
            }
        }

        let mut worklist = vec![self.global, self.current];
        worklist.extend(self.active.iter().copied());
        for weak in &self.closures {
            if let Some(f) = weak.upgrade() {
                let held = held_by_frames.get(&Rc::as_ptr(&f)).copied().unwrap_or(0);
                // `upgrade` itself holds one reference
                if Rc::strong_count(&f) - 1 > held {
                    worklist.push(f.closure);
                }
            }
        }

        let mut marked = vec![false; self.slots.len()];
        while let Some(id) = worklist.pop() {
            let Some(frame) = self.frame(id) else { continue };
            if std::mem::replace(&mut marked[id.index], true) { continue; }
            worklist.extend(frame.parent);
            for value in frame.vars.values() {
                if let Value::Function(f) = value {
                    worklist.push(f.closure);
                }
            }
        }

        let before = self.live_frames();
        for index in 0..self.slots.len() {
            if self.slots[index].frame.is_some() && !marked[index] {
                self.free_slot(index);
            }
        }
        let survivors = self.live_frames();
        tracing::trace!(freed = before - survivors, survivors, "collected frames");

        self.retained = 0;
        self.threshold = (survivors * 2).max(MIN_COLLECT_THRESHOLD);
    }

    /// Number of frames currently allocated.
    pub fn live_frames(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    fn free_slot(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        slot.frame = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
    }

    // ─── Bindings ────────────────────────────────────────────────────────────

    /// Bind `name` in the innermost frame.
    pub fn define(&mut self, name: &str, value: Value) -> Result<(), ScopeError> {
        let policy = self.policy;
        let current = self.current;
        let Some(frame) = self.frame_mut(current) else {
            return Err(ScopeError::Undefined(name.to_string()));
        };
        if policy == ScopePolicy::Strict && frame.vars.contains_key(name) {
            return Err(ScopeError::Duplicate(name.to_string()));
        }
        frame.vars.insert(name.to_string(), value);
        Ok(())
    }

    /// Look `name` up, innermost frame first.
    pub fn get(&self, name: &str) -> Result<Value, ScopeError> {
        let mut cursor = Some(self.current);
        while let Some(frame) = cursor.and_then(|id| self.frame(id)) {
            if let Some(value) = frame.vars.get(name) {
                return Ok(value.clone());
            }
            cursor = frame.parent;
        }
        Err(ScopeError::Undefined(name.to_string()))
    }

    /// Overwrite the nearest existing binding of `name`. Never declares.
    pub fn assign(&mut self, name: &str, value: Value) -> Result<(), ScopeError> {
        let owner = self.resolve(name).ok_or_else(|| ScopeError::Undefined(name.to_string()))?;
        if let Some(slot) = self.frame_mut(owner).and_then(|f| f.vars.get_mut(name)) {
            *slot = value;
        }
        Ok(())
    }

    fn resolve(&self, name: &str) -> Option<FrameId> {
        let mut cursor = Some(self.current);
        while let Some(id) = cursor {
            let frame = self.frame(id)?;
            if frame.vars.contains_key(name) {
                return Some(id);
            }
            cursor = frame.parent;
        }
        None
    }

    fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.frame.as_ref())
    }

    fn frame_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.frame.as_mut())
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(ScopePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::ast::Span;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    fn decl(name: &str) -> Rc<FunDecl> {
        Rc::new(FunDecl { name: name.into(), params: Vec::new(), body: Vec::new(), span: Span::new(1, 1) })
    }

    /// Push a frame under the current one and make it current.
    fn open(env: &mut Environment) -> (FrameId, FrameId) {
        let frame = env.push(env.current());
        let caller = env.enter(frame);
        (frame, caller)
    }

    fn close(env: &mut Environment, (frame, caller): (FrameId, FrameId)) {
        env.enter(caller);
        env.release(frame);
    }

    #[test]
    fn define_then_get() {
        let mut env = Environment::default();
        env.define("x", num(1.0)).unwrap();
        assert_eq!(env.get("x"), Ok(num(1.0)));
    }

    #[test]
    fn get_undefined() {
        let env = Environment::default();
        assert_eq!(env.get("nope"), Err(ScopeError::Undefined("nope".into())));
    }

    #[test]
    fn assign_never_declares() {
        let mut env = Environment::default();
        assert_eq!(env.assign("x", num(1.0)), Err(ScopeError::Undefined("x".into())));
        assert!(env.get("x").is_err());
    }

    #[test]
    fn shadowing_leaves_outer_binding_alone() {
        let mut env = Environment::default();
        env.define("x", Value::Str("a".into())).unwrap();

        let scope = open(&mut env);
        env.define("x", Value::Str("b".into())).unwrap();
        assert_eq!(env.get("x"), Ok(Value::Str("b".into())));
        close(&mut env, scope);

        assert_eq!(env.get("x"), Ok(Value::Str("a".into())));
    }

    #[test]
    fn assign_walks_to_nearest_definition() {
        let mut env = Environment::default();
        env.define("x", num(1.0)).unwrap();

        let scope = open(&mut env);
        env.assign("x", num(2.0)).unwrap();
        close(&mut env, scope);

        assert_eq!(env.get("x"), Ok(num(2.0)));
    }

    #[test]
    fn strict_policy_rejects_redefinition() {
        let mut env = Environment::new(ScopePolicy::Strict);
        env.define("x", num(1.0)).unwrap();
        assert_eq!(env.define("x", num(2.0)), Err(ScopeError::Duplicate("x".into())));
        assert_eq!(env.get("x"), Ok(num(1.0)));
    }

    #[test]
    fn permissive_policy_overwrites() {
        let mut env = Environment::new(ScopePolicy::Permissive);
        env.define("x", num(1.0)).unwrap();
        env.define("x", num(2.0)).unwrap();
        assert_eq!(env.get("x"), Ok(num(2.0)));
    }

    #[test]
    fn released_frames_are_reused_with_new_generation() {
        let mut env = Environment::default();
        let first = env.push(env.global());
        env.release(first);
        let second = env.push(env.global());

        assert_eq!(first.index, second.index);
        assert_ne!(first, second);
        assert!(env.frame(first).is_none());
        assert!(env.frame(second).is_some());
        assert_eq!(env.live_frames(), 2);
    }

    #[test]
    fn captured_chain_survives_release() {
        let mut env = Environment::default();
        let outer = open(&mut env);
        let inner = open(&mut env);
        env.define("i", num(0.0)).unwrap();
        let function = env.closure(decl("inc"));
        close(&mut env, inner);
        close(&mut env, outer);
        env.define("inc", Value::Function(Rc::clone(&function))).unwrap();
        env.collect();

        assert_eq!(function.closure, inner.0);
        assert_eq!(env.live_frames(), 3);

        env.enter(function.closure);
        assert_eq!(env.get("i"), Ok(num(0.0)));
    }

    #[test]
    fn closure_held_only_by_its_own_frame_is_collected() {
        let mut env = Environment::default();
        let scope = open(&mut env);
        let function = env.closure(decl("g"));
        env.define("g", Value::Function(function)).unwrap();
        close(&mut env, scope);
        assert_eq!(env.live_frames(), 2);

        env.collect();
        assert_eq!(env.live_frames(), 1);
    }

    #[test]
    fn closure_held_outside_the_arena_keeps_its_frame() {
        let mut env = Environment::default();
        let scope = open(&mut env);
        env.define("kept", num(1.0)).unwrap();
        let function = env.closure(decl("get"));
        close(&mut env, scope);

        env.collect();
        assert_eq!(env.live_frames(), 2);

        drop(function);
        env.collect();
        assert_eq!(env.live_frames(), 1);
    }

    #[test]
    fn active_frames_are_never_collected() {
        let mut env = Environment::default();
        let outer = open(&mut env);
        env.define("x", num(1.0)).unwrap();
        let inner = open(&mut env);
        let caller = env.enter(env.global());

        env.collect();
        assert_eq!(env.live_frames(), 3);

        env.enter(caller);
        close(&mut env, inner);
        close(&mut env, outer);
        assert_eq!(env.live_frames(), 1);
    }

    #[test]
    fn garbage_closures_are_collected_automatically() {
        let mut env = Environment::default();
        for _ in 0..10_000 {
            let scope = open(&mut env);
            let function = env.closure(decl("g"));
            env.define("g", Value::Function(function)).unwrap();
            close(&mut env, scope);
        }
        assert!(env.live_frames() <= MIN_COLLECT_THRESHOLD + 1, "{}", env.live_frames());
    }

    #[test]
    fn global_frame_is_never_released() {
        let mut env = Environment::default();
        env.define("g", Value::Bool(true)).unwrap();
        env.release(env.global());
        env.collect();
        assert_eq!(env.get("g"), Ok(Value::Bool(true)));
    }
}
