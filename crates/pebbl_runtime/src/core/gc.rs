//! Heap and garbage collection.
//!
//! Objects live in slots of a vector; an [`ObjectId`] is a slot index and a
//! free list recycles swept slots. Mark state is a side bitset, cleared at
//! the end of every cycle. Collection is stop-the-world mark-and-sweep with
//! explicit work lists, so arbitrarily deep object graphs never recurse on
//! the host stack.

use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashSet;

use super::chunk::Chunk;
use super::env::{Env, Scope};
use super::value::{FastHashMap, Function, Value, fast_hasher};

/// Index of a heap slot. The payload of a heap-tagged [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub usize);

pub enum ManagedObject {
    Str(String),
    Array(Vec<Value>),
    Dict(FastHashMap<String, Value>),
    Function(Function),
}

/// Live count that arms the first collection.
pub const INITIAL_GC_THRESHOLD: usize = 8;

pub struct Heap {
    objects: Vec<Option<ManagedObject>>,
    free_list: Vec<usize>,
    marks: Vec<u64>,
    live_count: usize,
    gc_threshold: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            objects: Vec::with_capacity(64),
            free_list: Vec::new(),
            marks: Vec::new(),
            live_count: 0,
            gc_threshold: INITIAL_GC_THRESHOLD,
        }
    }

    /// Place an object in a slot. Never collects; the interpreter drives
    /// collection before calling this (allocation is the only safepoint).
    pub fn alloc(&mut self, obj: ManagedObject) -> ObjectId {
        self.live_count += 1;
        if let Some(id) = self.free_list.pop() {
            self.objects[id] = Some(obj);
            ObjectId(id)
        } else {
            let id = self.objects.len();
            self.objects.push(Some(obj));
            ObjectId(id)
        }
    }

    pub fn should_collect(&self) -> bool {
        self.live_count >= self.gc_threshold
    }

    pub fn live_count(&self) -> usize {
        self.live_count
    }

    pub fn threshold(&self) -> usize {
        self.gc_threshold
    }

    pub fn get(&self, id: ObjectId) -> &ManagedObject {
        self.objects[id.0]
            .as_ref()
            .expect("heap object was collected while still referenced")
    }

    pub fn get_mut(&mut self, id: ObjectId) -> &mut ManagedObject {
        self.objects[id.0]
            .as_mut()
            .expect("heap object was collected while still referenced")
    }

    pub fn is_marked(&self, id: ObjectId) -> bool {
        let word = id.0 >> 6;
        let bit = id.0 & 63;
        self.marks.get(word).is_some_and(|w| (w & (1 << bit)) != 0)
    }

    /// Returns true when the bit was newly set.
    fn set_mark(&mut self, id: ObjectId) -> bool {
        let word = id.0 >> 6;
        let bit = id.0 & 63;
        if word >= self.marks.len() {
            self.marks.resize(word + 1, 0);
        }
        let w = &mut self.marks[word];
        let mask = 1u64 << bit;
        if (*w & mask) != 0 {
            return false;
        }
        *w |= mask;
        true
    }

    /// One full collection cycle over the given root set.
    pub fn collect(&mut self, roots: &[Value], envs: &[&Env], chunks: &[&Rc<Chunk>]) {
        self.mark_all(roots, envs, chunks);
        let before = self.live_count;
        let survivors = self.sweep();
        self.gc_threshold = (survivors * 2).max(INITIAL_GC_THRESHOLD);
        tracing::debug!(
            reclaimed = before - survivors,
            survivors,
            next_threshold = self.gc_threshold,
            "gc cycle"
        );
    }

    /// Mark every object reachable from the roots, the environment chains,
    /// and the executing chunks' constant pools.
    pub fn mark_all(&mut self, roots: &[Value], envs: &[&Env], chunks: &[&Rc<Chunk>]) {
        let mut pending_values: Vec<Value> = roots.to_vec();
        let mut pending_scopes: Vec<Rc<RefCell<Scope>>> = Vec::new();
        let mut visited_scopes: HashSet<usize, _> = HashSet::with_hasher(fast_hasher());
        let mut pending_chunks: Vec<Rc<Chunk>> = Vec::new();
        let mut visited_chunks: HashSet<usize, _> = HashSet::with_hasher(fast_hasher());

        let enqueue_env = |env: &Env,
                               visited: &mut HashSet<usize, ahash::RandomState>,
                               pending: &mut Vec<Rc<RefCell<Scope>>>| {
            if visited.insert(env.scope_ptr()) {
                pending.push(env.scope().clone());
            }
        };
        let enqueue_chunk = |chunk: &Rc<Chunk>,
                                 visited: &mut HashSet<usize, ahash::RandomState>,
                                 pending: &mut Vec<Rc<Chunk>>| {
            if visited.insert(Rc::as_ptr(chunk) as usize) {
                pending.push(chunk.clone());
            }
        };

        for env in envs {
            enqueue_env(env, &mut visited_scopes, &mut pending_scopes);
        }
        for chunk in chunks {
            enqueue_chunk(chunk, &mut visited_chunks, &mut pending_chunks);
        }

        while !pending_values.is_empty()
            || !pending_scopes.is_empty()
            || !pending_chunks.is_empty()
        {
            if let Some(val) = pending_values.pop() {
                if !val.is_gc_ptr() {
                    continue;
                }
                let id = val.as_object_id();
                if !self.set_mark(id) {
                    continue;
                }
                match &self.objects[id.0] {
                    Some(ManagedObject::Str(_)) => {}
                    Some(ManagedObject::Array(items)) => {
                        pending_values.extend(items.iter().copied());
                    }
                    Some(ManagedObject::Dict(map)) => {
                        pending_values.extend(map.values().copied());
                    }
                    Some(ManagedObject::Function(f)) => match f {
                        Function::User(uf) => {
                            enqueue_env(&uf.env, &mut visited_scopes, &mut pending_scopes);
                        }
                        Function::Bytecode(bf) => {
                            enqueue_env(&bf.env, &mut visited_scopes, &mut pending_scopes);
                            enqueue_chunk(
                                &bf.proto.chunk,
                                &mut visited_chunks,
                                &mut pending_chunks,
                            );
                        }
                        Function::Builtin(_) => {}
                    },
                    None => {}
                }
            } else if let Some(scope) = pending_scopes.pop() {
                let scope = scope.borrow();
                pending_values.extend(scope.bindings.values().map(|b| b.value));
                if let Some(parent) = &scope.parent {
                    enqueue_env(parent, &mut visited_scopes, &mut pending_scopes);
                }
            } else if let Some(chunk) = pending_chunks.pop() {
                pending_values.extend(chunk.constants.iter().copied());
                for proto in &chunk.functions {
                    enqueue_chunk(&proto.chunk, &mut visited_chunks, &mut pending_chunks);
                }
            }
        }
    }

    /// Drop unmarked slots, clear all marks, reset the live count.
    /// Returns the survivor count.
    pub fn sweep(&mut self) -> usize {
        let mut survivors = 0;
        for i in 0..self.objects.len() {
            if self.objects[i].is_some() {
                if self.is_marked(ObjectId(i)) {
                    survivors += 1;
                } else {
                    self.objects[i] = None;
                    self.free_list.push(i);
                }
            }
        }
        self.marks.clear();
        self.live_count = survivors;
        survivors
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}
