use std::rc::Rc;

use pebbl_ir::FuncDecl;
use pebbl_runtime::{
    BytecodeFunction, Chunk, Env, FunctionProto, Function, Heap, INITIAL_GC_THRESHOLD,
    ManagedObject, ObjectId, UserFunction, Value, fast_map_new,
};

fn alloc_str(heap: &mut Heap, s: &str) -> ObjectId {
    heap.alloc(ManagedObject::Str(s.to_string()))
}

#[test]
fn unreachable_objects_are_swept() {
    let mut heap = Heap::new();
    for i in 0..5 {
        alloc_str(&mut heap, &format!("s{i}"));
    }
    assert_eq!(heap.live_count(), 5);
    heap.collect(&[], &[], &[]);
    assert_eq!(heap.live_count(), 0);
}

#[test]
fn rooted_objects_survive_and_marks_clear() {
    let mut heap = Heap::new();
    let a = alloc_str(&mut heap, "keep");
    let _b = alloc_str(&mut heap, "drop");
    heap.collect(&[Value::gc_ptr(a)], &[], &[]);
    assert_eq!(heap.live_count(), 1);
    assert!(!heap.is_marked(a));
    match heap.get(a) {
        ManagedObject::Str(s) => assert_eq!(s, "keep"),
        _ => panic!("wrong kind"),
    }
}

#[test]
fn repeated_collect_is_idempotent() {
    let mut heap = Heap::new();
    let roots: Vec<Value> = (0..4)
        .map(|i| Value::gc_ptr(alloc_str(&mut heap, &format!("s{i}"))))
        .collect();
    heap.collect(&roots, &[], &[]);
    let after_first = heap.live_count();
    heap.collect(&roots, &[], &[]);
    assert_eq!(heap.live_count(), after_first);
    heap.collect(&roots, &[], &[]);
    assert_eq!(heap.live_count(), after_first);
}

#[test]
fn threshold_is_twice_survivors_with_a_floor() {
    let mut heap = Heap::new();
    heap.collect(&[], &[], &[]);
    assert_eq!(heap.threshold(), INITIAL_GC_THRESHOLD);

    let roots: Vec<Value> = (0..10)
        .map(|i| Value::gc_ptr(alloc_str(&mut heap, &format!("s{i}"))))
        .collect();
    heap.collect(&roots, &[], &[]);
    assert_eq!(heap.threshold(), 20);

    heap.collect(&roots[..2], &[], &[]);
    assert_eq!(heap.threshold(), INITIAL_GC_THRESHOLD.max(4));
}

#[test]
fn should_collect_arms_at_threshold() {
    let mut heap = Heap::new();
    for i in 0..INITIAL_GC_THRESHOLD - 1 {
        alloc_str(&mut heap, &format!("s{i}"));
    }
    assert!(!heap.should_collect());
    alloc_str(&mut heap, "tip");
    assert!(heap.should_collect());
}

#[test]
fn swept_slots_are_reused() {
    let mut heap = Heap::new();
    let a = alloc_str(&mut heap, "first");
    heap.collect(&[], &[], &[]);
    let b = alloc_str(&mut heap, "second");
    assert_eq!(a, b);
    assert_eq!(heap.live_count(), 1);
}

#[test]
fn arrays_and_dicts_trace_their_values() {
    let mut heap = Heap::new();
    let inner = alloc_str(&mut heap, "inner");
    let arr = heap.alloc(ManagedObject::Array(vec![Value::gc_ptr(inner)]));
    let mut map = fast_map_new();
    let dict_val = alloc_str(&mut heap, "dv");
    map.insert("k".to_string(), Value::gc_ptr(dict_val));
    let dict = heap.alloc(ManagedObject::Dict(map));
    let _garbage = alloc_str(&mut heap, "garbage");

    heap.collect(&[Value::gc_ptr(arr), Value::gc_ptr(dict)], &[], &[]);
    assert_eq!(heap.live_count(), 4);
    match heap.get(inner) {
        ManagedObject::Str(s) => assert_eq!(s, "inner"),
        _ => panic!("inner was collected"),
    }
}

#[test]
fn environment_chains_are_roots() {
    let mut heap = Heap::new();
    let global = Env::new();
    let child = global.child();
    let in_global = alloc_str(&mut heap, "g");
    let in_child = alloc_str(&mut heap, "c");
    global.define("g", Value::gc_ptr(in_global), true);
    child.define("c", Value::gc_ptr(in_child), true);
    let _garbage = alloc_str(&mut heap, "x");

    // Marking from the child alone must reach the parent chain too.
    heap.collect(&[], &[&child], &[]);
    assert_eq!(heap.live_count(), 2);
}

#[test]
fn closures_keep_their_environment_alive() {
    let mut heap = Heap::new();
    let captured_env = Env::new();
    let captured = alloc_str(&mut heap, "captured");
    captured_env.define("x", Value::gc_ptr(captured), false);

    let func = heap.alloc(ManagedObject::Function(Function::User(Rc::new(
        UserFunction {
            decl: FuncDecl {
                name: "f".to_string(),
                params: Box::new([]),
                body: Box::new([]),
            },
            env: captured_env,
        },
    ))));

    heap.collect(&[Value::gc_ptr(func)], &[], &[]);
    assert_eq!(heap.live_count(), 2);
    match heap.get(captured) {
        ManagedObject::Str(s) => assert_eq!(s, "captured"),
        _ => panic!("captured value was collected"),
    }
}

#[test]
fn bytecode_functions_keep_chunk_constants_alive() {
    let mut heap = Heap::new();
    let constant = alloc_str(&mut heap, "pooled");
    let mut chunk = Chunk::new();
    chunk.add_constant(Value::gc_ptr(constant));
    let func = heap.alloc(ManagedObject::Function(Function::Bytecode(Rc::new(
        BytecodeFunction {
            proto: Rc::new(FunctionProto {
                name: "f".to_string(),
                params: Box::new([]),
                chunk: Rc::new(chunk),
            }),
            env: Env::new(),
        },
    ))));

    heap.collect(&[Value::gc_ptr(func)], &[], &[]);
    assert_eq!(heap.live_count(), 2);
}

#[test]
fn executing_chunks_root_their_pools() {
    let mut heap = Heap::new();
    let constant = alloc_str(&mut heap, "pooled");
    let mut chunk = Chunk::new();
    chunk.add_constant(Value::gc_ptr(constant));
    let chunk = Rc::new(chunk);

    heap.collect(&[], &[], &[&chunk]);
    assert_eq!(heap.live_count(), 1);
}

#[test]
fn deep_object_graphs_do_not_recurse() {
    // A list-of-list chain far deeper than any host stack budget.
    let mut heap = Heap::new();
    let mut head = heap.alloc(ManagedObject::Array(Vec::new()));
    for _ in 0..200_000 {
        head = heap.alloc(ManagedObject::Array(vec![Value::gc_ptr(head)]));
    }
    heap.collect(&[Value::gc_ptr(head)], &[], &[]);
    assert_eq!(heap.live_count(), 200_001);
}
