use pebbl_runtime::{ObjectId, Value};
use proptest::prelude::*;

fn classification(v: Value) -> [bool; 6] {
    [
        v.is_double(),
        v.is_int32(),
        v.is_bool(),
        v.is_nil(),
        v.is_undefined(),
        v.is_gc_ptr(),
    ]
}

fn exactly_one(v: Value) -> bool {
    classification(v).iter().filter(|&&x| x).count() == 1
}

proptest! {
    #[test]
    fn doubles_classify_exclusively_and_round_trip(f in any::<f64>()) {
        let v = Value::from_f64(f);
        prop_assert!(exactly_one(v));
        prop_assert!(v.is_double());
        if f.is_nan() {
            prop_assert!(v.as_f64().is_nan());
        } else {
            prop_assert_eq!(v.as_f64().to_bits(), f.to_bits());
        }
    }

    #[test]
    fn int32_classifies_exclusively_and_round_trips(i in any::<i32>()) {
        let v = Value::from_i32(i);
        prop_assert!(exactly_one(v));
        prop_assert!(v.is_int32());
        prop_assert_eq!(v.as_i32(), i);
    }

    #[test]
    fn gc_payload_round_trips(id in 0usize..(1usize << 47)) {
        let v = Value::gc_ptr(ObjectId(id));
        prop_assert!(exactly_one(v));
        prop_assert!(v.is_gc_ptr());
        prop_assert_eq!(v.as_object_id(), ObjectId(id));
    }

    #[test]
    fn int_double_cross_equality(i in any::<i32>()) {
        let a = Value::from_i32(i);
        let b = Value::from_f64(i as f64);
        prop_assert!(a.equals(b));
        prop_assert!(b.equals(a));
    }

    #[test]
    fn int_arithmetic_stays_int32_in_range(a in -10_000i32..10_000, b in -10_000i32..10_000) {
        let va = Value::from_i32(a);
        let vb = Value::from_i32(b);
        let sum = va.add(vb).unwrap();
        prop_assert!(sum.is_int32());
        prop_assert_eq!(sum.as_i32(), a + b);
        let prod = va.mul(vb).unwrap();
        prop_assert!(prod.is_int32());
        prop_assert_eq!(prod.as_i32(), a * b);
    }

    #[test]
    fn mixed_arithmetic_widens(a in any::<i32>(), b in -1.0e9f64..1.0e9) {
        let r = Value::from_i32(a).add(Value::from_f64(b)).unwrap();
        prop_assert!(r.is_double());
        prop_assert_eq!(r.as_f64(), a as f64 + b);
    }
}

#[test]
fn immediates_classify_exclusively() {
    for v in [Value::NIL, Value::UNDEFINED, Value::TRUE, Value::FALSE] {
        assert!(exactly_one(v));
    }
    assert!(Value::NIL.is_nil());
    assert!(Value::UNDEFINED.is_undefined());
    assert!(Value::TRUE.is_bool() && Value::TRUE.as_bool());
    assert!(Value::FALSE.is_bool() && !Value::FALSE.as_bool());
}

#[test]
fn truthiness_table() {
    assert!(!Value::FALSE.is_truthy());
    assert!(!Value::NIL.is_truthy());
    assert!(!Value::from_i32(0).is_truthy());
    assert!(!Value::from_f64(0.0).is_truthy());
    assert!(!Value::from_f64(-0.0).is_truthy());
    assert!(Value::TRUE.is_truthy());
    assert!(Value::from_i32(-1).is_truthy());
    assert!(Value::from_f64(f64::NAN).is_truthy());
    assert!(Value::gc_ptr(ObjectId(0)).is_truthy());
    assert!(Value::UNDEFINED.is_truthy());
}

#[test]
fn nil_equality_and_variant_mismatches() {
    assert!(Value::NIL.equals(Value::NIL));
    assert!(!Value::NIL.equals(Value::from_i32(0)));
    assert!(!Value::FALSE.equals(Value::from_i32(0)));
    assert!(!Value::TRUE.equals(Value::from_i32(1)));
    assert!(Value::gc_ptr(ObjectId(3)).equals(Value::gc_ptr(ObjectId(3))));
    assert!(!Value::gc_ptr(ObjectId(3)).equals(Value::gc_ptr(ObjectId(4))));
}
