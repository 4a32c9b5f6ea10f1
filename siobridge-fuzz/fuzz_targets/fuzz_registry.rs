#![no_main]

use libfuzzer_sys::fuzz_target;
use siobridge::registry::{Owner, ValueRegistry};
use siobridge::{Handle, Value};

// Each input byte pair is one registry operation on a private registry.
// Whatever the sequence, destroying every caller-owned handle at the end
// must leave the registry empty.
fuzz_target!(|data: &[u8]| {
    let registry = ValueRegistry::new();
    let mut handles: Vec<Handle> = Vec::new();

    let pick = |handles: &[Handle], b: u8| -> Option<Handle> {
        if handles.is_empty() {
            None
        } else {
            Some(handles[usize::from(b) % handles.len()])
        }
    };

    for op in data.chunks(2) {
        let arg = op.get(1).copied().unwrap_or(0);
        match op[0] % 10 {
            0 => handles.push(registry.insert(Value::array())),
            1 => handles.push(registry.insert(Value::object())),
            2 => handles.push(registry.insert(Value::integer(i64::from(arg)))),
            3 => handles.push(registry.insert(Value::string(format!("s{arg}")))),
            4 => {
                if let (Some(a), Some(b)) = (pick(&handles, arg), pick(&handles, arg / 3)) {
                    registry.push(a, b);
                }
            }
            5 => {
                if let (Some(a), Some(b)) = (pick(&handles, arg), pick(&handles, arg / 5)) {
                    registry.set(a, &format!("k{}", arg % 4), b);
                }
            }
            6 => {
                if let Some(h) = pick(&handles, arg) {
                    if let Some(view) = registry.array_get(h, usize::from(arg % 4)) {
                        handles.push(view);
                    }
                }
            }
            7 => {
                if let Some(h) = pick(&handles, arg) {
                    if let Some(view) = registry.object_get(h, &format!("k{}", arg % 4)) {
                        handles.push(view);
                    }
                }
            }
            8 => {
                if let Some(h) = pick(&handles, arg) {
                    registry.destroy(h);
                }
            }
            _ => {
                if let Some(h) = pick(&handles, arg) {
                    let _ = registry.string_ptr(h);
                    let _ = registry.object_key_ptr(h, usize::from(arg % 4));
                }
            }
        }
    }

    for handle in handles {
        if registry.owner(handle) == Some(Owner::Caller) {
            registry.destroy(handle);
        }
    }
    assert!(registry.is_empty());
});
