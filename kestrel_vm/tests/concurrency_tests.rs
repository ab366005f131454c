//! Multi-threaded tests: one call site hammered from several threads while the
//! classes it has specialized for are mutated.

use kestrel_core::intern;
use kestrel_runtime::{PyClass, PyInstance, ShapeRegistry, Value};
use kestrel_vm::{IcConfig, IcManager, SiteId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

const READERS: usize = 6;
const CLASSES: usize = 5;
const WRITES: i64 = 2_000;

#[test]
fn test_concurrent_reads_with_class_mutation() {
    let registry = Arc::new(ShapeRegistry::new());
    let config = IcConfig::new().with_max_chain_depth(3).unwrap();
    let manager = Arc::new(IcManager::new(config));
    let name = intern("counter");
    let id = SiteId::new(1, 0);

    let classes: Vec<Arc<PyClass>> = (0..CLASSES)
        .map(|i| {
            let class = PyClass::new(intern(&format!("Worker{}", i)), None, &registry);
            class.set_attr(name.clone(), Value::Int(0), &registry);
            class
        })
        .collect();
    let receivers: Arc<Vec<Value>> = Arc::new(
        classes
            .iter()
            .map(|class| Value::Instance(PyInstance::new(Arc::clone(class), &registry)))
            .collect(),
    );
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..READERS)
        .map(|reader| {
            let manager = Arc::clone(&manager);
            let receivers = Arc::clone(&receivers);
            let done = Arc::clone(&done);
            let name = name.clone();
            thread::spawn(move || {
                // Values written per class only grow, so each reader must see
                // a non-decreasing sequence per class.
                let mut last_seen = [0i64; CLASSES];
                let mut reads = 0u64;
                let mut index = reader;
                while !done.load(Ordering::Acquire) || reads < 1_000 {
                    let slot = index % CLASSES;
                    let value = manager
                        .load_attr(id, &name, &receivers[slot])
                        .expect("attribute is always defined");
                    let current = value.as_int().expect("counter stays an int");
                    assert!(
                        current >= last_seen[slot],
                        "class {} went back from {} to {}",
                        slot,
                        last_seen[slot],
                        current
                    );
                    last_seen[slot] = current;
                    reads += 1;
                    index += 1;
                }
                reads
            })
        })
        .collect();

    let writer = {
        let registry = Arc::clone(&registry);
        let classes = classes.clone();
        let name = name.clone();
        thread::spawn(move || {
            for value in 1..=WRITES {
                let class = &classes[(value as usize) % CLASSES];
                class.set_attr(name.clone(), Value::Int(value), &registry);
                // Periodically change the class layout to force invalidation.
                if value % 97 == 0 {
                    class.set_attr(intern(&format!("extra_{}", value)), Value::None, &registry);
                }
            }
        })
    };

    writer.join().unwrap();
    done.store(true, Ordering::Release);
    let total: u64 = readers.into_iter().map(|r| r.join().unwrap()).sum();
    assert!(total >= (READERS as u64) * 1_000);

    // Final values are visible through the cache.
    for (i, class) in classes.iter().enumerate() {
        let expected = class.get_own_attr(&name).unwrap();
        assert_eq!(manager.load_attr(id, &name, &receivers[i]), Ok(expected));
    }

    let site = manager.get(id).unwrap();
    assert!(site.state().cached_len() <= 3);
}

#[test]
fn test_racing_specialization_keeps_bounds() {
    let registry = Arc::new(ShapeRegistry::new());
    let config = IcConfig::new().with_max_chain_depth(2).unwrap();
    let manager = Arc::new(IcManager::new(config));
    let name = intern("v");
    let id = SiteId::new(9, 9);

    let receivers: Arc<Vec<(Value, i64)>> = Arc::new(
        (0..8)
            .map(|i| {
                let class = PyClass::new(intern(&format!("R{}", i)), None, &registry);
                class.set_attr(name.clone(), Value::Int(i), &registry);
                (Value::Instance(PyInstance::new(class, &registry)), i)
            })
            .collect(),
    );

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let manager = Arc::clone(&manager);
            let receivers = Arc::clone(&receivers);
            let name = name.clone();
            thread::spawn(move || {
                for round in 0..500 {
                    let (receiver, expected) = &receivers[(t + round) % receivers.len()];
                    assert_eq!(
                        manager.load_attr(id, &name, receiver),
                        Ok(Value::Int(*expected))
                    );
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let state = manager.get(id).unwrap().state();
    assert!(state.cached_len() <= 2);
    assert!(state.is_generic());
}

#[test]
fn test_concurrent_superclass_rewiring() {
    let registry = Arc::new(ShapeRegistry::new());
    let manager = Arc::new(IcManager::default());
    let name = intern("origin");
    let id = SiteId::new(3, 0);

    let left = PyClass::new(intern("Left"), None, &registry);
    let right = PyClass::new(intern("Right"), None, &registry);
    left.set_attr(name.clone(), Value::str("left"), &registry);
    right.set_attr(name.clone(), Value::str("right"), &registry);
    let middle = PyClass::new(intern("Middle"), Some(Arc::clone(&left)), &registry);
    let leaf = PyClass::new(intern("Leaf"), Some(Arc::clone(&middle)), &registry);
    let receiver = Value::Instance(PyInstance::new(leaf, &registry));
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let receiver = receiver.clone();
            let done = Arc::clone(&done);
            let name = name.clone();
            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    let value = manager.load_attr(id, &name, &receiver).unwrap();
                    assert!(value == Value::str("left") || value == Value::str("right"));
                }
            })
        })
        .collect();

    for round in 0..500 {
        let base = if round % 2 == 0 { &right } else { &left };
        middle.set_superclass(Some(Arc::clone(base))).unwrap();
    }
    done.store(true, Ordering::Release);
    for reader in readers {
        reader.join().unwrap();
    }

    // Last assignment was `left`.
    assert_eq!(manager.load_attr(id, &name, &receiver), Ok(Value::str("left")));
}

#[test]
fn test_generic_survives_concurrent_pruning() {
    let registry = Arc::new(ShapeRegistry::new());
    let config = IcConfig::new().with_max_chain_depth(1).unwrap();
    let manager = Arc::new(IcManager::new(config));
    let name = intern("v");
    let id = SiteId::new(4, 2);

    let classes: Vec<Arc<PyClass>> = (0..CLASSES)
        .map(|i| {
            let class = PyClass::new(intern(&format!("Churn{}", i)), None, &registry);
            class.set_attr(name.clone(), Value::Int(i as i64), &registry);
            class
        })
        .collect();
    let receivers: Arc<Vec<Value>> = Arc::new(
        classes
            .iter()
            .map(|class| Value::Instance(PyInstance::new(Arc::clone(class), &registry)))
            .collect(),
    );
    let site = manager.site(id, &name).unwrap();
    let done = Arc::new(AtomicBool::new(false));
    let readers_done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..READERS)
        .map(|reader| {
            let manager = Arc::clone(&manager);
            let receivers = Arc::clone(&receivers);
            let done = Arc::clone(&done);
            let name = name.clone();
            thread::spawn(move || {
                let mut index = reader;
                let mut reads = 0u64;
                while !done.load(Ordering::Acquire) || reads < 1_000 {
                    let slot = index % CLASSES;
                    assert_eq!(
                        manager.load_attr(id, &name, &receivers[slot]),
                        Ok(Value::Int(slot as i64))
                    );
                    reads += 1;
                    index += 1;
                }
            })
        })
        .collect();

    let observer = {
        let site = Arc::clone(&site);
        let readers_done = Arc::clone(&readers_done);
        thread::spawn(move || {
            let mut generic_since = None;
            let mut samples = 0u64;
            let mut finished = false;
            while !finished {
                finished = readers_done.load(Ordering::Acquire);
                let state = site.state();
                assert!(state.cached_len() <= 1);
                match generic_since {
                    Some(sample) => assert!(
                        state.is_generic(),
                        "site left Generic after sample {}: {:?}",
                        sample,
                        state
                    ),
                    None if state.is_generic() => generic_since = Some(samples),
                    None => {}
                }
                samples += 1;
            }
        })
    };

    // Every class keeps changing layout, so cached nodes keep going stale.
    for round in 0..WRITES {
        let class = &classes[(round as usize) % CLASSES];
        class.set_attr(intern(&format!("extra_{}", round)), Value::None, &registry);
    }
    done.store(true, Ordering::Release);
    for reader in readers {
        reader.join().unwrap();
    }
    readers_done.store(true, Ordering::Release);
    observer.join().unwrap();

    // More classes than the limit always end in Generic.
    for (slot, receiver) in receivers.iter().enumerate() {
        assert_eq!(site.read(receiver), Ok(Value::Int(slot as i64)));
    }
    assert!(site.state().is_generic());
}
