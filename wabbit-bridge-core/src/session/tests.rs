// Session Tests
//
// Drives the registry with a mock core that counts constructions,
// destructions and examples, and injects failures on request.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use proptest::prelude::*;

use super::*;
use crate::core::{LearningCore, LinearFactory};
use crate::error::{self, CoreFailure, ErrorKind, INCOMPLETE_TRANSLATION};
use crate::label::RawPrediction;

#[derive(Debug, Default)]
struct Counters {
    constructed: AtomicUsize,
    destroyed: AtomicUsize,
    read: AtomicUsize,
    released: AtomicUsize,
    learned: AtomicUsize,
}

impl Counters {
    fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn live_examples(&self) -> usize {
        Self::get(&self.read) - Self::get(&self.released)
    }

    fn live_cores(&self) -> usize {
        Self::get(&self.constructed) - Self::get(&self.destroyed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Fault {
    None,
    ReadAllocation,
    LearnRuntime,
    LearnPanic,
    LearnOpaquePanic,
    LearnUnrecognized,
    LearnBlocks,
    WrongShape,
    FinishRuntime,
}

impl Fault {
    fn parse(name: &str) -> Self {
        match name {
            "read-allocation" => Fault::ReadAllocation,
            "learn-runtime" => Fault::LearnRuntime,
            "learn-panic" => Fault::LearnPanic,
            "learn-opaque-panic" => Fault::LearnOpaquePanic,
            "learn-unrecognized" => Fault::LearnUnrecognized,
            "learn-blocks" => Fault::LearnBlocks,
            "wrong-shape" => Fault::WrongShape,
            "finish-runtime" => Fault::FinishRuntime,
            _ => Fault::None,
        }
    }
}

/// Mock core for testing
struct MockCore {
    counters: Arc<Counters>,
    gate: Arc<Barrier>,
    kind: LabelKind,
    fault: Fault,
    weight: f32,
}

struct MockExample {
    label: f32,
    features: f32,
}

impl MockCore {
    fn raw(&self, value: f32) -> RawPrediction {
        let scalar = RawPrediction::Scalar(value);
        let class = RawPrediction::Multiclass { class: value.round().max(1.0) as u32, scores: vec![] };
        match (self.kind, self.fault == Fault::WrongShape) {
            (LabelKind::Scalar, false) | (LabelKind::Multiclass, true) => scalar,
            (LabelKind::Multiclass, false) | (LabelKind::Scalar, true) => class,
        }
    }
}

impl LearningCore for MockCore {
    type Example = MockExample;

    fn label_kind(&self) -> LabelKind {
        self.kind
    }

    fn read_example(&mut self, text: &str) -> Result<MockExample, CoreFailure> {
        if self.fault == Fault::ReadAllocation {
            return Err(CoreFailure::allocation("out of example memory"));
        }
        let (head, body) =
            text.split_once('|').ok_or_else(|| CoreFailure::runtime("missing feature section"))?;
        let label = head.trim().parse().unwrap_or(0.0);
        let features = body.split_whitespace().count() as f32;

        self.counters.read.fetch_add(1, Ordering::SeqCst);
        Ok(MockExample { label, features })
    }

    fn learn(&mut self, example: &mut MockExample) -> Result<RawPrediction, CoreFailure> {
        match self.fault {
            Fault::LearnRuntime => return Err(CoreFailure::runtime("gradient overflow")),
            Fault::LearnUnrecognized => return Err(CoreFailure::unrecognized("status 77")),
            Fault::LearnPanic => panic!("weights diverged"),
            Fault::LearnOpaquePanic => std::panic::panic_any(42_u8),
            Fault::LearnBlocks => {
                self.gate.wait();
                self.gate.wait();
            }
            _ => {}
        }

        let predicted = self.weight * example.features;
        self.weight += 0.1 * (example.label - predicted);
        self.counters.learned.fetch_add(1, Ordering::SeqCst);
        Ok(self.raw(predicted))
    }

    fn predict(&mut self, example: &mut MockExample) -> Result<RawPrediction, CoreFailure> {
        Ok(self.raw(self.weight * example.features))
    }

    fn finish_example(&mut self, _example: &mut MockExample) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&mut self) -> Result<(), CoreFailure> {
        match self.fault {
            Fault::FinishRuntime => Err(CoreFailure::runtime("could not flush model")),
            _ => Ok(()),
        }
    }
}

impl Drop for MockCore {
    fn drop(&mut self) {
        self.counters.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockFactory {
    counters: Arc<Counters>,
    gate: Arc<Barrier>,
}

impl CoreFactory for MockFactory {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn construct(&self, config: &str) -> Result<Box<dyn ManagedSession>, CoreFailure> {
        let mut kind = LabelKind::Scalar;
        let mut fault = Fault::None;
        let mut tokens = config.split_whitespace();

        while let Some(token) = tokens.next() {
            match token {
                "--multiclass" => kind = LabelKind::Multiclass,
                "--construct-panic" => panic!("constructor failed"),
                "--fault" => fault = Fault::parse(tokens.next().unwrap_or_default()),
                other => return Err(CoreFailure::options(format!("unrecognised option '{other}'"))),
            }
        }

        self.counters.constructed.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Session::new(MockCore {
            counters: Arc::clone(&self.counters),
            gate: Arc::clone(&self.gate),
            kind,
            fault,
            weight: 0.0,
        })))
    }
}

fn setup() -> (SessionRegistry, MockFactory, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let factory = MockFactory { counters: Arc::clone(&counters), gate: Arc::new(Barrier::new(2)) };
    (SessionRegistry::new(), factory, counters)
}

#[test]
fn test_initialize_and_label_kind_stable() {
    let (registry, factory, _) = setup();
    let handle = registry.initialize(&factory, "--multiclass").unwrap();

    assert_ne!(handle.as_raw(), SessionHandle::NONE);
    assert_eq!(registry.label_kind(handle), Ok(LabelKind::Multiclass));
    registry.predict_or_learn(handle, "2 | a b", true).unwrap();
    assert_eq!(registry.label_kind(handle), Ok(LabelKind::Multiclass));
}

#[test]
fn test_handles_are_unique() {
    let (registry, factory, _) = setup();
    let first = registry.initialize(&factory, "").unwrap();
    let second = registry.initialize(&factory, "").unwrap();
    assert_ne!(first, second);
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_malformed_configuration_leaks_nothing() {
    let (registry, factory, counters) = setup();
    let err = registry.initialize(&factory, "--bad").unwrap_err();

    assert_eq!(err.kind, ErrorKind::InvalidConfiguration);
    assert!(registry.is_empty());
    assert_eq!(counters.live_cores(), 0);
}

#[test]
fn test_examples_released_on_success() {
    let (registry, factory, counters) = setup();
    let handle = registry.initialize(&factory, "").unwrap();

    for _ in 0..5 {
        registry.predict_or_learn(handle, "1 | a b", true).unwrap();
        registry.predict_or_learn(handle, "| a b", false).unwrap();
    }

    assert_eq!(Counters::get(&counters.read), 10);
    assert_eq!(counters.live_examples(), 0);
}

#[test]
fn test_examples_released_when_learning_fails() {
    let (registry, factory, counters) = setup();
    let handle = registry.initialize(&factory, "--fault learn-runtime").unwrap();

    let err = registry.predict_or_learn(handle, "1 | a b", true).unwrap_err();
    assert_eq!(err.kind, ErrorKind::RuntimeFailure);
    assert_eq!(err.message, "gradient overflow");
    assert_eq!(Counters::get(&counters.read), 1);
    assert_eq!(counters.live_examples(), 0);
    assert_eq!(registry.info(handle).unwrap().examples, 0);
}

#[test]
fn test_allocation_failure_during_decode() {
    let (registry, factory, counters) = setup();
    let handle = registry.initialize(&factory, "--fault read-allocation").unwrap();

    let err = registry.predict_or_learn(handle, "1 | a", true).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ResourceExhausted);
    assert!(err.kind.is_retryable());
    assert_eq!(Counters::get(&counters.read), 0);
    assert_eq!(Counters::get(&counters.released), 0);
}

#[test]
fn test_malformed_example() {
    let (registry, factory, counters) = setup();
    let handle = registry.initialize(&factory, "").unwrap();

    let err = registry.predict_or_learn(handle, "no bar here", false).unwrap_err();
    assert_eq!(err.kind, ErrorKind::RuntimeFailure);
    assert_eq!(counters.live_examples(), 0);

    // the session stays usable
    assert!(registry.predict_or_learn(handle, "| a", false).is_ok());
}

#[test]
fn test_unrecognized_failure_is_unknown() {
    let (registry, factory, counters) = setup();
    let handle = registry.initialize(&factory, "--fault learn-unrecognized").unwrap();

    let err = registry.predict_or_learn(handle, "1 | a", true).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownFailure);
    assert!(err.message.contains(INCOMPLETE_TRANSLATION));
    assert_eq!(counters.live_examples(), 0);
}

#[test]
fn test_wrong_prediction_shape_is_reported() {
    let (registry, factory, counters) = setup();

    for config in ["--fault wrong-shape", "--multiclass --fault wrong-shape"] {
        let handle = registry.initialize(&factory, config).unwrap();
        let err = registry.predict_or_learn(handle, "1 | a", false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RuntimeFailure, "{config}");
    }
    assert_eq!(counters.live_examples(), 0);
}

#[test]
fn test_multiclass_session_extracts_class() {
    let (registry, factory, _) = setup();
    let handle = registry.initialize(&factory, "--multiclass").unwrap();

    // untrained weight predicts class 1
    assert_eq!(registry.predict_or_learn(handle, "| a b", false), Ok(1.0));
}

#[test]
fn test_panic_releases_example_and_poisons_session() {
    let (registry, factory, counters) = setup();
    let handle = registry.initialize(&factory, "--fault learn-panic").unwrap();

    let err = error::guard("predict_or_learn", || registry.predict_or_learn(handle, "1 | a", true))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::RuntimeFailure);
    assert!(err.message.contains("weights diverged"));
    assert_eq!(counters.live_examples(), 0);

    let err = registry.predict_or_learn(handle, "| a", false).unwrap_err();
    assert_eq!(err.kind, ErrorKind::RuntimeFailure);
    assert!(err.message.contains("inconsistent"));

    registry.close(handle).unwrap();
    assert_eq!(counters.live_cores(), 0);
}

#[test]
fn test_opaque_panic_is_unknown() {
    let (registry, factory, counters) = setup();
    let handle = registry.initialize(&factory, "--fault learn-opaque-panic").unwrap();

    let err = error::guard("predict_or_learn", || registry.predict_or_learn(handle, "1 | a", true))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownFailure);
    assert_eq!(counters.live_examples(), 0);
}

#[test]
fn test_busy_session_is_rejected() {
    let (registry, factory, _) = setup();
    let gate = Arc::clone(&factory.gate);
    let handle = registry.initialize(&factory, "--fault learn-blocks").unwrap();

    std::thread::scope(|scope| {
        let worker = scope.spawn(|| registry.predict_or_learn(handle, "1 | a", true));

        // the worker is now inside the core
        gate.wait();
        let err = registry.predict_or_learn(handle, "| a", false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RuntimeFailure);
        assert!(err.message.contains("serialized"));

        let err = registry.close(handle).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RuntimeFailure);
        gate.wait();

        assert!(worker.join().unwrap().is_ok());
    });

    registry.close(handle).unwrap();
}

#[test]
fn test_close_then_use_is_reported() {
    let (registry, factory, counters) = setup();
    let handle = registry.initialize(&factory, "").unwrap();
    registry.close(handle).unwrap();
    assert_eq!(counters.live_cores(), 0);

    let err = registry.predict_or_learn(handle, "1 | a", true).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidHandle);
    assert!(err.message.contains("has been closed"));

    let err = registry.close(handle).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidHandle);
    assert_eq!(Counters::get(&counters.destroyed), 1);
}

#[test]
fn test_unknown_handles() {
    let (registry, _, _) = setup();

    for raw in [SessionHandle::NONE, 999] {
        let err = registry.predict_or_learn(SessionHandle::from_raw(raw), "| a", false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidHandle);
        assert!(err.message.contains("unknown session handle"));
    }
}

#[test]
fn test_close_reports_finish_failure_and_still_releases() {
    let (registry, factory, counters) = setup();
    let handle = registry.initialize(&factory, "--fault finish-runtime").unwrap();

    let err = registry.close(handle).unwrap_err();
    assert_eq!(err.kind, ErrorKind::RuntimeFailure);
    assert!(registry.is_empty());
    assert_eq!(counters.live_cores(), 0);
}

#[test]
fn test_session_limit() {
    let counters = Arc::new(Counters::default());
    let factory = MockFactory { counters: Arc::clone(&counters), gate: Arc::new(Barrier::new(2)) };
    let registry = SessionRegistry::with_max_sessions(1);

    let handle = registry.initialize(&factory, "").unwrap();
    let err = registry.initialize(&factory, "").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ResourceExhausted);
    assert_eq!(counters.live_cores(), 1);

    registry.close(handle).unwrap();
    assert!(registry.initialize(&factory, "").is_ok());
}

#[test]
fn test_session_limit_holds_under_concurrent_initialize() {
    const THREADS: usize = 8;
    let registry = SessionRegistry::with_max_sessions(1);
    let start = Barrier::new(THREADS);

    let results: Vec<_> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    start.wait();
                    registry.initialize(&LinearFactory, "--quiet -b 12")
                })
            })
            .collect();

        workers.into_iter().map(|worker| worker.join().unwrap()).collect()
    });

    let (admitted, rejected): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    assert_eq!(admitted.len(), 1);
    assert!(rejected.iter().all(|result| {
        matches!(result, Err(err) if err.kind == ErrorKind::ResourceExhausted)
    }));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_failed_construction_frees_its_slot() {
    let (_, factory, counters) = setup();
    let registry = SessionRegistry::with_max_sessions(1);

    let err = registry.initialize(&factory, "--bad").unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidConfiguration);

    let err = error::guard("initialize", || registry.initialize(&factory, "--construct-panic"))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::RuntimeFailure);

    let handle = registry.initialize(&factory, "").unwrap();
    registry.close(handle).unwrap();
    assert!(registry.initialize(&factory, "").is_ok());
    assert_eq!(counters.live_cores(), 1);
}

#[test]
fn test_predict_is_side_effect_free() {
    let (registry, factory, counters) = setup();
    let handle = registry.initialize(&factory, "").unwrap();
    registry.predict_or_learn(handle, "4 | a b", true).unwrap();

    let first = registry.predict_or_learn(handle, "| a b", false).unwrap();
    let second = registry.predict_or_learn(handle, "| a b", false).unwrap();
    assert_eq!(first, second);
    assert_eq!(Counters::get(&counters.learned), 1);
}

#[test]
fn test_session_info() {
    let (registry, factory, _) = setup();
    let first = registry.initialize(&factory, "").unwrap();
    let second = registry.initialize(&factory, "--multiclass").unwrap();
    registry.predict_or_learn(second, "1 | a", true).unwrap();

    let sessions = registry.list();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].handle, first);
    assert_eq!(sessions[0].core, "mock");
    assert_eq!(sessions[1].label_kind, LabelKind::Multiclass);
    assert_eq!(sessions[1].examples, 1);
}

#[test]
fn test_registry_drop_closes_sessions() {
    let (registry, factory, counters) = setup();
    registry.initialize(&factory, "").unwrap();
    registry.initialize(&factory, "").unwrap();
    assert_eq!(counters.live_cores(), 2);

    drop(registry);
    assert_eq!(counters.live_cores(), 0);
}

#[test]
fn test_scalar_scenario_with_builtin_core() {
    let registry = SessionRegistry::new();
    let handle = registry.initialize(&LinearFactory, "--label scalar --quiet").unwrap();

    let learned = registry.predict_or_learn(handle, "1 | a b", true).unwrap();
    let predicted = registry.predict_or_learn(handle, "1 | a b", false).unwrap();
    let again = registry.predict_or_learn(handle, "1 | a b", false).unwrap();
    assert_eq!(learned, 0.0);
    assert!(predicted > learned);
    assert_eq!(predicted, again);

    registry.close(handle).unwrap();
    let err = registry.predict_or_learn(handle, "1 | a b", false).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidHandle);
}

#[test]
fn test_overflowing_values_leave_session_intact() {
    let registry = SessionRegistry::new();
    let handle = registry.initialize(&LinearFactory, "--quiet").unwrap();

    for text in ["1e39 | a", "1 | a:1e39", "1 1e39 | a"] {
        let err = registry.predict_or_learn(handle, text, true).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RuntimeFailure, "{text}");
    }

    assert_eq!(registry.predict_or_learn(handle, "| a", false), Ok(0.0));
    assert_eq!(registry.predict_or_learn(handle, "| zzz", false), Ok(0.0));
}

proptest! {
    #[test]
    fn prop_arbitrary_text_never_leaks(text in ".{0,64}", learn in any::<bool>()) {
        let (registry, factory, counters) = setup();
        let handle = registry.initialize(&factory, "").unwrap();
        let _ = registry.predict_or_learn(handle, &text, learn);
        prop_assert_eq!(counters.live_examples(), 0);
    }

    #[test]
    fn prop_builtin_core_reports_instead_of_panicking(text in "[0-9a-z:|' .-]{0,48}", learn in any::<bool>()) {
        let registry = SessionRegistry::new();
        let handle = registry.initialize(&LinearFactory, "--oaa 3 -b 8 --quiet").unwrap();
        let result = error::guard("predict_or_learn", || registry.predict_or_learn(handle, &text, learn));
        if let Err(err) = result {
            prop_assert_eq!(err.kind, ErrorKind::RuntimeFailure);
            prop_assert!(!err.message.contains("panicked"), "{}", err.message);
        }
    }
}
