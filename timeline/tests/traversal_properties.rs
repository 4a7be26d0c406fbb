//! Property tests for traversal order and repetition over generated trees.

use proptest::prelude::*;
use serde_json::{Value, json};
use timeline::core::factory::ChunkFactory;
use timeline::data::InMemoryDataStore;
use timeline::definition::{ChunkDefinition, Entry, ExperimentDefinition, TrialDefinition};
use timeline::test_support::{drive, echo_registry};

#[derive(Debug, Clone)]
enum Shape {
    Block(usize),
    Linear(Vec<Shape>),
}

fn shape() -> impl Strategy<Value = Shape> {
    let leaf = (1usize..4).prop_map(Shape::Block);
    leaf.prop_recursive(4, 32, 4, |inner| {
        prop::collection::vec(inner, 1..4).prop_map(Shape::Linear)
    })
}

/// Entry for `shape`, appending the stimuli it will produce to `expected`.
fn entry(shape: &Shape, expected: &mut Vec<String>) -> Entry {
    match shape {
        Shape::Block(n) => {
            let stimuli: Vec<Value> = (0..*n)
                .map(|i| {
                    let stimulus = format!("s{}", expected.len() + i);
                    json!(stimulus)
                })
                .collect();
            expected.extend(
                stimuli
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string),
            );
            TrialDefinition::new("p").param("stimuli", stimuli).into()
        }
        Shape::Linear(children) => ChunkDefinition::linear(
            children.iter().map(|child| entry(child, expected)).collect(),
        )
        .into(),
    }
}

proptest! {
    #[test]
    fn visits_every_trial_once_in_declared_order(shapes in prop::collection::vec(shape(), 1..4)) {
        let mut expected = Vec::new();
        let entries = shapes.iter().map(|shape| entry(shape, &mut expected)).collect();
        let registry = echo_registry(&["p"]);
        let mut timeline = ChunkFactory::new(&registry)
            .build(&ExperimentDefinition::new(entries))
            .expect("build");
        prop_assert_eq!(timeline.length(), expected.len());

        let mut store = InMemoryDataStore::new();
        let delivered = drive(&mut timeline, &mut store, 10_000).expect("drive");
        let stimuli: Vec<String> = delivered.into_iter().map(|d| d.stimulus).collect();
        prop_assert_eq!(stimuli, expected);
        prop_assert!(timeline.is_complete(&store));
    }

    #[test]
    fn while_body_runs_once_per_requested_pass(body in shape(), passes in 1usize..5) {
        let mut expected = Vec::new();
        let body = entry(&body, &mut expected);
        let registry = echo_registry(&["p"]);
        let done = std::sync::atomic::AtomicUsize::new(0);
        let definition = ExperimentDefinition::new(vec![
            ChunkDefinition::repeat_while(vec![body], move |_| {
                done.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1 < passes
            })
            .into(),
        ]);
        let mut timeline = ChunkFactory::new(&registry)
            .build(&definition)
            .expect("build");

        let mut store = InMemoryDataStore::new();
        let delivered = drive(&mut timeline, &mut store, 10_000).expect("drive");
        prop_assert_eq!(delivered.len(), expected.len() * passes);
        prop_assert_eq!(timeline.length(), expected.len());

        let last_pass = format!("0-0.0-{}", passes - 1);
        let last = delivered.last().expect("at least one trial");
        prop_assert!(last.chunk_id.starts_with(&last_pass));
    }
}
