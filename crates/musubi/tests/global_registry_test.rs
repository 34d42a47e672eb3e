//! The process-wide registry can only be installed once, so this lives in
//! its own test binary.

use musubi::prelude::*;
use musubi::registry;
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_global_registry_installs_once() {
    assert!(Workflows::global().is_err());

    let mut first = Registry::new();
    assert_ok!(first.register(
        "double",
        StepGraph::new([StepDefinition::new("double")]).expect("valid graph"),
        [(
            "double",
            HandlerBinding::new(invoke_fn(|input: Value| async move {
                let n = input["n"].as_i64().unwrap_or_default();
                Ok::<_, HandlerError>(json!(n * 2))
            }))
            .with_input([AliasRef::input("n").field("n")]),
        )],
    ));
    let installed = assert_ok!(registry::install(first));
    assert!(installed.contains("double"));

    let error = assert_err!(registry::install(Registry::new()));
    assert!(matches!(error, WorkflowError::Configuration(_)));

    let workflows = assert_ok!(Workflows::global());
    let output = assert_ok!(workflows.run("double", json!({ "n": 21 })).await);
    assert_eq!(output, json!(42));
}
