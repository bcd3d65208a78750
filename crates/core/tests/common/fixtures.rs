//! Test fixtures for component directories and pipeline definitions.

use crux_core::transport::Address;
use crux_protocol::{Descriptor, FieldSpec, FieldType, PipelineDefinition, Schema, Step};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Generous upper bound for anything a test waits on.
#[allow(dead_code)]
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Write a `crux.json` into `dir/name` and return the component directory.
#[allow(dead_code)]
pub fn write_component(dir: &Path, name: &str, startup: Option<&str>) -> PathBuf {
    let component_dir = dir.join(name);
    std::fs::create_dir_all(&component_dir).expect("Failed to create component dir");

    let mut descriptor = serde_json::json!({
        "name": name,
        "version": "1.0.0",
        "inputs": {},
        "outputs": {},
        "parameters": {}
    });
    if let Some(startup) = startup {
        descriptor["startup"] = serde_json::json!(startup);
    }
    std::fs::write(component_dir.join("crux.json"), descriptor.to_string())
        .expect("Failed to write crux.json");

    component_dir
}

/// A Unix socket address inside `dir`.
#[allow(dead_code)]
pub fn ipc_address(dir: &Path, name: &str) -> Address {
    Address::ipc(dir.join(format!("{}.sock", name)))
}

/// Build a descriptor whose input and output fields are all `json`.
#[allow(dead_code)]
pub fn descriptor(name: &str, version: &str, inputs: &[&str], outputs: &[&str]) -> Descriptor {
    Descriptor {
        name: name.to_string(),
        version: version.to_string(),
        startup: "true".to_string(),
        inputs: json_schema(inputs),
        outputs: json_schema(outputs),
        parameters: Schema::new(),
    }
}

fn json_schema(fields: &[&str]) -> Schema {
    fields
        .iter()
        .map(|f| (f.to_string(), FieldSpec::of(FieldType::Json)))
        .collect()
}

/// Pipeline a -> b (remap x -> y) -> c, all requiring `^1.0.0`.
#[allow(dead_code)]
pub fn three_step_pipeline() -> PipelineDefinition {
    let mut def = PipelineDefinition::new();
    for name in ["a", "b", "c"] {
        def.component_load(name, name, "^1.0.0")
            .expect("Failed to load component");
    }
    def.pipeline.push(Step::new("a").with_parameter("seed", serde_json::json!(1)));
    def.pipeline.push(Step::new("b").with_remap("x", "y"));
    def.pipeline.push(Step::new("c"));
    def
}
