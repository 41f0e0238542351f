//! Box creator as a Wasm module
//!
//! Build with:
//!
//! ```sh
//! cargo build --release --target wasm32-unknown-unknown
//! cp target/wasm32-unknown-unknown/release/box_creator_plugin.wasm ../plugins/
//! ```

use jiminy_plugin_sdk::prelude::*;

struct Boxes;

impl CreatorModule for Boxes {
    fn manifest() -> ModuleManifest {
        ModuleManifest::new()
            .class(
                ClassSpec::new("WasmBoxCreator", "Creator")
                    .family("box")
                    .label("Box (selection)")
                    .data("subdivisions", 1),
            )
            .class(ClassSpec::new("WasmCrateCreator", "WasmBoxCreator").family("crate"))
    }

    fn process(request: ProcessRequest) -> ProcessResult {
        let boxes: Vec<String> = request
            .selection
            .iter()
            .filter(|node| node.to_ascii_lowercase().contains("box"))
            .cloned()
            .collect();

        if boxes.is_empty() && request.class == "WasmCrateCreator" {
            return ProcessResult::error("select at least one box to crate");
        }

        let mut data = DataMap::new();
        data.insert("boxCount".into(), serde_json::Value::from(boxes.len()));

        ProcessResult::Create(InstancePlan {
            members: boxes,
            data,
        })
    }
}

export_module!(Boxes);
