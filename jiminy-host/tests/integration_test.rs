//! End-to-end tests for discovery and creation from plug-in directories

use jiminy_host::scene::AttributeValue;
use jiminy_host::{
    callback, create, CreateRequest, Creator, CreatorPlugin, Error, MemoryScene, PluginDescriptor,
    PluginRegistry, SceneBackend, INSTANCE_ID,
};
use jiminy_plugin_api::{ClassSpec, InstancePlan, ModuleManifest, ProcessResult};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const CREATOR_BOX: &str = r#"
[[class]]
name = "BoxCreator"
bases = ["Creator"]
family = "box"
label = "Box"
"#;

fn write_unit(dir: &Path, file: &str, text: &str) {
    fs::write(dir.join(file), text).expect("write unit");
}

/// Text-format Wasm unit answering every process call with `result`
fn wat_unit(manifest: &ModuleManifest, result: &ProcessResult) -> String {
    const RESULT_OFFSET: i64 = 2048;

    let manifest = rmp_serde::to_vec(manifest).expect("encode manifest");
    let result = rmp_serde::to_vec(result).expect("encode result");
    assert!(manifest.len() < RESULT_OFFSET as usize);

    let escape = |bytes: &[u8]| {
        bytes
            .iter()
            .map(|b| format!("\\{b:02x}"))
            .collect::<String>()
    };

    format!(
        r#"(module
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 4096))
  (data (i32.const 0) "{manifest_data}")
  (data (i32.const {RESULT_OFFSET}) "{result_data}")
  (func (export "plugin_alloc") (param $len i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $heap))
    (global.set $heap (i32.add (global.get $heap) (local.get $len)))
    (local.get $ptr))
  (func (export "plugin_dealloc") (param i32 i32))
  (func (export "plugin_manifest") (result i64)
    (i64.const {manifest_packed}))
  (func (export "plugin_process") (param i32 i32) (result i64)
    (i64.const {result_packed})))"#,
        manifest_data = escape(&manifest),
        result_data = escape(&result),
        manifest_packed = manifest.len(),
        result_packed = (RESULT_OFFSET << 32) | result.len() as i64,
    )
}

fn registry_with(dir: &Path) -> PluginRegistry {
    let registry = PluginRegistry::new().expect("registry");
    registry
        .register_plugin_path::<Creator>(dir)
        .expect("register path");
    registry
}

fn names(plugins: &[Arc<dyn CreatorPlugin>]) -> Vec<&str> {
    plugins.iter().map(|p| p.name()).collect()
}

struct ExplicitBox;

impl PluginDescriptor for ExplicitBox {
    fn name(&self) -> &str {
        "BoxCreator"
    }

    fn family(&self) -> Option<&str> {
        Some("box")
    }

    fn label(&self) -> Option<&str> {
        Some("Explicit")
    }
}

impl CreatorPlugin for ExplicitBox {}

#[test]
fn test_create_box_end_to_end() {
    let plugins = TempDir::new().unwrap();
    write_unit(plugins.path(), "creator_box.toml", CREATOR_BOX);
    let registry = registry_with(plugins.path());

    let mut scene = MemoryScene::new();
    scene.create_node("persp").unwrap();
    scene.select(&["persp".to_string()]).unwrap();

    let created = create(
        &registry,
        &mut scene,
        &CreateRequest::new("boxMain", "myAsset", "box"),
    )
    .unwrap();

    assert_eq!(created.last(), "boxMain");
    assert!(scene.node("boxMain").unwrap().is_set());

    let attr = |key| scene.attribute("boxMain", key).cloned();
    assert_eq!(attr("id"), Some(AttributeValue::String(INSTANCE_ID.into())));
    assert_eq!(attr("family"), Some(AttributeValue::String("box".into())));
    assert_eq!(attr("asset"), Some(AttributeValue::String("myAsset".into())));
    assert_eq!(attr("subset"), Some(AttributeValue::String("boxMain".into())));
    assert_eq!(attr("active"), Some(AttributeValue::Bool(true)));

    assert_eq!(scene.selection().unwrap(), vec!["persp"]);
}

#[test]
fn test_registering_a_path_twice_keeps_one() {
    let plugins = TempDir::new().unwrap();
    let registry = registry_with(plugins.path());
    registry
        .register_plugin_path::<Creator>(plugins.path())
        .unwrap();

    assert_eq!(registry.plugin_paths::<Creator>().len(), 1);
}

#[test]
fn test_discover_is_sorted_and_unique() {
    let plugins = TempDir::new().unwrap();
    write_unit(
        plugins.path(),
        "a_creators.toml",
        r#"
        [[class]]
        name = "ZebraCreator"
        bases = ["Creator"]
        family = "zebra"

        [[class]]
        name = "ModelCreator"
        bases = ["Creator"]
        family = "model"
        "#,
    );
    write_unit(
        plugins.path(),
        "b_more.toml",
        r#"
        [[class]]
        name = "ModelCreator"
        bases = ["Creator"]
        family = "other"

        [[class]]
        name = "LookCreator"
        bases = ["Creator"]
        family = "look"
        "#,
    );
    let registry = registry_with(plugins.path());

    let found = registry.discover::<Creator>().unwrap();
    assert_eq!(names(&found), vec!["LookCreator", "ModelCreator", "ZebraCreator"]);

    // First seen wins
    assert_eq!(found[1].family(), Some("model"));
}

#[test]
fn test_explicit_registration_overrides_filesystem() {
    let plugins = TempDir::new().unwrap();
    write_unit(plugins.path(), "creator_box.toml", CREATOR_BOX);
    let registry = registry_with(plugins.path());
    registry.register_plugin::<Creator>(Arc::new(ExplicitBox));

    let found = registry.discover::<Creator>().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].label(), Some("Explicit"));
}

#[test]
fn test_broken_unit_does_not_hide_siblings() {
    let plugins = TempDir::new().unwrap();
    write_unit(plugins.path(), "a_broken.toml", "[[class]\nname = ");
    write_unit(plugins.path(), "b_garbage.wasm", "not a module");
    write_unit(plugins.path(), "creator_box.toml", CREATOR_BOX);
    write_unit(plugins.path(), "_disabled.toml", CREATOR_BOX.replace("Box", "Hidden").as_str());
    let registry = registry_with(plugins.path());

    let found = registry.discover::<Creator>().unwrap();
    assert_eq!(names(&found), vec!["BoxCreator"]);
}

#[test]
fn test_missing_directory_is_fatal() {
    let plugins = TempDir::new().unwrap();
    let registry = registry_with(&plugins.path().join("missing"));

    let Err(err) = registry.discover::<Creator>() else {
        panic!("expected a missing plug-in directory to fail discovery");
    };
    assert!(err.is_configuration());
}

#[test]
fn test_unknown_family_is_internal_error() {
    let plugins = TempDir::new().unwrap();
    write_unit(plugins.path(), "creator_box.toml", CREATOR_BOX);
    let registry = registry_with(plugins.path());
    let mut scene = MemoryScene::new();

    let err = create(
        &registry,
        &mut scene,
        &CreateRequest::new("rigMain", "myAsset", "rig"),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Internal(_)));
    assert!(scene.sets().is_empty());
}

#[test]
fn test_unsupported_data_fails_the_creator() {
    let plugins = TempDir::new().unwrap();
    write_unit(plugins.path(), "creator_box.toml", CREATOR_BOX);
    let registry = registry_with(plugins.path());
    let mut scene = MemoryScene::new();

    let request =
        CreateRequest::new("boxMain", "myAsset", "box").data("tags", vec!["a", "b"]);
    let err = create(&registry, &mut scene, &request).unwrap_err();

    assert!(matches!(err, Error::Internal(_)));
}

#[test]
fn test_inherited_family_within_a_unit() {
    let plugins = TempDir::new().unwrap();
    write_unit(
        plugins.path(),
        "creator_model.toml",
        r#"
        [[class]]
        name = "ModelCreator"
        bases = ["Creator"]
        family = "model"

        [class.data]
        lod = 0

        [[class]]
        name = "HeroModelCreator"
        bases = ["ModelCreator"]

        [class.data]
        hero = true
        "#,
    );
    let registry = registry_with(plugins.path());
    let mut scene = MemoryScene::new();

    let created = create(
        &registry,
        &mut scene,
        &CreateRequest::new("modelMain", "hero", "model"),
    )
    .unwrap();

    // Both creators run; the second set gets a unique name
    assert_eq!(created.instances(), &["modelMain".to_string(), "modelMain1".to_string()]);
    assert_eq!(
        scene.attribute("modelMain", "hero"),
        Some(&AttributeValue::Bool(true))
    );
    assert_eq!(
        scene.attribute("modelMain1", "lod"),
        Some(&AttributeValue::Int(0))
    );
}

#[test]
fn test_emit_with_only_dropped_callbacks() {
    let bus = jiminy_host::EventBus::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let cb = callback(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    bus.on("save", &cb);
    drop(cb);

    assert!(bus.emit("save", Vec::new()).is_allowed());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_create_through_wasm_unit() {
    let plugins = TempDir::new().unwrap();
    let manifest =
        ModuleManifest::new().class(ClassSpec::new("WasmBoxCreator", "Creator").family("box"));
    let mut plan = InstancePlan {
        members: vec!["pBox1".into()],
        ..Default::default()
    };
    plan.data.insert("boxCount".into(), 1.into());
    write_unit(
        plugins.path(),
        "creator_box.wasm",
        &wat_unit(&manifest, &ProcessResult::Create(plan)),
    );
    let registry = registry_with(plugins.path());

    let found = registry.discover::<Creator>().unwrap();
    assert_eq!(names(&found), vec!["WasmBoxCreator"]);

    let mut scene = MemoryScene::new();
    scene.create_node("persp").unwrap();
    scene.create_node("pBox1").unwrap();
    scene.select(&["persp".to_string()]).unwrap();

    let created = create(
        &registry,
        &mut scene,
        &CreateRequest::new("boxMain", "myAsset", "box"),
    )
    .unwrap();

    assert_eq!(created.instances(), &["boxMain".to_string()]);
    assert_eq!(
        scene.node("boxMain").unwrap().members.as_deref(),
        Some(&["pBox1".to_string()][..])
    );
    assert_eq!(
        scene.attribute("boxMain", "boxCount"),
        Some(&AttributeValue::Int(1))
    );
    assert_eq!(
        scene.attribute("boxMain", "family"),
        Some(&AttributeValue::String("box".into()))
    );
    assert_eq!(scene.selection().unwrap(), vec!["persp"]);
}

#[test]
fn test_wasm_unit_refusing_to_run_is_skipped() {
    let plugins = TempDir::new().unwrap();
    let manifest =
        ModuleManifest::new().class(ClassSpec::new("WasmBoxCreator", "Creator").family("box"));
    write_unit(
        plugins.path(),
        "creator_box.wasm",
        &wat_unit(&manifest, &ProcessResult::error("nothing selected")),
    );
    let registry = registry_with(plugins.path());
    let mut scene = MemoryScene::new();

    let err = create(
        &registry,
        &mut scene,
        &CreateRequest::new("boxMain", "myAsset", "box"),
    )
    .unwrap_err();

    assert!(matches!(err, Error::Internal(_)));
    assert!(scene.sets().is_empty());
}
