//! jiminy-host: pipeline integration for 3D content hosts
//!
//! This crate discovers plug-ins from registered directories, creates
//! tagged instances in the host scene through `Creator` plug-ins, resolves
//! published files for `Loader` plug-ins and relays host lifecycle hooks to
//! weakly held callbacks.
//!
//! # Example
//!
//! ```no_run
//! use jiminy_host::{create, CreateRequest, Creator, MemoryScene, PluginRegistry};
//!
//! let registry = PluginRegistry::new()?;
//! registry.register_plugin_path::<Creator>("/studio/plugins/create")?;
//!
//! let mut scene = MemoryScene::new();
//! let created = create(&registry, &mut scene, &CreateRequest::new("boxMain", "hero", "box"))?;
//! println!("Created {}", created.last());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod capability;
pub mod creator;
pub mod discovery;
pub mod error;
pub mod events;
mod guard;
pub mod load;
pub mod loader;
pub mod pipeline;
pub mod publish;
pub mod registry;
pub mod scene;
pub mod settings;
pub mod tracing_support;

pub use capability::{Capability, PluginDescriptor};
pub use creator::{create, CreateRequest, Created, Creator, CreatorInstance, CreatorPlugin};
pub use discovery::{discover, PluginScanner, ScanResult};
pub use error::{ConfigError, Error, Result, SceneError};
pub use events::{callback, Callback, EventArgs, EventBus, Subscription};
pub use load::{loaders_for, LoadContext, LoadRequest, Loader, LoaderInstance, LoaderPlugin};
pub use loader::{LoadedUnit, LoaderError, LoaderSet, UnitLoader};
pub use pipeline::{Pipeline, PipelineConfig, SceneHook};
pub use registry::PluginRegistry;
pub use scene::{MaintainedSelection, MemoryScene, SceneBackend};
pub use settings::Settings;

pub use jiminy_plugin_api::{ClassSpec, DataMap, INSTANCE_ID};
