//! Install and uninstall the pipeline into a host application
//!
//! The host is reached through three narrow seams: [`HostHooks`] for scene
//! callbacks, [`MenuHost`] for the menu and [`PublishFramework`] for the
//! publishing tool. Studio-specific behaviour lives in a [`Configuration`]
//! found by name through a [`ConfigResolver`].

use crate::creator::{self, CreateRequest, Created};
use crate::error::{ConfigError, Error, Result};
use crate::events::EventBus;
use crate::registry::PluginRegistry;
use crate::scene::SceneBackend;
use crate::settings::Settings;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Names the configuration to install
pub const DRESS_ENV: &str = "JIMINY_DRESS";

/// Scene notifications the pipeline subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneHook {
    /// Before a save; callbacks may veto it
    BeforeSave,
    AfterNew,
    AfterOpen,
    AfterSave,
    AfterInitialize,
}

impl SceneHook {
    pub const ALL: [SceneHook; 5] = [
        SceneHook::AfterSave,
        SceneHook::BeforeSave,
        SceneHook::AfterNew,
        SceneHook::AfterInitialize,
        SceneHook::AfterOpen,
    ];

    /// Event emitted on the bus for this hook
    pub fn event(self) -> &'static str {
        match self {
            SceneHook::BeforeSave => "before_save",
            SceneHook::AfterNew => "new",
            SceneHook::AfterOpen => "open",
            SceneHook::AfterSave => "save",
            SceneHook::AfterInitialize => "init",
        }
    }

    pub fn is_cancelable(self) -> bool {
        matches!(self, SceneHook::BeforeSave)
    }
}

/// Handle of a callback registered with the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(pub u64);

/// Host scene callbacks
///
/// The host calls [`Pipeline::handle_hook`] when a registered hook fires.
pub trait HostHooks: Send + Sync {
    /// Running without a user interface
    fn is_headless(&self) -> bool;

    fn add_callback(&self, hook: SceneHook) -> anyhow::Result<CallbackId>;

    fn remove_callback(&self, id: CallbackId) -> anyhow::Result<()>;
}

/// Host menu bar
pub trait MenuHost: Send + Sync {
    /// Remove the menu called `name`; a missing menu is not an error
    fn remove_menu(&self, name: &str) -> anyhow::Result<()>;

    fn add_menu(&self, menu: &Menu) -> anyhow::Result<()>;
}

/// External publishing tool
pub trait PublishFramework: Send + Sync {
    fn register_host(&self, host: &str) -> anyhow::Result<()>;
}

/// Studio configuration ("dress") installed on top of the pipeline
pub trait Configuration: Send + Sync {
    fn name(&self) -> &str;

    fn install(&self) -> anyhow::Result<()>;

    fn uninstall(&self) -> anyhow::Result<()>;
}

/// Finds a configuration by name
pub trait ConfigResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Configuration>>;
}

/// Resolver over a fixed set of configurations
#[derive(Default, Clone)]
pub struct StaticResolver {
    configs: HashMap<String, Arc<dyn Configuration>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a configuration under its own name
    pub fn with(mut self, config: Arc<dyn Configuration>) -> Self {
        self.configs.insert(config.name().to_string(), config);
        self
    }
}

impl ConfigResolver for StaticResolver {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Configuration>> {
        self.configs.get(name).cloned()
    }
}

/// Pipeline menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Menu {
    /// Unique object name
    pub name: String,
    pub label: String,
    pub items: Vec<MenuItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuItem {
    /// Runs `command` when picked
    Action { label: String, command: String },
    Divider { label: String },
}

impl Default for Menu {
    fn default() -> Self {
        Self {
            name: "jiminymaya".into(),
            label: "Pipeline".into(),
            items: vec![
                MenuItem::Action {
                    label: "Publish...".into(),
                    command: "publish".into(),
                },
                MenuItem::Divider {
                    label: "Create...".into(),
                },
            ],
        }
    }
}

/// What to install
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Configuration to resolve on install
    pub dress: Option<String>,

    /// Name registered with the publishing framework
    pub host_name: String,

    pub menu: Menu,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dress: None,
            host_name: "maya".into(),
            menu: Menu::default(),
        }
    }
}

impl PipelineConfig {
    /// Read the dress name from `JIMINY_DRESS`
    pub fn from_env() -> Self {
        Self {
            dress: dress_from_env(),
            ..Default::default()
        }
    }

    /// Dress from the settings file, falling back to `JIMINY_DRESS`
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            dress: settings.dress.name.clone().or_else(dress_from_env),
            ..Default::default()
        }
    }

    pub fn with_dress(mut self, dress: impl Into<String>) -> Self {
        self.dress = Some(dress.into());
        self
    }
}

fn dress_from_env() -> Option<String> {
    std::env::var(DRESS_ENV).ok().filter(|name| !name.is_empty())
}

#[derive(Default)]
struct PipelineState {
    callbacks: HashMap<SceneHook, CallbackId>,
    registered: Option<Arc<dyn Configuration>>,
}

/// The pipeline as installed into one host
pub struct Pipeline {
    registry: PluginRegistry,
    events: EventBus,
    config: PipelineConfig,
    hooks: Arc<dyn HostHooks>,
    menu_host: Option<Arc<dyn MenuHost>>,
    publish: Arc<dyn PublishFramework>,
    resolver: Arc<dyn ConfigResolver>,
    state: Mutex<PipelineState>,
}

impl Pipeline {
    pub fn new(
        registry: PluginRegistry,
        config: PipelineConfig,
        hooks: Arc<dyn HostHooks>,
        publish: Arc<dyn PublishFramework>,
        resolver: Arc<dyn ConfigResolver>,
    ) -> Self {
        Self {
            registry,
            events: EventBus::new(),
            config,
            hooks,
            menu_host: None,
            publish,
            resolver,
            state: Mutex::new(PipelineState::default()),
        }
    }

    /// Install the menu through `menu_host` when not headless
    pub fn with_menu_host(mut self, menu_host: Arc<dyn MenuHost>) -> Self {
        self.menu_host = Some(menu_host);
        self
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Install host callbacks, the menu and the configuration
    ///
    /// Calling this again replaces the host callbacks instead of adding a
    /// second set.
    pub fn install(&self) -> Result<()> {
        tracing::info!("Jiminy Cricket, at your service.");

        self.register_callbacks()?;

        if !self.hooks.is_headless() {
            self.install_menu()?;
        }

        self.publish
            .register_host(&self.config.host_name)
            .map_err(Error::Hook)?;

        let config = self.find_config()?;
        config.install().map_err(Error::Hook)?;
        self.state.lock().registered = Some(config);

        Ok(())
    }

    /// Uninstall the configuration, then the menu
    pub fn uninstall(&self) -> Result<()> {
        tracing::info!("Farewell, my friend.");

        let config = self.registered_config().ok_or(Error::NotInstalled)?;
        config.uninstall().map_err(Error::Hook)?;
        self.state.lock().registered = None;

        if !self.hooks.is_headless() {
            self.uninstall_menu()?;
        }

        Ok(())
    }

    /// Currently registered configuration
    pub fn registered_config(&self) -> Option<Arc<dyn Configuration>> {
        self.state.lock().registered.clone()
    }

    /// Relay a host hook to the event bus
    ///
    /// Returns whether the host may go ahead; only [`SceneHook::BeforeSave`]
    /// can be vetoed.
    pub fn handle_hook(&self, hook: SceneHook, args: Vec<Value>) -> bool {
        let outcome = self.events.emit(hook.event(), args);

        if hook == SceneHook::AfterInitialize && self.hooks.is_headless() {
            tracing::warn!("Running batch mode ...");
        }

        !hook.is_cancelable() || outcome.is_allowed()
    }

    /// Create an instance with the plug-ins of this pipeline's registry
    pub fn create(&self, scene: &mut dyn SceneBackend, request: &CreateRequest) -> Result<Created> {
        creator::create(&self.registry, scene, request)
    }

    fn register_callbacks(&self) -> Result<()> {
        let mut state = self.state.lock();

        for (hook, id) in state.callbacks.drain() {
            if let Err(e) = self.hooks.remove_callback(id) {
                tracing::info!(?hook, error = %e, "Could not remove host callback");
            }
        }

        for hook in SceneHook::ALL {
            let id = self.hooks.add_callback(hook).map_err(Error::Hook)?;
            state.callbacks.insert(hook, id);
            tracing::info!(?hook, event = hook.event(), "Installed event handler");
        }

        Ok(())
    }

    fn install_menu(&self) -> Result<()> {
        let Some(menu_host) = &self.menu_host else {
            tracing::debug!("No menu host, skipping menu");
            return Ok(());
        };

        // Teardown completes before the new menu goes in.
        menu_host
            .remove_menu(&self.config.menu.name)
            .map_err(Error::Hook)?;
        menu_host.add_menu(&self.config.menu).map_err(Error::Hook)
    }

    fn uninstall_menu(&self) -> Result<()> {
        match &self.menu_host {
            Some(menu_host) => menu_host
                .remove_menu(&self.config.menu.name)
                .map_err(Error::Hook),
            None => Ok(()),
        }
    }

    fn find_config(&self) -> Result<Arc<dyn Configuration>> {
        tracing::info!("Finding configuration for project..");

        let name = self
            .config
            .dress
            .as_deref()
            .ok_or(ConfigError::MissingConfig(DRESS_ENV))?;

        tracing::info!(dress = name, "Found {name}, loading..");
        self.resolver
            .resolve(name)
            .ok_or_else(|| ConfigError::UnknownConfig(name.to_string()).into())
    }
}
