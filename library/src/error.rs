use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config parsing error: {0}")]
    Config(#[from] toml::de::Error),
    #[error("Libloading error: {0}")]
    Libloading(#[from] libloading::Error),
    #[error("could not create component '{0}'")]
    CouldNotCreate(String),
    #[error("component '{component}' already has a slot named '{slot}'")]
    DuplicateSlotName { component: String, slot: String },
    #[error("component type '{0}' is already registered")]
    DuplicateComponentType(String),
    #[error("module '{0}' is already registered")]
    DuplicateModule(String),
    #[error("unknown module '{0}'")]
    UnknownModule(String),
    #[error("invalid connection: {0}")]
    InvalidConnection(String),
    #[error("component {component} has no slot named '{slot}'")]
    UnknownSlot { component: u64, slot: String },
    #[error("no component with index {0}")]
    UnknownComponent(u64),
    #[error("Deserialization error: {0}")]
    Deserialize(String),
    #[error("Module error: {0}")]
    Module(String),
}
