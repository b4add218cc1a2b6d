use std::fs;
use std::path::Path;

use log::info;

use crate::config::EngineConfig;
use crate::document::Document;
use crate::error::EngineError;
use crate::factory::ComponentFactory;
use crate::util::timing::measure;

/// `slotflow <document.json> [engine.toml]`: loads a saved document, runs the configured number of
/// steps and prints the output slot values as JSON. Without a document, lists the known components.
pub fn run(args: Vec<String>) -> Result<(), EngineError> {
    let _ = env_logger::try_init();

    let config = match args.get(2) {
        Some(path) => EngineConfig::load(Path::new(path))?,
        None => EngineConfig::load_or_default(),
    };

    let factory = ComponentFactory::with_builtins()?;
    if let Some(dir) = &config.module_dir {
        let loaded = factory.load_modules_from_directory(dir)?;
        info!("Loaded {} module(s) from {}", loaded.len(), dir.display());
    }

    let Some(document_path) = args.get(1) else {
        for name in factory.names() {
            println!("{}", name);
        }
        return Ok(());
    };

    let json = fs::read_to_string(document_path)?;
    let steps = config.steps;
    let level = config.timing_level();
    let mut document = measure("Loading document", level, || Document::from_json(&factory, config, &json))?;
    measure(format!("{} step(s)", steps), level, || document.run(steps));
    println!("{}", serde_json::to_string_pretty(&document.outputs())?);
    Ok(())
}
