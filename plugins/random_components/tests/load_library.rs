use std::path::PathBuf;

use slotflow::types::value_trait;
use slotflow::ComponentFactory;

/// The cdylib cargo builds next to this test binary.
fn built_library() -> PathBuf {
    let name = format!(
        "{}random_components{}",
        std::env::consts::DLL_PREFIX,
        std::env::consts::DLL_SUFFIX
    );
    let exe = std::env::current_exe().unwrap();
    let deps = exe.parent().unwrap();
    [deps.join(&name), deps.parent().unwrap().join(&name)]
        .into_iter()
        .find(|path| path.is_file())
        .unwrap_or_else(|| panic!("{} not found next to {}", name, exe.display()))
}

#[test]
fn loaded_library_shares_indices_and_type_ids() {
    let factory = ComponentFactory::with_builtins().unwrap();
    let name = factory.load_module_library(built_library()).unwrap();
    assert_eq!(name, "random");

    let mut indices = Vec::new();
    for type_name in ["AddIntegers", "RandomReals", "AddIntegers", "RandomReals", "RandomReals"] {
        indices.push(factory.create(type_name).unwrap().index());
    }
    assert!(indices.windows(2).all(|pair| pair[0] < pair[1]), "{:?}", indices);

    let random = factory.create("RandomReals").unwrap();
    let values = random.slot("values").unwrap();
    assert_eq!(values.value_trait().full_type_id(), value_trait::<Vec<f64>>().full_type_id());

    let scale = factory.create("ScaleReals").unwrap();
    scale.slot("input").unwrap().set_parent(Some(&values)).unwrap();
    random.slot("count").unwrap().set_value(4);
    let result = slotflow::Output::<Vec<f64>>::from_slot(&scale.slot("result").unwrap()).unwrap();
    assert_eq!(result.get().len(), 4);
}
