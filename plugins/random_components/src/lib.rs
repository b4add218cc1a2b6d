use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slotflow::component::{Component, ComponentType, SlotBuilder};
use slotflow::factory::{FactoryEntry, FactoryModule};
use slotflow::graph::{Input, Output};
use slotflow::SharedTables;

pub struct RandomReals {
    seed: Input<i64>,
    count: Input<i32>,
    min: Input<f64>,
    max: Input<f64>,
    values: Output<Vec<f64>>,
}

impl Component for RandomReals {
    fn recompute(&mut self) {
        let count = self.count.get().max(0) as usize;
        let (mut low, mut high) = (self.min.get(), self.max.get());
        if low > high {
            std::mem::swap(&mut low, &mut high);
        }

        let mut rng = StdRng::seed_from_u64(self.seed.get() as u64);
        let values = if low == high {
            vec![low; count]
        } else {
            (0..count).map(|_| rng.gen_range(low..high)).collect()
        };
        self.values.set(values);
    }
}

impl ComponentType for RandomReals {
    fn create(builder: &mut SlotBuilder) -> Self {
        RandomReals {
            seed: builder.input("seed", "Generator seed"),
            count: builder.input_with("count", "Number of values", 1),
            min: builder.input("min", "Lower bound"),
            max: builder.input_with("max", "Upper bound (exclusive)", 1.0),
            values: builder.output("values", "Uniformly distributed reals"),
        }
    }
}

pub fn module() -> FactoryModule {
    FactoryModule::new("random", "Seeded random number components")
        .with_entry(FactoryEntry::new::<RandomReals>("Seeded list of uniform reals"))
}

#[allow(improper_ctypes_definitions)]
#[no_mangle]
pub extern "C" fn create_component_module(host: &SharedTables) -> *mut FactoryModule {
    slotflow::adopt_shared_tables(host);
    Box::into_raw(Box::new(module()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotflow::ComponentFactory;

    fn generate(factory: &ComponentFactory, seed: i64, count: i32) -> Vec<f64> {
        let node = factory.create("RandomReals").unwrap();
        node.slot("seed").unwrap().set_value(seed);
        node.slot("count").unwrap().set_value(count);
        node.slot("min").unwrap().set_value(-2.0f64);
        node.slot("max").unwrap().set_value(3.0f64);
        let values = Output::<Vec<f64>>::from_slot(&node.slot("values").unwrap()).unwrap();
        values.get()
    }

    #[test]
    fn same_seed_gives_same_values() {
        let factory = ComponentFactory::new();
        factory.register_module(module()).unwrap();

        let first = generate(&factory, 7, 16);
        let second = generate(&factory, 7, 16);
        assert_eq!(first.len(), 16);
        assert_eq!(first, second);
        assert!(first.iter().all(|v| (-2.0..3.0).contains(v)));
        assert_ne!(first, generate(&factory, 8, 16));
    }

    #[test]
    fn entry_point_uses_the_host_index_counter() {
        let factory = ComponentFactory::with_builtins().unwrap();
        let raw = create_component_module(slotflow::shared_tables());
        let module = unsafe { Box::from_raw(raw) };
        factory.register_module(*module).unwrap();

        let indices: Vec<u64> = ["AddIntegers", "RandomReals", "AddIntegers", "RandomReals"]
            .iter()
            .map(|name| factory.create(name).unwrap().index())
            .collect();
        assert!(indices.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn negative_count_yields_empty_list() {
        let factory = ComponentFactory::new();
        factory.register_module(module()).unwrap();
        assert!(generate(&factory, 1, -3).is_empty());
    }
}
