use slotflow::EngineError;
use slotflow::run;

fn main() -> Result<(), EngineError> {
    run(std::env::args().collect())
}
