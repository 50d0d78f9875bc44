use dataflow::DataflowError;
use dataflow::run;

fn main() -> Result<(), DataflowError> {
    env_logger::init();
    run(std::env::args().collect())
}
