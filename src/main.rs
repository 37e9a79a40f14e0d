use std::process;

fn main() {
    if let Err(e) = dray::cli::main() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
