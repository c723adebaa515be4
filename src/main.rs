fn main() {
    if let Err(err) = rotavault::cli::run() {
        eprintln!("rotavault: {:#}", err);
        std::process::exit(4);
    }
}
