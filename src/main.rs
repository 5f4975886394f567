fn main() {
    if let Err(err) = komplete::main_inner() {
        eprintln!("komplete: {err:#}");
        std::process::exit(1);
    }
}
