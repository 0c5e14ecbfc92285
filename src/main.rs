fn main() {
    if let Err(err) = sheet_recon::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
