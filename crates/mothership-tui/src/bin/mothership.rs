fn main() {
    let code = mothership_tui::cli::run_from_env();
    std::process::exit(code);
}
