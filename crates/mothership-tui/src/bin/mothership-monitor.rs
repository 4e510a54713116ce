use clap::Parser;
use mothership_tui::monitor::{self, MonitorArgs};

fn main() {
    let args = MonitorArgs::parse();
    if let Err(err) = monitor::run(args) {
        eprintln!("mothership-monitor: {err}");
        std::process::exit(1);
    }
}
