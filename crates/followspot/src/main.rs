use std::io::{self, BufRead, Write};
use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use followspot_core::{
    ConfigStore, Controller, LogIndicator, NullIndicator, StatusIndicator,
};

/// Followspot controller: joystick in, sACN out.
#[derive(Parser, Debug)]
#[command(name = "followspot")]
#[command(about = "HOTAS-driven followspot controller")]
struct Args {
    /// Path to the settings file (default: config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Local bind addresses; the first is the primary sender, the rest become
    /// mirrors. Overrides the settings file.
    #[arg(long, value_parser = parse_ip)]
    bind: Vec<IpAddr>,

    /// Force the software-emulated joystick even if hardware is present
    #[arg(long)]
    emulate: bool,

    /// Frame rate override
    #[arg(long)]
    fps: Option<u32>,

    /// Log LED state transitions (headless boxes without LED hardware)
    #[arg(long)]
    led_log: bool,

    /// Take control immediately on startup
    #[arg(long)]
    activate: bool,
}

fn parse_ip(s: &str) -> Result<IpAddr, String> {
    s.parse().map_err(|e| format!("Invalid IP address: {}", e))
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let store = ConfigStore::new(args.config);
    let mut controller = Controller::new(store)?;

    // CLI overrides are persisted like any other settings change.
    let mut settings = controller.settings();
    let mut changed = false;
    if !args.bind.is_empty() {
        settings.bind_addresses = args.bind.iter().map(|ip| ip.to_string()).collect();
        changed = true;
    }
    if args.emulate && !settings.emulated_input {
        settings.emulated_input = true;
        changed = true;
    }
    if let Some(fps) = args.fps {
        settings.fps = fps;
        changed = true;
    }
    if changed {
        controller.update_settings(settings.clone())?;
    }

    println!("FollowSpot starting");
    println!("Priority: {} (floor {})", settings.priority, settings.priority_floor);
    println!(
        "Output: {}",
        if settings.bind_addresses.is_empty() {
            "default routing".to_string()
        } else {
            settings.bind_addresses.join(", ")
        }
    );
    println!(
        "Input: {}",
        if settings.emulated_input {
            "emulated joystick"
        } else {
            "physical joystick"
        }
    );

    let indicator: Box<dyn StatusIndicator> = if args.led_log {
        Box::new(LogIndicator::default())
    } else {
        Box::new(NullIndicator)
    };
    controller.start_sacn(indicator)?;

    if args.activate {
        controller.activate();
    }

    run_console(&controller);

    controller.stop();
    Ok(())
}

/// Minimal operator console on stdin. When stdin closes (headless/daemon
/// runs) the process keeps running until killed.
fn run_console(controller: &Controller) {
    println!("Commands: activate | release | status | fixtures | input | quit");
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => {
                // stdin closed; park until the process is terminated
                log::info!("stdin closed, running headless");
                loop {
                    std::thread::park();
                }
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("stdin read failed: {}", e);
                return;
            }
        }
        match line.trim() {
            "" => {}
            "activate" => controller.activate(),
            "release" => controller.release(),
            "status" => match serde_json::to_string_pretty(&controller.status()) {
                Ok(s) => println!("{}", s),
                Err(e) => println!("status unavailable: {}", e),
            },
            "fixtures" => {
                for fx in controller.fixtures() {
                    println!(
                        "{}  universe={} start_addr={} enabled={}",
                        fx.id, fx.universe, fx.start_addr, fx.enabled
                    );
                }
            }
            "input" => {
                let snap = controller.input_snapshot();
                println!("axes: {:?}", snap.axes);
                let pressed: Vec<usize> = snap
                    .buttons
                    .iter()
                    .enumerate()
                    .filter(|(_, b)| **b)
                    .map(|(i, _)| i)
                    .collect();
                println!("pressed buttons: {:?}", pressed);
            }
            "quit" | "exit" => return,
            other => println!("unknown command: {}", other),
        }
    }
}
