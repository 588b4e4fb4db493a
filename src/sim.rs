use std::error::Error;
use std::process;

use sim_lib::config::SimConfig;
use sim_lib::flags::SimArgs;
use sim_lib::run_wrapper;
use sim_lib::system_call::ConsoleHost;

fn main() -> Result<(), Box<dyn Error>> {
    let flags = SimArgs::from_env_or_exit();

    let level = if flags.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    let config_path = flags.config_path();
    if !config_path.exists() {
        println!("Config file {} not found, nothing to run", config_path.display());
        return Ok(());
    }
    let config = SimConfig::from_file(&config_path)?;

    let report = run_wrapper::run(
        &flags.elf_file,
        &config,
        flags.heuristic(),
        flags.max_cycles,
        ConsoleHost,
    )?;
    println!("{}", report);

    process::exit(report.exit_code as i32)
}
