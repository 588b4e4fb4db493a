use std::error::Error;
use std::fs;
use std::path::Path;

use sim_lib::config::SimConfig;
use sim_lib::flags::DEFAULT_CONFIG;
use sim_lib::pipelined::branch_predictor::PredictorHeuristic;
use sim_lib::run_wrapper::run;
use sim_lib::system_call::BufferHost;

const OUTPUT_PATH: &str = "eval/sim_eval.csv";
const MAX_CYCLES: u64 = 100_000_000;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let programs: Vec<String> = std::env::args().skip(1).collect();
    if programs.is_empty() {
        return Err("You should specify at least one ELF file".into());
    }

    let config = if Path::new(DEFAULT_CONFIG).exists() {
        SimConfig::from_file(DEFAULT_CONFIG)?
    } else {
        SimConfig::default()
    };

    fs::create_dir_all("eval")?;
    let mut writer = csv::Writer::from_path(OUTPUT_PATH)?;
    writer.write_record([
        "Program",
        "Predictor",
        "Cycles",
        "Instructions",
        "CPI",
        "Prediction accuracy",
        "L1 miss rate",
    ])?;

    for program in &programs {
        for heuristic in PredictorHeuristic::ALL {
            log::info!("running {} with {}", program, heuristic.name());

            match run(program, &config, heuristic, Some(MAX_CYCLES), BufferHost::default()) {
                Ok(report) => writer.write_record([
                    program.as_str(),
                    heuristic.code(),
                    &report.history.cycle_count.to_string(),
                    &report.history.inst_count.to_string(),
                    &format!("{:.3}", report.cpi()),
                    &format!("{:.3}", report.history.prediction_accuracy()),
                    &format!("{:.4}", report.l1_miss_rate()),
                ])?,
                Err(e) => {
                    log::warn!("failed to run '{}': {}", program, e);
                    writer.write_record([
                        program.as_str(),
                        heuristic.code(),
                        "Error",
                        "Error",
                        "Error",
                        "Error",
                        "Error",
                    ])?;
                }
            }
        }
    }

    writer.flush()?;
    println!("Results written to {}", OUTPUT_PATH);
    Ok(())
}
