use std::error::Error;
use std::fs;
use std::path::Path;

use plotters::prelude::*;

use sim_lib::config::SimConfig;
use sim_lib::flags::DEFAULT_CONFIG;
use sim_lib::memory::cache::CacheConfig;
use sim_lib::pipelined::branch_predictor::PredictorHeuristic;
use sim_lib::run_wrapper::run;
use sim_lib::system_call::BufferHost;

const MAX_CYCLES: u64 = 100_000_000;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let param_tokens: Vec<String> = std::env::args().collect();
    let elf_path = param_tokens.get(1).ok_or("You should specify exactly one ELF file")?;
    let base_config = if Path::new(DEFAULT_CONFIG).exists() {
        SimConfig::from_file(DEFAULT_CONFIG)?
    } else {
        SimConfig::default()
    };

    // L1 sizes in KiB, one line per associativity
    let cache_sizes = [4u32, 8, 16, 32, 64];
    let associativities = [1usize, 2, 4, 8];

    let mut data: Vec<Vec<(u32, f64)>> = vec![vec![]; associativities.len()];
    let mut y_max: f64 = 0.;
    for (i, &associativity) in associativities.iter().enumerate() {
        for &size in &cache_sizes {
            let mut config = base_config.clone();
            let l1 = &mut config.levels[0].cache;
            *l1 = CacheConfig::make(
                size as usize * 1024,
                associativity,
                l1.write_through,
                l1.write_allocate,
            )?;

            let report = run(
                elf_path,
                &config,
                PredictorHeuristic::default(),
                Some(MAX_CYCLES),
                BufferHost::default(),
            )?;
            let miss_rate = report.l1_miss_rate();
            log::info!("{} KiB, {}-way: miss rate {:.4}", size, associativity, miss_rate);
            data[i].push((size, miss_rate));
            y_max = y_max.max(miss_rate);
        }
    }

    let base_name = Path::new(elf_path)
        .file_stem()
        .map_or_else(|| elf_path.clone(), |stem| stem.to_string_lossy().into_owned());
    let plot_title = format!("L1 miss rate: {}", base_name);
    fs::create_dir_all("eval")?;
    let output_path = format!("eval/cache_sweep_{}.svg", base_name);

    let root = SVGBackend::new(output_path.as_str(), (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut ctx = ChartBuilder::on(&root)
        .caption(plot_title.as_str(), ("sans-serif", 40).into_font())
        .margin(5)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d((4u32..64u32).log_scale(), 0.0..(y_max * 1.1).max(0.01))?;
    ctx.configure_mesh().x_desc("L1 size (KiB)").y_desc("Miss rate").draw()?;

    for (i, associativity) in associativities.iter().enumerate() {
        let series = data[i].iter().copied();
        let label = format!("{}-way", associativity);
        let color = Palette99::pick(i).to_rgba();
        ctx.draw_series(LineSeries::new(series, color))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    ctx.configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;

    println!("Plot written to {}", output_path);
    Ok(())
}
