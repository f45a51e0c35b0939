use std::fs::File;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use catchment_core::config::ImproverConfig;
use catchment_core::fitness::FitnessKind;
use catchment_core::improvement::{
    annealing_best_of_n, EvolutionSetImprover, ImprovementContext, ImprovementMetrics, RadiusSetImprover,
    SetImprover,
};
use catchment_core::io::{read_project_json, write_project_json, write_sections_geojson, Project};
use catchment_core::synthetic::{self, Scenario};
use catchment_core::validity::ValidityChecker;
use catchment_core::{CatchmentError, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;

#[derive(Parser)]
#[command(name = "catchment_cli", version, about = "Refine catchment boundaries over a terrain mesh")]
struct Cli {
    /// JSON file with improver settings; missing fields use defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    BestOfN,
    Evolution,
    Radius,
}

#[derive(Clone, Copy, ValueEnum)]
enum DemoScenario {
    RidgeValley,
    Crest,
    PointCloud,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a synthetic project to start from
    Demo {
        output: PathBuf,
        #[arg(long, value_enum, default_value_t = DemoScenario::RidgeValley)]
        scenario: DemoScenario,
    },
    /// Print the fitness of every section
    Fitness {
        project: PathBuf,
        /// Overrides the fitness named in the config
        #[arg(long)]
        fitness: Option<String>,
    },
    /// Check every section against the water network and the other sections
    Validate { project: PathBuf },
    /// Improve the sections and write the result
    Improve {
        project: PathBuf,
        #[arg(long, value_enum, default_value_t = Strategy::BestOfN)]
        strategy: Strategy,
        /// Overrides the seed in the config
        #[arg(long)]
        seed: Option<u64>,
        /// Project file receiving the improved sections
        #[arg(long)]
        output: PathBuf,
        /// Also write the improved sections as GeoJSON
        #[arg(long)]
        geojson: Option<PathBuf>,
    },
}

fn init_logging() {
    if let Ok(path) = std::env::var("CATCHMENT_LOG") {
        match File::create(&path) {
            Ok(file) => {
                env_logger::Builder::from_default_env()
                    .target(env_logger::Target::Pipe(Box::new(file)))
                    .init();
            }
            Err(e) => {
                eprintln!("Failed to create log file {}: {}", path, e);
                env_logger::Builder::from_default_env().init();
            }
        }
    } else {
        env_logger::Builder::from_default_env().init();
    }
}

fn load_config(path: Option<&Path>) -> Result<ImproverConfig> {
    match path {
        Some(path) => ImproverConfig::from_json_file(path),
        None => Ok(ImproverConfig::default()),
    }
}

fn load_scenario(path: &Path, config: &ImproverConfig) -> Result<Scenario> {
    read_project_json(path)?.into_scenario(config.confluence_cache_capacity)
}

fn print_metrics(metrics: &ImprovementMetrics) {
    println!(
        "Requests: {}, improved: {}, alternatives tested: {} ({} valid)",
        metrics.improvement_requests,
        metrics.improved,
        metrics.alternatives_tested,
        metrics.valid_alternatives_tested
    );
}

fn improve(scenario: &Scenario, strategy: Strategy, config: &ImproverConfig) -> Result<Scenario> {
    let ctx = ImprovementContext::from_config(Rc::clone(&scenario.tin), Rc::clone(&scenario.water), config);
    let lines = match strategy {
        Strategy::BestOfN => {
            let mut improver = annealing_best_of_n(&ctx, config, config.seed)?;
            let lines = improver.improve(&scenario.lines)?;
            print_metrics(improver.metrics());
            lines
        }
        Strategy::Evolution => {
            let first = annealing_best_of_n(&ctx, config, config.seed)?;
            let second = annealing_best_of_n(&ctx, config, config.seed.wrapping_add(1))?;
            let mut improver = EvolutionSetImprover::new(first, second, config)?;
            let lines = improver.improve(&scenario.lines)?;
            print_metrics(&improver.metrics());
            lines
        }
        Strategy::Radius => {
            let mut improver = RadiusSetImprover::new(ctx.clone(), config.radius, config.move_junctions)?;
            let lines = improver.improve(&scenario.lines)?;
            print_metrics(improver.metrics());
            lines
        }
    };
    let before = ctx.fitness.avg_fitness(scenario.lines.sections())?;
    let after = ctx.fitness.avg_fitness(lines.sections())?;
    println!("Average fitness: {:.4} -> {:.4}", before, after);
    Ok(Scenario {
        tin: Rc::clone(&scenario.tin),
        water: Rc::clone(&scenario.water),
        lines,
    })
}

fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Demo { output, scenario } => {
            let scenario = match scenario {
                DemoScenario::RidgeValley => synthetic::ridge_valley()?,
                DemoScenario::Crest => synthetic::crest()?,
                DemoScenario::PointCloud => synthetic::point_cloud_valley()?,
            };
            write_project_json(&output, &Project::from_scenario(&scenario))?;
            println!("Wrote {} sections to {}", scenario.lines.len(), output.display());
        }
        Commands::Fitness { project, fitness } => {
            if let Some(name) = fitness {
                config.fitness = name.parse::<FitnessKind>()?;
            }
            let scenario = load_scenario(&project, &config)?;
            let ctx = ImprovementContext::from_config(scenario.tin, scenario.water, &config);
            for section in scenario.lines.sections() {
                println!("{}: {:.4}", section.id, ctx.fitness.section_fitness(section)?);
            }
            println!(
                "Average {}: {:.4}",
                config.fitness,
                ctx.fitness.avg_fitness(scenario.lines.sections())?
            );
        }
        Commands::Validate { project } => {
            let scenario = load_scenario(&project, &config)?;
            let checker = ValidityChecker::new(Rc::clone(&scenario.water));
            let mut invalid = 0;
            for section in scenario.lines.sections() {
                let water = checker.route_valid_wrt_water(&section.coords);
                let catchments =
                    checker.route_valid_wrt_catchments(&section.coords, &scenario.lines, &[section.id.as_str()]);
                if !(water && catchments) {
                    invalid += 1;
                }
                println!("{}: water {}, catchments {}", section.id, ok(water), ok(catchments));
            }
            if invalid > 0 {
                return Err(CatchmentError::InvalidInput(format!(
                    "{} of {} sections are invalid",
                    invalid,
                    scenario.lines.len()
                )));
            }
            println!("All {} sections are valid", scenario.lines.len());
        }
        Commands::Improve {
            project,
            strategy,
            seed,
            output,
            geojson,
        } => {
            if let Some(seed) = seed {
                config.seed = seed;
            }
            config.validate()?;
            let scenario = load_scenario(&project, &config)?;
            info!("improving {} sections", scenario.lines.len());
            let improved = improve(&scenario, strategy, &config)?;
            write_project_json(&output, &Project::from_scenario(&improved))?;
            println!("Wrote {}", output.display());
            if let Some(path) = geojson {
                write_sections_geojson(&path, improved.lines.sections())?;
                println!("Wrote {}", path.display());
            }
        }
    }
    Ok(())
}

fn ok(valid: bool) -> &'static str {
    if valid {
        "ok"
    } else {
        "invalid"
    }
}

fn main() {
    init_logging();
    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
