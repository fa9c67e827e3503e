//! Evolve a population of DQN agents on CartPole.
//!
//! Run with: cargo run --example evolve_cartpole -- --config configs/cartpole_dqn.yaml
use clap::Parser;
use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};

use evorl::agent::{EvolvableAgent, EvolvableDqn};
use evorl::config::EvolutionConfig;
use evorl::env::{CartPole, Environment};
use evorl::error::Result;
use evorl::hpo::{Mutations, TournamentSelection};
use evorl::train::{load_population, EvolutionLoop};
use evorl::utils::{create_population, print_hyperparams};

/// Evolve DQN agents on CartPole
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// YAML or JSON run configuration; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides MUTATION_PARAMS.RAND_SEED
    #[arg(long)]
    seed: Option<u64>,

    /// Overrides INIT_HP.CHECKPOINT_DIR
    #[arg(long)]
    checkpoint_dir: Option<String>,

    /// Continue from the population stored in the checkpoint directory
    #[arg(long, default_value_t = false)]
    resume: bool,

    /// Train individuals one after another instead of on the thread pool
    #[arg(long, default_value_t = false)]
    sequential: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EvolutionConfig::load(path)?,
        None => EvolutionConfig::default(),
    };
    if let Some(dir) = args.checkpoint_dir {
        config.init_hp.checkpoint_dir = Some(dir);
    }
    if args.sequential {
        config.init_hp.parallel = false;
    }
    config.validate()?;

    let seed = args.seed.or(config.mutation_params.rand_seed).unwrap_or(0);
    let mut rng = StdRng::seed_from_u64(seed);
    let hp = &config.init_hp;
    let tournament = TournamentSelection::new(hp.tourn_size, hp.elitism, hp.pop_size, hp.eval_loop)?;
    let mutations = Mutations::from_config(&config.mutation_params)?;

    let population: Vec<EvolvableDqn> = match (&hp.checkpoint_dir, args.resume) {
        (Some(dir), true) => {
            info!("resuming from {}", dir);
            load_population(Path::new(dir), &hp.algo, hp.pop_size)?
        }
        _ => {
            let probe = CartPole::new(seed);
            let population = create_population(&config, probe.observation_dim(), probe.num_actions(), &mut rng)?;
            mutations.mutation(population, true, &mut rng)
        }
    };

    let outcome = EvolutionLoop::from_config(hp).run(
        population,
        |seed| Ok(CartPole::new(seed)),
        &tournament,
        &mutations,
        &mut rng,
    )?;

    info!(
        "stopped after {} generations: {:?}",
        outcome.reports.len(),
        outcome.stop_reason
    );
    print_hyperparams(&outcome.population, hp.eval_loop);
    if let Some(elite) = &outcome.elite {
        info!("elite agent {} with fitness {:.2}", elite.id(), elite.fitness(hp.eval_loop));
    }
    Ok(())
}
