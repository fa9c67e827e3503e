//! # Population Evolution Loop
//!
//! [`EvolutionLoop`] drives a fixed-size population through generations of
//!
//! 1. training every individual for `EVO_STEPS` environment steps,
//! 2. greedy evaluation over `EVAL_LOOP` episodes, appended to its fitness history,
//! 3. a [`GenerationReport`] handed to the observer and logged,
//! 4. tournament selection followed by mutation,
//! 5. an optional checkpoint of every slot.
//!
//! Training and evaluation of different individuals are independent and run
//! on the rayon pool when `parallel` is set. Each individual gets its own RNG
//! seeded from the master RNG in population order, so a seeded run produces
//! the same population whether or not it runs in parallel. Selection and
//! mutation only start once every individual has reported its fitness.
//!
//! An individual whose training or evaluation fails with a recoverable error
//! (see [`EvoError::is_recoverable`]) receives [`WORST_FITNESS`] for the
//! generation. Any other error aborts the run.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use ndarray::parallel::prelude::*;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use serde::{Serialize, Deserialize};

use crate::agent::checkpoint::checkpoint_path;
use crate::agent::{EvolvableAgent, RlAgent, WORST_FITNESS};
use crate::config::InitHp;
use crate::env::{Environment, VecEnv};
use crate::error::{EvoError, Result};
use crate::hpo::{Mutations, TournamentSelection};

/// Why [`EvolutionLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    TargetReached,
    MaxSteps,
    Interrupted,
}

/// Owned snapshot of a population right after evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub generation: usize,
    /// Environment steps summed over the population.
    pub total_steps: usize,
    pub ids: Vec<usize>,
    /// Fitness recorded this generation, in population order.
    pub fitness: Vec<f32>,
    /// Selection fitness (mean over the evaluation window).
    pub mean_fitness: Vec<f32>,
    pub best_id: usize,
    pub best_fitness: f32,
    /// The mutation that produced each individual.
    pub mutations: Vec<String>,
    pub hyperparameters: Vec<Vec<(String, f64)>>,
    /// Individuals that fell back to the worst fitness.
    pub failures: usize,
}

pub struct EvolutionOutcome<A> {
    pub population: Vec<A>,
    /// Copy of the best individual at the last selection, if one happened.
    pub elite: Option<A>,
    pub reports: Vec<GenerationReport>,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone)]
pub struct EvolutionLoop {
    pub evo_steps: usize,
    pub learning_delay: usize,
    pub eval_steps: Option<usize>,
    pub eval_loop: usize,
    pub max_steps: usize,
    pub target_score: Option<f32>,
    pub num_envs: usize,
    pub parallel: bool,
    pub checkpoint_dir: Option<PathBuf>,
    pub algo: String,
    stop: Arc<AtomicBool>,
}

impl EvolutionLoop {
    pub fn from_config(init_hp: &InitHp) -> Self {
        EvolutionLoop {
            evo_steps: init_hp.evo_steps,
            learning_delay: init_hp.learning_delay,
            eval_steps: init_hp.eval_steps,
            eval_loop: init_hp.eval_loop.max(1),
            max_steps: init_hp.max_steps,
            target_score: init_hp.target_score,
            num_envs: init_hp.num_envs,
            parallel: init_hp.parallel,
            checkpoint_dir: init_hp.checkpoint_dir.as_ref().map(PathBuf::from),
            algo: init_hp.algo.clone(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that asks the loop to stop after the current generation has been
    /// evaluated. The population is checkpointed before `run` returns.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn run<A, E, F, R>(
        &self,
        population: Vec<A>,
        make_env: F,
        tournament: &TournamentSelection,
        mutations: &Mutations,
        rng: &mut R,
    ) -> Result<EvolutionOutcome<A>>
    where
        A: RlAgent<E>,
        E: Environment,
        F: Fn(u64) -> Result<E>,
        R: Rng + ?Sized,
    {
        self.run_with_observer(population, make_env, tournament, mutations, rng, |_| {})
    }

    /// [`run`](Self::run), calling `observer` with every generation report.
    pub fn run_with_observer<A, E, F, R, O>(
        &self,
        mut population: Vec<A>,
        make_env: F,
        tournament: &TournamentSelection,
        mutations: &Mutations,
        rng: &mut R,
        mut observer: O,
    ) -> Result<EvolutionOutcome<A>>
    where
        A: RlAgent<E>,
        E: Environment,
        F: Fn(u64) -> Result<E>,
        R: Rng + ?Sized,
        O: FnMut(&GenerationReport),
    {
        if population.is_empty() {
            return Err(EvoError::EmptyBuffer("cannot evolve an empty population".to_string()));
        }
        if population.len() != tournament.population_size {
            return Err(EvoError::invalid_config(
                "POP_SIZE".to_string(),
                format!(
                    "population has {} individuals, selection expects {}",
                    population.len(),
                    tournament.population_size
                ),
            ));
        }
        if self.evo_steps == 0 {
            return Err(EvoError::invalid_config("EVO_STEPS", "must be greater than zero"));
        }

        let mut envs = population
            .iter()
            .map(|_| VecEnv::new(&make_env, self.num_envs, rng.gen()))
            .collect::<Result<Vec<VecEnv<E>>>>()?;

        let mut reports = Vec::new();
        let mut elite = None;
        let mut generation = 0;

        loop {
            let seeds: Vec<u64> = population.iter().map(|_| rng.gen()).collect();
            let results: Vec<Result<f32>> = if self.parallel {
                population
                    .par_iter_mut()
                    .zip(envs.par_iter_mut())
                    .zip(seeds.par_iter())
                    .map(|((agent, envs), &seed)| self.train_and_evaluate(agent, envs, seed))
                    .collect()
            } else {
                population
                    .iter_mut()
                    .zip(envs.iter_mut())
                    .zip(&seeds)
                    .map(|((agent, envs), &seed)| self.train_and_evaluate(agent, envs, seed))
                    .collect()
            };

            let mut failures = 0;
            for (agent, result) in population.iter_mut().zip(results) {
                let fitness = match result {
                    Ok(fitness) => fitness,
                    Err(e) if e.is_recoverable() => {
                        warn!("agent {} failed this generation: {}", agent.id(), e);
                        failures += 1;
                        WORST_FITNESS
                    }
                    Err(e) => return Err(e),
                };
                agent.meta_mut().fitness.push(fitness);
            }

            generation += 1;
            let report = self.report(generation, &population, failures);
            info!(
                "generation {} | steps {} | best agent {} ({:.2}) | fitness {:?} | mutations {:?}",
                report.generation, report.total_steps, report.best_id, report.best_fitness, report.fitness, report.mutations
            );
            observer(&report);

            let stop_reason = if self.target_score.map_or(false, |target| report.best_fitness >= target) {
                Some(StopReason::TargetReached)
            } else if population.iter().all(|a| a.meta().steps >= self.max_steps) {
                Some(StopReason::MaxSteps)
            } else if self.stop.load(Ordering::SeqCst) {
                Some(StopReason::Interrupted)
            } else {
                None
            };
            reports.push(report);

            if let Some(stop_reason) = stop_reason {
                self.save_population(&population)?;
                info!("evolution finished after {} generations: {:?}", generation, stop_reason);
                return Ok(EvolutionOutcome {
                    population,
                    elite,
                    reports,
                    stop_reason,
                });
            }

            let (best, next) = tournament.select(&population, rng)?;
            population = mutations.mutation(next, false, rng);
            for agent in population.iter_mut() {
                agent.meta_mut().generation += 1;
            }
            elite = Some(best);
            self.save_population(&population)?;
        }
    }

    fn train_and_evaluate<A, E>(&self, agent: &mut A, envs: &mut VecEnv<E>, seed: u64) -> Result<f32>
    where
        A: RlAgent<E>,
        E: Environment,
    {
        let mut rng = StdRng::seed_from_u64(seed);
        let stats = agent.train(envs, self.evo_steps, self.learning_delay, &mut rng)?;
        debug!(
            "agent {} trained {} steps, {} episodes, {} updates, loss {:?}",
            agent.id(),
            stats.steps,
            stats.episodes,
            stats.updates,
            stats.mean_loss
        );
        agent.evaluate_fitness(envs, self.eval_loop, self.eval_steps)
    }

    fn report<A: EvolvableAgent>(&self, generation: usize, population: &[A], failures: usize) -> GenerationReport {
        let mean_fitness: Vec<f32> = population.iter().map(|a| a.fitness(self.eval_loop)).collect();
        let (best_index, best_fitness) = mean_fitness
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |(bi, bf), (i, &f)| if f > bf { (i, f) } else { (bi, bf) });
        GenerationReport {
            generation,
            total_steps: population.iter().map(|a| a.meta().steps).sum(),
            ids: population.iter().map(|a| a.id()).collect(),
            fitness: population
                .iter()
                .map(|a| a.meta().fitness.last().copied().unwrap_or(WORST_FITNESS))
                .collect(),
            mean_fitness,
            best_id: population[best_index].id(),
            best_fitness,
            mutations: population.iter().map(|a| a.meta().last_mutation.label()).collect(),
            hyperparameters: population
                .iter()
                .map(|a| a.hyperparameters().iter().map(|s| (s.name.clone(), s.value)).collect())
                .collect(),
            failures,
        }
    }

    /// Write every slot to `<checkpoint_dir>/<algo>_<slot>.ckpt`. A no-op
    /// without a checkpoint directory.
    pub fn save_population<A: EvolvableAgent>(&self, population: &[A]) -> Result<()> {
        let Some(dir) = &self.checkpoint_dir else {
            return Ok(());
        };
        fs::create_dir_all(dir)?;
        for (slot, agent) in population.iter().enumerate() {
            agent.save_checkpoint(&checkpoint_path(dir, &self.algo, slot))?;
        }
        debug!("checkpointed {} individuals to {}", population.len(), dir.display());
        Ok(())
    }
}

/// Load `population_size` slots written by [`EvolutionLoop::save_population`].
pub fn load_population<A: EvolvableAgent>(dir: &Path, algo: &str, population_size: usize) -> Result<Vec<A>> {
    (0..population_size)
        .map(|slot| A::load_checkpoint(&checkpoint_path(dir, algo, slot)))
        .collect()
}
