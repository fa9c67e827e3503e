use std::fs;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::tempdir;

use super::{cartpole_envs, population};
use crate::agent::checkpoint::{self, checkpoint_path};
use crate::agent::{EvolvableAgent, EvolvableDqn, RlAgent, DQN_ALGO};
use crate::error::EvoError;
use crate::hpo::Mutations;
use crate::network::Block;
use crate::train::load_population;

#[test]
fn test_trained_agent_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("agent.ckpt");
    let mut rng = StdRng::seed_from_u64(0);
    let mut agent = population(1, 0).remove(0);
    agent.train(&mut cartpole_envs(2, 0), 40, 8, &mut rng).unwrap();
    agent.meta.fitness.push(12.5);

    agent.save_checkpoint(&path).unwrap();
    let loaded = EvolvableDqn::load_checkpoint(&path).unwrap();

    assert_eq!(loaded.meta, agent.meta);
    assert_eq!(loaded.descriptor(), agent.descriptor());
    assert_eq!(loaded.actor, agent.actor);
    assert_eq!(loaded.actor_target, agent.actor_target);
    assert_eq!(loaded.optimizer(), agent.optimizer());
    assert_eq!(loaded.hyperparameters(), agent.hyperparameters());
    assert_eq!(loaded.epsilon, agent.epsilon);
    assert!(loaded.memory().is_empty());
    assert_eq!(loaded.memory().capacity(), agent.settings.memory_size);

    let resaved = dir.path().join("again.ckpt");
    loaded.save_checkpoint(&resaved).unwrap();
    assert_eq!(fs::read(&path).unwrap(), fs::read(&resaved).unwrap());
}

#[test]
fn test_mutated_agent_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("agent.ckpt");
    let mut rng = StdRng::seed_from_u64(1);
    let mut agent = population(1, 1).remove(0);
    let mutation = agent.descriptor().add_layer(Block::Head).unwrap();
    agent.apply_architecture(&mutation, &mut rng).unwrap();
    let agent = Mutations::new(0.0, 0.0, 0.2, 0.0, 0.0, 1.0, 0.1)
        .unwrap()
        .mutation(vec![agent], false, &mut rng)
        .remove(0);

    agent.save_checkpoint(&path).unwrap();
    let loaded = EvolvableDqn::load_checkpoint(&path).unwrap();
    assert_eq!(loaded.descriptor().head.hidden.len(), 2);
    assert_eq!(loaded.meta.last_mutation, agent.meta.last_mutation);
    assert_eq!(loaded.batch_size(), agent.batch_size());
    assert_eq!(loaded.learn_step(), agent.learn_step());
    assert_eq!(loaded.lr(), agent.lr());
}

#[test]
fn test_version_mismatch_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("agent.ckpt");
    let agent = population(1, 2).remove(0);
    agent.save_checkpoint(&path).unwrap();

    // Byte 4 starts the little-endian format version after the magic tag.
    let mut bytes = fs::read(&path).unwrap();
    bytes[4] = bytes[4].wrapping_add(1);
    fs::write(&path, bytes).unwrap();

    match EvolvableDqn::load_checkpoint(&path) {
        Err(EvoError::IncompatibleCheckpoint { .. }) => {}
        other => panic!("expected an incompatible checkpoint, got {:?}", other.map(|a| a.id())),
    }
}

#[test]
fn test_inconsistent_payload_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("agent.ckpt");
    let mut agent = population(1, 3).remove(0);
    agent.actor.layers.pop();
    checkpoint::save(&path, DQN_ALGO, &agent).unwrap();

    assert!(matches!(
        EvolvableDqn::load_checkpoint(&path),
        Err(EvoError::IncompatibleCheckpoint { .. })
    ));
}

#[test]
fn test_population_slots() {
    let dir = tempdir().unwrap();
    let agents = population(3, 4);
    for (slot, agent) in agents.iter().enumerate() {
        agent.save_checkpoint(&checkpoint_path(dir.path(), DQN_ALGO, slot)).unwrap();
    }
    assert!(dir.path().join("DQN_2.ckpt").exists());

    let loaded: Vec<EvolvableDqn> = load_population(dir.path(), DQN_ALGO, 3).unwrap();
    for (a, b) in loaded.iter().zip(&agents) {
        assert_eq!(a.id(), b.id());
        assert_eq!(a.actor, b.actor);
    }
    assert!(load_population::<EvolvableDqn>(dir.path(), DQN_ALGO, 4).is_err());
}
