#![doc = include_str!("../README.md")]

pub mod builder;
pub mod cluster;
pub mod command;
pub mod container;
pub mod docker;
pub mod error;
pub mod phase;
pub mod sequencer;
pub mod wait;

pub use builder::{BuildSpec, ImageBuilder, ImageRef};
pub use cluster::{ClusterRunner, ClusterTimeouts, ComposeSpec};
pub use command::{CommandExecutor, CommandOutput, CommandSpec, TokioCommandExecutor};
pub use container::{ContainerJob, EphemeralContainerRunner};
pub use docker::{BollardDockerClient, ContainerInfo, ContainerSpec, DockerClient};
pub use error::RunnerError;
pub use phase::{Phase, PhaseState, PhaseWorkload};
pub use sequencer::{PhaseSequencer, PhaseSequencerBuilder, new_run_id};
