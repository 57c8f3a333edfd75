// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Platform driver implementations for component execution.
//!
//! Each backend satisfies the [`PlatformDriver`](crate::traits::PlatformDriver)
//! contract: deliver a function descriptor plus encoded inputs to the target
//! and hand back the raw output. Drivers never interpret results beyond
//! extracting the final JSON line; decoding belongs to the component runner.
//!
//! # Available Backends
//!
//! * **local** - direct in-process invocation, no serialization round-trip
//! * **docker** - container runtime via the Docker CLI
//! * **kubernetes** - cluster Jobs behind the [`ClusterApi`] contract
//! * **lambda** - function-as-a-service behind the [`FaasApi`] contract
//! * **batch** - managed batch jobs behind the [`BatchApi`] contract
//! * **slurm** - HPC scheduler via `sbatch`/`squeue`
//! * **ssh** - remote shell via `ssh`/`scp`
//!
//! Cloud service internals are deliberately out of scope; the three `*Api`
//! traits are the full contract this engine has with them, and concrete
//! bindings are injected by the embedding application.

pub mod batch;
pub mod docker;
pub mod kubernetes;
pub mod lambda;
pub mod local;
pub mod script;
pub mod slurm;
pub mod ssh;

pub use batch::{BatchApi, BatchDriver, BatchJobState, JobSubmission};
pub use docker::DockerDriver;
pub use kubernetes::{ClusterApi, JobPhase, KubectlCluster, KubernetesDriver};
pub use lambda::{FaasApi, LambdaDriver};
pub use local::{BoundInputs, LocalDriver, NativeError, NativeFn};
pub use slurm::SlurmDriver;
pub use ssh::SshDriver;
