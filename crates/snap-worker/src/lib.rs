//! The worker-side half of the isolation protocol: compartment
//! creation, lockdown, the endowment bag, the `wallet` snap provider
//! and command dispatch. Used both by the standalone `snap-worker`
//! binary (child-process isolation) and, as a library, by
//! `snap-execution-env`'s in-process container (weaker, same-process
//! isolation for embedding and fast tests).

pub mod controller;
pub mod endowments;
pub mod lockdown;
pub mod provider;
pub mod run;

pub use controller::WorkerController;
