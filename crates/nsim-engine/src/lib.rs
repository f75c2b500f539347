//! nsim engine - simulation control loop
//!
//! This crate drives events through a scheduler:
//! - [`SimulatorImpl`]: the engine abstraction
//! - [`DefaultSimulatorImpl`]: as-fast-as-possible virtual time
//! - [`RealtimeSimulatorImpl`]: virtual time paced by the wall clock
//! - [`Simulator`]: process-wide facade over one lazily built engine
//! - [`Timer`] and [`Watchdog`]: helpers built on the facade

pub mod config;
pub mod default_simulator;
mod queue;
pub mod realtime_simulator;
pub mod simulator;
pub mod simulator_impl;
pub mod synchronizer;
pub mod timer;
pub mod watchdog;

pub use config::{ImplementationType, SimulatorConfig, SynchronizationMode, GLOBAL_VALUE_ENV};
pub use default_simulator::DefaultSimulatorImpl;
pub use realtime_simulator::RealtimeSimulatorImpl;
pub use simulator::{now, Simulator};
pub use simulator_impl::{SimulatorImpl, SimulatorState};
pub use synchronizer::WallClockSynchronizer;
pub use timer::{DestroyPolicy, Timer, TimerState};
pub use watchdog::Watchdog;
