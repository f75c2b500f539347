//! Simulator configuration
//!
//! Selects the engine and scheduler the global facade builds, plus the
//! realtime engine's synchronization policy. The string form is a list of
//! `Key=Value` pairs separated by `;`:
//!
//! ```text
//! SimulatorImplementationType=nsim::RealtimeSimulatorImpl;SchedulerType=HeapScheduler;HardLimit=50ms
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use nsim_core::{NsimError, NsimResult, Time};
use nsim_scheduler::SchedulerType;

use crate::{DefaultSimulatorImpl, RealtimeSimulatorImpl, SimulatorImpl};

/// Environment variable read by [`SimulatorConfig::from_env`]
pub const GLOBAL_VALUE_ENV: &str = "NSIM_GLOBAL_VALUE";

/// Engine implementation selector
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ImplementationType {
    #[default]
    Default,
    Realtime,
}

impl ImplementationType {
    pub const fn name(self) -> &'static str {
        match self {
            ImplementationType::Default => "DefaultSimulatorImpl",
            ImplementationType::Realtime => "RealtimeSimulatorImpl",
        }
    }
}

impl fmt::Display for ImplementationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ImplementationType {
    type Err = NsimError;

    fn from_str(s: &str) -> NsimResult<Self> {
        let name = s.trim();
        let name = name.strip_prefix("nsim::").unwrap_or(name);
        [ImplementationType::Default, ImplementationType::Realtime]
            .into_iter()
            .find(|t| {
                t.name() == name
                    || t.name()
                        .strip_suffix("SimulatorImpl")
                        .is_some_and(|short| short.eq_ignore_ascii_case(name))
            })
            .ok_or_else(|| NsimError::UnknownImplementation(s.to_string()))
    }
}

/// How the realtime engine reacts when it falls behind the wall clock
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SynchronizationMode {
    /// Keep going, dispatching late events as soon as possible
    #[default]
    BestEffort,
    /// Abort once an event is dispatched later than the hard limit
    HardLimit,
}

impl FromStr for SynchronizationMode {
    type Err = NsimError;

    fn from_str(s: &str) -> NsimResult<Self> {
        match s.trim() {
            "BestEffort" | "best-effort" => Ok(SynchronizationMode::BestEffort),
            "HardLimit" | "hard-limit" => Ok(SynchronizationMode::HardLimit),
            other => Err(NsimError::UnknownSynchronizationMode(other.to_string())),
        }
    }
}

/// Simulator configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulatorConfig {
    /// Engine built by the facade
    pub implementation: ImplementationType,
    /// Scheduler the engine starts with
    pub scheduler: SchedulerType,
    /// Realtime only
    pub synchronization_mode: SynchronizationMode,
    /// Realtime only: largest tolerated dispatch lateness under `HardLimit`
    pub hard_limit: Time,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            implementation: ImplementationType::Default,
            scheduler: SchedulerType::Map,
            synchronization_mode: SynchronizationMode::BestEffort,
            hard_limit: Time::millis(100),
        }
    }
}

impl SimulatorConfig {
    /// Realtime engine, best effort
    pub fn realtime() -> Self {
        SimulatorConfig {
            implementation: ImplementationType::Realtime,
            ..Self::default()
        }
    }

    /// Defaults overlaid with `text`
    pub fn parse(text: &str) -> NsimResult<Self> {
        let mut config = Self::default();
        config.apply(text)?;
        Ok(config)
    }

    /// Overlay `Key=Value;...` pairs onto this configuration
    pub fn apply(&mut self, text: &str) -> NsimResult<()> {
        for entry in text.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| NsimError::MalformedConfigEntry(entry.to_string()))?;
            let value = value.trim();
            match key.trim() {
                "SimulatorImplementationType" => self.implementation = value.parse()?,
                "SchedulerType" => self.scheduler = value.parse()?,
                "SynchronizationMode" => self.synchronization_mode = value.parse()?,
                "HardLimit" => self.hard_limit = value.parse()?,
                other => return Err(NsimError::UnknownConfigKey(other.to_string())),
            }
        }
        Ok(())
    }

    /// Defaults overlaid with the `NSIM_GLOBAL_VALUE` environment variable
    pub fn from_env() -> NsimResult<Self> {
        match std::env::var(GLOBAL_VALUE_ENV) {
            Ok(text) => Self::parse(&text),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Build the configured engine
    pub fn build(&self) -> Arc<dyn SimulatorImpl> {
        match self.implementation {
            ImplementationType::Default => {
                Arc::new(DefaultSimulatorImpl::with_scheduler(self.scheduler.build()))
            }
            ImplementationType::Realtime => Arc::new(RealtimeSimulatorImpl::with_config(self)),
        }
    }
}

impl FromStr for SimulatorConfig {
    type Err = NsimError;

    fn from_str(s: &str) -> NsimResult<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SimulatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.synchronization_mode {
            SynchronizationMode::BestEffort => "BestEffort",
            SynchronizationMode::HardLimit => "HardLimit",
        };
        write!(
            f,
            "SimulatorImplementationType={};SchedulerType={};SynchronizationMode={};HardLimit={}ns",
            self.implementation,
            self.scheduler,
            mode,
            self.hard_limit.as_nanos()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default() {
        let config = SimulatorConfig::default();
        assert_eq!(config.implementation, ImplementationType::Default);
        assert_eq!(config.scheduler, SchedulerType::Map);
        assert_eq!(config.synchronization_mode, SynchronizationMode::BestEffort);
        assert_eq!(config.hard_limit, Time::millis(100));
        assert_eq!(SimulatorConfig::realtime().implementation, ImplementationType::Realtime);
    }

    #[test]
    fn test_parse_full() {
        let config = SimulatorConfig::parse(
            "SimulatorImplementationType=nsim::RealtimeSimulatorImpl; SchedulerType=HeapScheduler;\
             SynchronizationMode=HardLimit;HardLimit=50ms;",
        )
        .unwrap();

        assert_eq!(config.implementation, ImplementationType::Realtime);
        assert_eq!(config.scheduler, SchedulerType::Heap);
        assert_eq!(config.synchronization_mode, SynchronizationMode::HardLimit);
        assert_eq!(config.hard_limit, Time::millis(50));
    }

    #[test]
    fn test_partial_overlay_keeps_defaults() {
        let config: SimulatorConfig = "SchedulerType=calendar".parse().unwrap();
        assert_eq!(config.scheduler, SchedulerType::Calendar);
        assert_eq!(config.implementation, ImplementationType::Default);
        assert_eq!(SimulatorConfig::parse("").unwrap(), SimulatorConfig::default());
    }

    #[test]
    fn test_display_round_trips() {
        let mut config = SimulatorConfig::realtime();
        config.scheduler = SchedulerType::List;
        config.hard_limit = Time::micros(250);

        let again = SimulatorConfig::parse(&config.to_string()).unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            SimulatorConfig::parse("SchedulerType"),
            Err(NsimError::MalformedConfigEntry("SchedulerType".into()))
        );
        assert_eq!(
            SimulatorConfig::parse("Verbose=1"),
            Err(NsimError::UnknownConfigKey("Verbose".into()))
        );
        assert!(matches!(
            SimulatorConfig::parse("SimulatorImplementationType=Distributed"),
            Err(NsimError::UnknownImplementation(_))
        ));
        assert!(matches!(
            SimulatorConfig::parse("SynchronizationMode=Strict"),
            Err(NsimError::UnknownSynchronizationMode(_))
        ));
        assert!(matches!(
            SimulatorConfig::parse("HardLimit=fast"),
            Err(NsimError::UnknownTimeUnit(_))
        ));
    }

    #[test]
    fn test_build() {
        let engine = SimulatorConfig::default().build();
        assert_eq!(engine.name(), "DefaultSimulatorImpl");

        let engine = SimulatorConfig::realtime().build();
        assert_eq!(engine.name(), "RealtimeSimulatorImpl");
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var(GLOBAL_VALUE_ENV, "SchedulerType=nsim::ListScheduler");
        let config = SimulatorConfig::from_env();
        std::env::remove_var(GLOBAL_VALUE_ENV);

        assert_eq!(config.unwrap().scheduler, SchedulerType::List);
        assert_eq!(SimulatorConfig::from_env().unwrap(), SimulatorConfig::default());
    }
}
