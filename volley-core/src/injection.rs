//! Open-workload arrival profiles and the start schedule derived from them.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::scenario::Scenario;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionPhase {
    /// Start every user immediately.
    AtOnce { users: u64 },
    /// Start users evenly spaced over `over`.
    Ramp { users: u64, over: Duration },
}

impl InjectionPhase {
    pub fn at_once(users: u64) -> Self {
        Self::AtOnce { users }
    }

    pub fn ramp(users: u64, over: Duration) -> Self {
        Self::Ramp { users, over }
    }

    pub fn users(&self) -> u64 {
        match *self {
            Self::AtOnce { users } | Self::Ramp { users, .. } => users,
        }
    }

    pub fn duration(&self) -> Duration {
        match *self {
            Self::AtOnce { .. } => Duration::ZERO,
            Self::Ramp { over, .. } => over,
        }
    }

    /// Offset of the `i`-th user of this phase from simulation start.
    fn offset_of(&self, i: u64) -> Duration {
        match *self {
            Self::AtOnce { .. } => Duration::ZERO,
            Self::Ramp { users, over } => {
                let nanos = over.as_nanos() * u128::from(i) / u128::from(users.max(1));
                Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
            }
        }
    }
}

/// Validated, ordered list of phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionProfile {
    phases: Vec<InjectionPhase>,
}

impl InjectionProfile {
    pub fn new(phases: Vec<InjectionPhase>) -> Result<Self> {
        if phases.is_empty() {
            return Err(Error::EmptyProfile);
        }

        for phase in &phases {
            if let InjectionPhase::Ramp { users, over } = *phase
                && users > 0
                && over.is_zero()
            {
                return Err(Error::ZeroDurationRamp { users });
            }
        }

        Ok(Self { phases })
    }

    pub fn phases(&self) -> &[InjectionPhase] {
        &self.phases
    }

    pub fn total_users(&self) -> u64 {
        self.phases
            .iter()
            .fold(0u64, |acc, p| acc.saturating_add(p.users()))
    }

    /// Time from simulation start until the last phase finishes injecting.
    pub fn duration(&self) -> Duration {
        self.phases
            .iter()
            .map(InjectionPhase::duration)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    pub fn schedule(&self, scenario: Arc<Scenario>) -> Schedule {
        Schedule {
            cursors: self
                .phases
                .iter()
                .map(|phase| PhaseCursor {
                    phase: *phase,
                    next: 0,
                })
                .collect(),
            scenario,
            emitted: 0,
        }
    }
}

/// One user to start.
#[derive(Debug, Clone)]
pub struct StartEvent {
    /// Offset from simulation start.
    pub offset: Duration,
    /// Index of the phase that produced this user.
    pub phase: usize,
    /// Zero-based index of the user within its population.
    pub user: u64,
    pub scenario: Arc<Scenario>,
}

#[derive(Debug, Clone)]
struct PhaseCursor {
    phase: InjectionPhase,
    next: u64,
}

impl PhaseCursor {
    fn peek(&self) -> Option<Duration> {
        (self.next < self.phase.users()).then(|| self.phase.offset_of(self.next))
    }
}

/// Lazy, time-ordered stream of start events across all phases of a profile.
///
/// Phases overlap in time; on equal offsets the earlier phase goes first.
#[derive(Debug, Clone)]
pub struct Schedule {
    cursors: Vec<PhaseCursor>,
    scenario: Arc<Scenario>,
    emitted: u64,
}

impl Iterator for Schedule {
    type Item = StartEvent;

    fn next(&mut self) -> Option<StartEvent> {
        let mut best: Option<(usize, Duration)> = None;
        for (idx, cursor) in self.cursors.iter().enumerate() {
            let Some(offset) = cursor.peek() else {
                continue;
            };
            if best.is_none_or(|(_, b)| offset < b) {
                best = Some((idx, offset));
            }
        }

        let (phase, offset) = best?;
        self.cursors[phase].next += 1;

        let user = self.emitted;
        self.emitted += 1;

        Some(StartEvent {
            offset,
            phase,
            user,
            scenario: self.scenario.clone(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining: u64 = self
            .cursors
            .iter()
            .map(|c| c.phase.users().saturating_sub(c.next))
            .sum();
        let remaining = usize::try_from(remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Schedule {}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn scenario() -> Arc<Scenario> {
        Arc::new(Scenario::builder("s").build())
    }

    fn offsets(profile: &InjectionProfile) -> Vec<Duration> {
        profile.schedule(scenario()).map(|e| e.offset).collect()
    }

    #[test]
    fn rejects_empty_profile_and_instant_ramp() {
        assert!(matches!(InjectionProfile::new(vec![]), Err(Error::EmptyProfile)));
        assert!(matches!(
            InjectionProfile::new(vec![InjectionPhase::ramp(3, Duration::ZERO)]),
            Err(Error::ZeroDurationRamp { users: 3 })
        ));
        assert!(InjectionProfile::new(vec![InjectionPhase::ramp(0, Duration::ZERO)]).is_ok());
    }

    #[test]
    fn at_once_starts_everyone_at_zero() {
        let profile = InjectionProfile::new(vec![InjectionPhase::at_once(5)]).unwrap();
        assert_eq!(offsets(&profile), vec![Duration::ZERO; 5]);
    }

    #[test]
    fn ramp_offsets_are_evenly_spaced_and_below_duration() {
        let over = Duration::from_secs(10);
        let profile = InjectionProfile::new(vec![InjectionPhase::ramp(4, over)]).unwrap();
        let got = offsets(&profile);

        assert_eq!(
            got,
            vec![
                Duration::ZERO,
                Duration::from_millis(2500),
                Duration::from_secs(5),
                Duration::from_millis(7500),
            ]
        );
        assert!(got.iter().all(|o| *o < over));
    }

    #[test]
    fn phases_are_merged_by_time_with_earlier_phase_winning_ties() {
        let profile = InjectionProfile::new(vec![
            InjectionPhase::at_once(2),
            InjectionPhase::ramp(2, Duration::from_secs(2)),
            InjectionPhase::ramp(3, Duration::from_secs(3)),
        ])
        .unwrap();

        let events: Vec<(u64, usize)> = profile
            .schedule(scenario())
            .map(|e| (e.offset.as_millis() as u64, e.phase))
            .collect();

        assert_eq!(
            events,
            vec![(0, 0), (0, 0), (0, 1), (0, 2), (1000, 1), (1000, 2), (2000, 2)]
        );
    }

    #[test]
    fn schedule_size_matches_total_users() {
        let profile = InjectionProfile::new(vec![
            InjectionPhase::at_once(5),
            InjectionPhase::ramp(45, Duration::from_secs(30)),
            InjectionPhase::ramp(25, Duration::from_secs(15)),
        ])
        .unwrap();

        assert_eq!(profile.total_users(), 75);
        assert_eq!(profile.duration(), Duration::from_secs(30));

        let schedule = profile.schedule(scenario());
        assert_eq!(schedule.len(), 75);

        let events: Vec<StartEvent> = schedule.collect();
        assert_eq!(events.len(), 75);
        assert!(events.windows(2).all(|w| w[0].offset <= w[1].offset));
        assert!(events.iter().enumerate().all(|(i, e)| e.user == i as u64));
    }
}
